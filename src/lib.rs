//! Bidirectional value-and-call bridge between a host runtime and V8.
//!
//! ```rust,ignore
//! use v8_host_bridge::{BridgeContext, HostCode, HostValue};
//!
//! let ctx = BridgeContext::builder().time_limit_secs(1).build()?;
//! ctx.bind("add", &HostCode::new(|_, args| {
//!     let a = args[0].as_int().unwrap_or(0);
//!     let b = args[1].as_int().unwrap_or(0);
//!     Ok(HostValue::Int(a + b))
//! }).into())?;
//! assert_eq!(ctx.eval("add(2, 3)", "example.js")?, HostValue::Int(5));
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod gc;
pub mod host;
pub mod platform;
pub mod security;

// Core API
pub use bridge::{BridgeContext, BridgeContextBuilder, BridgeStats, GuestProxy};
pub use config::BridgeConfig;
pub use error::{BridgeError, ConversionWarning, GuestException, HostError, SourceLocation};
pub use host::{
    ForeignObject, HostArray, HostCallable, HostClass, HostCode, HostHash, HostObject,
    HostRuntime, HostValue, Mro, ObjectPayload,
};

pub use gc::ExternalSize;
pub use v8_host_bridge_derive::ExternalSize as DeriveExternalSize;
