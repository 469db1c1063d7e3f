//! The value-and-call bridge between the host runtime and a V8 context.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────── BridgeContext ────────────────────────┐
//! │  bind / eval / call_guest_function                            │
//! │        │                                                      │
//! │        ▼                                                      │
//! │  ContextState::enter ── JsLock ── ExecutionGuard (outermost)  │
//! │        │                                                      │
//! │        ▼                                                      │
//! │  convert ──▶ proxy (HostProxy live table, GuestProxy)         │
//! │     │            │                                            │
//! │     │            └──▶ registry (guest identity → host proxy)  │
//! │     └──▶ callable (closure / method) ──▶ prototype cache      │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All state is per-context and single-threaded. The only cross-thread
//! piece is the execution guard's watchdog.

mod callable;
mod context;
mod convert;
mod prototype;
mod proxy;
mod registry;
mod state;

pub use context::{BridgeContext, BridgeContextBuilder, BridgeStats};
pub use proxy::GuestProxy;
