//! The host runtime the bridge embeds V8 into.
//!
//! Values are reference counted (`Rc`), so retaining a value is `clone()` and
//! releasing it is `drop()`. Classes carry parents and local methods; method
//! lookup walks the linearized ancestor list. The runtime also owns the
//! last-error slot that `eval` reports failures through.

mod class;
mod runtime;
mod value;

pub use class::{HostClass, Mro, linearize};
pub use runtime::HostRuntime;
pub use value::{
    ForeignObject, HostArray, HostCallable, HostCode, HostHash, HostObject, HostValue,
    ObjectPayload,
};

pub(crate) use runtime::panic_message;
pub(crate) use value::WeakHostValue;
