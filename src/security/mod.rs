//! Protection against runaway guest scripts.
//!
//! ## Components
//!
//! - [`execution_guard`]: wall-clock time limit via a watchdog thread
//! - [`heap_limit`]: graceful termination when the guest heap ceiling is hit
//!
//! ## Usage
//!
//! ```rust,ignore
//! use v8_host_bridge::security::ExecutionGuard;
//!
//! let mut guard = ExecutionGuard::arm(isolate.thread_safe_handle(), Some(Duration::from_secs(1)))?;
//! // run guest code
//! if guard.disarm() {
//!     isolate.cancel_terminate_execution();
//! }
//! ```

pub mod execution_guard;
pub mod heap_limit;

pub use execution_guard::{ExecutionGuard, GuardState, Terminate};
pub use heap_limit::HeapLimitState;
