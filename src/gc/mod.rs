//! External memory accounting and deferred handle release.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  RetiredHandleQueue                                         │
//! │  ├── Weak handles whose finalizer already ran               │
//! │  └── Drained on every context entry, before JsLock          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  JsLock (RAII)                                              │
//! │  ├── Enters the isolate, attaches it to the ledger          │
//! │  ├── Applies deferred deltas on construction                │
//! │  └── Restores the outer lock on drop (nested callbacks)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ExternalMemoryLedger / ExternalMemoryGuard (RAII)          │
//! │  ├── Guard accounts +N on creation, −N on drop              │
//! │  ├── Lock held → isolate adjusted immediately               │
//! │  └── No lock → delta deferred in the ledger                 │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ExternalSize trait (+ derive)                              │
//! │  └── external_size() → usize                                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The ledger is per context rather than process-wide, so contexts on the
//! same thread never see each other's deltas.

mod deferred_destruction;
mod external_memory;
mod js_lock;
mod traceable;

pub use deferred_destruction::{RetiredHandle, RetiredHandleQueue};
pub use external_memory::{ExternalMemoryGuard, ExternalMemoryLedger};
pub use js_lock::JsLock;
pub use traceable::ExternalSize;

#[cfg(test)]
mod tests;
