//! External memory accounting for the guest collector.

use std::cell::Cell;
use std::rc::Rc;

/// Running total of host memory kept alive on behalf of one isolate.
///
/// While a [`JsLock`](super::JsLock) is held, deltas are forwarded to the
/// isolate immediately. Otherwise they accumulate and are applied when the
/// next lock is taken.
#[derive(Default)]
pub struct ExternalMemoryLedger {
    accounted: Cell<i64>,
    pending: Cell<i64>,
    isolate: Cell<Option<*mut v8::Isolate>>,
}

impl ExternalMemoryLedger {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Record `delta` bytes. Positive on allocation, negative on release.
    pub fn account(&self, delta: i64) {
        if delta == 0 {
            return;
        }
        self.accounted.set(self.accounted.get() + delta);

        match self.isolate.get() {
            Some(isolate) => {
                // SAFETY: the pointer is only set while a JsLock borrows the isolate.
                unsafe {
                    (*isolate).adjust_amount_of_external_allocated_memory(delta);
                }
                log::trace!("Adjusted external memory: {} bytes", delta);
            }
            None => {
                self.pending.set(self.pending.get() + delta);
                log::trace!("Deferred external memory adjustment: {} bytes", delta);
            }
        }
    }

    /// Bytes currently accounted.
    pub fn accounted(&self) -> i64 {
        self.accounted.get()
    }

    /// Deltas recorded while no lock was held, not yet reported.
    pub fn pending(&self) -> i64 {
        self.pending.get()
    }

    pub(crate) fn attach(&self, isolate: &mut v8::Isolate) -> Option<*mut v8::Isolate> {
        let pending = self.pending.replace(0);
        if pending != 0 {
            isolate.adjust_amount_of_external_allocated_memory(pending);
            log::trace!("Applied deferred external memory adjustment: {} bytes", pending);
        }
        self.isolate.replace(Some(isolate as *mut _))
    }

    pub(crate) fn restore(&self, previous: Option<*mut v8::Isolate>) {
        self.isolate.set(previous);
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.isolate.get().is_some()
    }
}

impl std::fmt::Debug for ExternalMemoryLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalMemoryLedger")
            .field("accounted", &self.accounted.get())
            .field("pending", &self.pending.get())
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// RAII share of a ledger: accounts its amount on creation and the exact
/// negation on drop.
pub struct ExternalMemoryGuard {
    ledger: Rc<ExternalMemoryLedger>,
    amount: i64,
}

impl ExternalMemoryGuard {
    pub fn new(ledger: &Rc<ExternalMemoryLedger>, amount: i64) -> Self {
        ledger.account(amount);
        Self {
            ledger: ledger.clone(),
            amount,
        }
    }
}

impl Drop for ExternalMemoryGuard {
    fn drop(&mut self) {
        self.ledger.account(-self.amount);
    }
}

impl std::fmt::Debug for ExternalMemoryGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalMemoryGuard")
            .field("amount", &self.amount)
            .finish()
    }
}
