//! JsLock - RAII entry of an isolate on this thread.

use std::rc::Rc;

use super::ExternalMemoryLedger;

/// While alive, the isolate is the current one on this thread and the
/// ledger forwards deltas straight to it.
///
/// Construction enters the isolate and applies any deferred deltas. Locks
/// nest, also across isolates: dropping one exits its isolate, restoring
/// whichever isolate was entered before, and restores the ledger's outer
/// attachment.
///
/// ```ignore
/// retired.process_all();
/// let _lock = JsLock::new(&mut isolate, &ledger);
/// let guard = ExternalMemoryGuard::new(&ledger, 4096); // reported now
/// ```
pub struct JsLock {
    ledger: Rc<ExternalMemoryLedger>,
    isolate: *mut v8::Isolate,
    previous: Option<*mut v8::Isolate>,
}

impl JsLock {
    pub fn new(isolate: &mut v8::Isolate, ledger: &Rc<ExternalMemoryLedger>) -> Self {
        // SAFETY: balanced by the exit() in Drop; V8 keeps a per-thread
        // stack of entered isolates and allows re-entry.
        unsafe { isolate.enter() };
        let previous = ledger.attach(isolate);
        Self {
            ledger: ledger.clone(),
            isolate: isolate as *mut v8::Isolate,
            previous,
        }
    }
}

impl Drop for JsLock {
    fn drop(&mut self) {
        self.ledger.restore(self.previous);
        // SAFETY: the isolate outlives the lock, and locks are dropped in
        // reverse order of creation, so it is the current isolate here.
        unsafe { (*self.isolate).exit() };
    }
}
