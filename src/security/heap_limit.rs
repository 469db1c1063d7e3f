//! Guest heap ceiling.
//!
//! With `heap_max_mb` configured, V8 calls back as the heap nears the limit.
//! The first call grants a tenth more room so a collection can finish; the
//! next one terminates the running script and records the hit, turning an
//! out-of-memory abort into an ordinary failed `eval`.

use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// State handed to the callback. Must outlive the isolate.
pub struct HeapLimitState {
    isolate_handle: v8::IsolateHandle,
    hit: AtomicBool,
    invocations: AtomicU32,
    max_heap_bytes: usize,
}

impl HeapLimitState {
    pub fn was_hit(&self) -> bool {
        self.hit.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.hit.store(false, Ordering::SeqCst);
        self.invocations.store(0, Ordering::SeqCst);
    }
}

/// # Safety
///
/// `data` must point to a live `HeapLimitState`.
unsafe extern "C" fn near_heap_limit_callback(
    data: *mut c_void,
    current_heap_limit: usize,
    _initial_heap_limit: usize,
) -> usize {
    // SAFETY: data comes from install(), whose box outlives the isolate.
    let state = unsafe { &*(data as *const HeapLimitState) };
    let count = state.invocations.fetch_add(1, Ordering::SeqCst);

    if count == 0 {
        let grown = (current_heap_limit + current_heap_limit / 10).min(state.max_heap_bytes);
        if grown > current_heap_limit {
            tracing::warn!("Guest heap near limit, growing to {} MB", grown / (1024 * 1024));
            return grown;
        }
    }

    tracing::error!("Guest heap limit exhausted, terminating execution");
    state.hit.store(true, Ordering::SeqCst);
    state.isolate_handle.terminate_execution();
    current_heap_limit
}

/// Install the callback. Keep the returned box alive as long as the isolate.
pub fn install(isolate: &mut v8::Isolate, max_heap_bytes: usize) -> Box<HeapLimitState> {
    let state = Box::new(HeapLimitState {
        isolate_handle: isolate.thread_safe_handle(),
        hit: AtomicBool::new(false),
        invocations: AtomicU32::new(0),
        max_heap_bytes,
    });

    let data = &*state as *const HeapLimitState as *mut c_void;
    isolate.add_near_heap_limit_callback(near_heap_limit_callback, data);
    state
}
