//! Deferred release of engine handles.
//!
//! Weak finalizers run inside the collector, where dropping the finalized
//! handle itself is not allowed. The handle is queued instead and released
//! the next time the context is entered, before the [`JsLock`](super::JsLock)
//! is taken.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

/// A type-erased handle awaiting release.
pub struct RetiredHandle {
    handle: Box<dyn Any>,
}

impl RetiredHandle {
    pub fn new<T: 'static>(handle: T) -> Self {
        Self {
            handle: Box::new(handle),
        }
    }
}

impl std::fmt::Debug for RetiredHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetiredHandle")
            .field("type_id", &(*self.handle).type_id())
            .finish()
    }
}

/// Per-context queue of retired handles.
#[derive(Default)]
pub struct RetiredHandleQueue {
    queue: RefCell<VecDeque<RetiredHandle>>,
    released: Cell<u64>,
}

impl RetiredHandleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retire<T: 'static>(&self, handle: T) {
        self.queue.borrow_mut().push_back(RetiredHandle::new(handle));
        tracing::trace!("Retired engine handle (pending: {})", self.len());
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Total handles released since creation.
    pub fn released(&self) -> u64 {
        self.released.get()
    }

    /// Drop every queued handle. Must run with the isolate entered.
    pub fn process_all(&self) {
        let handles = std::mem::take(&mut *self.queue.borrow_mut());
        let count = handles.len();
        if count == 0 {
            return;
        }

        // Dropped outside the borrow: a handle's drop may retire another.
        drop(handles);
        self.released.set(self.released.get() + count as u64);

        tracing::trace!("Released {} retired engine handles", count);
    }
}

impl std::fmt::Debug for RetiredHandleQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetiredHandleQueue")
            .field("pending", &self.len())
            .field("released", &self.released.get())
            .finish()
    }
}
