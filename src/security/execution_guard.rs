//! Wall-clock time limit for guest execution via a watchdog thread.
//!
//! ## States
//!
//! ```text
//! idle ──arm──▶ armed ──deadline──▶ fired
//!                 │
//!                 └────disarm─────▶ disarmed
//! ```
//!
//! Arming with no limit starts no thread. Otherwise the watchdog waits on a
//! condition variable until either the deadline passes (it then requests
//! termination) or the guard is disarmed. Disarming always joins the
//! watchdog, so it never outlives the execution it guards.
//!
//! ## Thread safety
//!
//! The watchdog only touches the [`Terminate`] implementation, which for V8
//! is the thread-safe `IsolateHandle`.

use std::io;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// Something that can interrupt a running execution from another thread.
pub trait Terminate: Send + 'static {
    fn terminate(&self) -> bool;
}

impl Terminate for v8::IsolateHandle {
    fn terminate(&self) -> bool {
        self.terminate_execution()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Idle,
    Armed,
    Fired,
    Disarmed,
}

struct Shared {
    state: Mutex<GuardState>,
    signal: Condvar,
}

impl Shared {
    fn state(&self) -> GuardState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// RAII watchdog for one guarded execution.
///
/// ```rust,ignore
/// let mut guard = ExecutionGuard::arm(isolate.thread_safe_handle(), Some(limit))?;
/// let result = script.run(scope);
/// if guard.disarm() {
///     isolate.cancel_terminate_execution();
/// }
/// ```
pub struct ExecutionGuard {
    shared: Arc<Shared>,
    watchdog: Option<thread::JoinHandle<()>>,
    limit: Option<Duration>,
}

impl ExecutionGuard {
    /// A guard that has not been armed.
    pub fn idle() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(GuardState::Idle),
                signal: Condvar::new(),
            }),
            watchdog: None,
            limit: None,
        }
    }

    /// Arm a guard. `None` or a zero limit disables the watchdog.
    pub fn arm<T: Terminate>(terminator: T, limit: Option<Duration>) -> io::Result<Self> {
        let mut guard = Self::idle();
        guard.limit = limit.filter(|l| !l.is_zero());
        *guard
            .shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = GuardState::Armed;

        let Some(limit) = guard.limit else {
            return Ok(guard);
        };

        let shared = guard.shared.clone();
        let watchdog = thread::Builder::new()
            .name("execution-watchdog".into())
            .spawn(move || {
                let state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
                let (mut state, _) = shared
                    .signal
                    .wait_timeout_while(state, limit, |s| *s == GuardState::Armed)
                    .unwrap_or_else(PoisonError::into_inner);

                if *state == GuardState::Armed {
                    *state = GuardState::Fired;
                    drop(state);
                    tracing::warn!("Execution exceeded {:?}, terminating guest", limit);
                    terminator.terminate();
                }
            })?;

        guard.watchdog = Some(watchdog);
        Ok(guard)
    }

    pub fn state(&self) -> GuardState {
        self.shared.state()
    }

    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }

    pub fn was_fired(&self) -> bool {
        self.state() == GuardState::Fired
    }

    /// Stop the watchdog and wait for it to exit. Returns whether it fired.
    pub fn disarm(&mut self) -> bool {
        {
            let mut state = self.shared.state.lock().unwrap_or_else(PoisonError::into_inner);
            if matches!(*state, GuardState::Armed | GuardState::Idle) {
                *state = GuardState::Disarmed;
            }
        }
        self.shared.signal.notify_all();

        if let Some(watchdog) = self.watchdog.take()
            && let Err(e) = watchdog.join()
        {
            tracing::error!("Execution watchdog thread panicked: {:?}", e);
        }

        self.was_fired()
    }
}

impl Drop for ExecutionGuard {
    fn drop(&mut self) {
        self.disarm();
    }
}

impl std::fmt::Debug for ExecutionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionGuard")
            .field("state", &self.state())
            .field("limit", &self.limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[derive(Clone, Default)]
    struct CountingTerminator(Arc<AtomicUsize>);

    impl Terminate for CountingTerminator {
        fn terminate(&self) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[test]
    fn test_idle_guard() {
        let guard = ExecutionGuard::idle();
        assert_eq!(guard.state(), GuardState::Idle);
        assert!(!guard.was_fired());
    }

    #[test]
    fn test_zero_limit_starts_no_watchdog() {
        let terminator = CountingTerminator::default();
        let mut guard = ExecutionGuard::arm(terminator.clone(), Some(Duration::ZERO)).unwrap();

        assert_eq!(guard.state(), GuardState::Armed);
        assert!(guard.watchdog.is_none());
        assert!(!guard.disarm());
        assert_eq!(guard.state(), GuardState::Disarmed);
        assert_eq!(terminator.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_disarm_before_deadline() {
        let terminator = CountingTerminator::default();
        let mut guard =
            ExecutionGuard::arm(terminator.clone(), Some(Duration::from_secs(30))).unwrap();

        let started = Instant::now();
        assert!(!guard.disarm());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(guard.state(), GuardState::Disarmed);
        assert_eq!(terminator.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fires_after_deadline() {
        let terminator = CountingTerminator::default();
        let mut guard =
            ExecutionGuard::arm(terminator.clone(), Some(Duration::from_millis(50))).unwrap();

        thread::sleep(Duration::from_millis(300));

        assert!(guard.disarm());
        assert_eq!(guard.state(), GuardState::Fired);
        assert_eq!(terminator.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_joins_watchdog() {
        let terminator = CountingTerminator::default();
        {
            let _guard =
                ExecutionGuard::arm(terminator.clone(), Some(Duration::from_secs(30))).unwrap();
        }
        // Only the test's handle remains once the watchdog has exited.
        assert_eq!(Arc::strong_count(&terminator.0), 1);
    }
}
