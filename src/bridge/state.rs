//! Per-context state shared by the bridge machinery.
//!
//! Everything a callback needs to find its way back to the host lives here:
//! the host runtime, the identity registry, the live table of host proxies,
//! and the prototype cache. Callbacks reach it through the `Weak` stored in
//! each proxy, so nothing here keeps a torn-down context alive.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::pin::pin;
use std::rc::{Rc, Weak};

use super::convert::{self, GuestSeen, HostSeen};
use super::prototype::ClassProxyCache;
use super::proxy::{LiveEntry, ProxyId};
use super::registry::IdentityRegistry;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, ConversionWarning, GuestException, SourceLocation};
use crate::gc::{ExternalMemoryLedger, JsLock, RetiredHandleQueue};
use crate::host::{HostRuntime, HostValue};
use crate::security::{ExecutionGuard, HeapLimitState};

/// Why a step inside [`ContextState::enter`] stopped early.
pub(crate) enum Failure {
    /// Compilation threw; the exception is pending in the try/catch.
    Compile,
    /// Execution threw; the exception is pending in the try/catch.
    Runtime,
    Bridge(BridgeError),
}

impl From<BridgeError> for Failure {
    fn from(err: BridgeError) -> Self {
        Failure::Bridge(err)
    }
}

pub(crate) struct ContextState {
    pub(crate) host: Rc<HostRuntime>,
    pub(crate) config: BridgeConfig,
    pub(crate) ledger: Rc<ExternalMemoryLedger>,
    pub(crate) retired: RetiredHandleQueue,
    pub(crate) registry: RefCell<IdentityRegistry>,
    pub(crate) prototypes: RefCell<ClassProxyCache>,
    isolate: *mut v8::Isolate,
    context: RefCell<Option<v8::Global<v8::Context>>>,
    live: RefCell<HashMap<ProxyId, LiveEntry>>,
    deferred_releases: RefCell<Vec<ProxyId>>,
    heap_limit: Option<*const HeapLimitState>,
    depth: Cell<u32>,
    torn_down: Cell<bool>,
    warnings: Cell<u64>,
    next_proxy_id: Cell<ProxyId>,
    self_ref: Weak<ContextState>,
}

impl ContextState {
    /// `isolate` and `heap_limit` must outlive the returned state; the
    /// owning [`BridgeContext`](super::BridgeContext) guarantees it.
    pub(crate) fn new(
        host: Rc<HostRuntime>,
        config: BridgeConfig,
        isolate: *mut v8::Isolate,
        context: v8::Global<v8::Context>,
        heap_limit: Option<*const HeapLimitState>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|self_ref| Self {
            host,
            config,
            ledger: ExternalMemoryLedger::new(),
            retired: RetiredHandleQueue::new(),
            registry: RefCell::new(IdentityRegistry::default()),
            prototypes: RefCell::new(ClassProxyCache::default()),
            isolate,
            context: RefCell::new(Some(context)),
            live: RefCell::new(HashMap::new()),
            deferred_releases: RefCell::new(Vec::new()),
            heap_limit,
            depth: Cell::new(0),
            torn_down: Cell::new(false),
            warnings: Cell::new(0),
            next_proxy_id: Cell::new(1),
            self_ref: self_ref.clone(),
        })
    }

    pub(crate) fn self_ref(&self) -> Weak<ContextState> {
        self.self_ref.clone()
    }

    pub(crate) fn next_proxy_id(&self) -> ProxyId {
        let id = self.next_proxy_id.get();
        self.next_proxy_id.set(id + 1);
        id
    }

    pub(crate) fn is_torn_down(&self) -> bool {
        self.torn_down.get()
    }

    pub(crate) fn warn(&self, warning: ConversionWarning) {
        self.warnings.set(self.warnings.get() + 1);
        tracing::warn!("{}", warning);
    }

    pub(crate) fn warning_count(&self) -> u64 {
        self.warnings.get()
    }

    pub(crate) fn live_host_proxies(&self) -> usize {
        self.live.borrow().len()
    }

    pub(crate) fn insert_live(&self, entry: LiveEntry) {
        self.live.borrow_mut().insert(entry.proxy.id, entry);
    }

    /// Finalizer path: the guest wrapper for `id` was collected.
    ///
    /// The entry is retired rather than dropped, since this runs from inside
    /// the collector's finalizer dispatch and releasing the host value may
    /// drop engine handles.
    pub(crate) fn release_host_proxy(&self, id: ProxyId) {
        let Ok(mut live) = self.live.try_borrow_mut() else {
            self.deferred_releases.borrow_mut().push(id);
            return;
        };
        let entry = live.remove(&id);
        drop(live);

        if let Some(entry) = entry {
            tracing::trace!("retiring host proxy {}", id);
            self.retired.retire(entry);
        }
    }

    pub(crate) fn process_deferred(&self) {
        let ids = std::mem::take(&mut *self.deferred_releases.borrow_mut());
        for id in ids {
            self.release_host_proxy(id);
        }
        self.retired.process_all();
    }

    /// Enter the isolate and context and run `f` inside a try/catch.
    ///
    /// The outermost entry arms the execution guard; nested entries from
    /// guest callbacks share it. A pending guest exception is rendered into
    /// a [`BridgeError`] here.
    pub(crate) fn enter<R>(
        &self,
        f: impl FnOnce(&mut v8::PinScope, &ContextState) -> Result<R, Failure>,
    ) -> Result<R, BridgeError> {
        if self.torn_down.get() {
            return Err(BridgeError::ContextGone);
        }
        let context = self.context.borrow().clone().ok_or(BridgeError::ContextGone)?;
        self.process_deferred();

        // SAFETY: the owning BridgeContext keeps the isolate alive for as
        // long as this state is reachable, and all access is single-threaded.
        let isolate = unsafe { &mut *self.isolate };
        let _lock = JsLock::new(isolate, &self.ledger);

        let outermost = self.depth.get() == 0;
        let mut guard = if outermost {
            ExecutionGuard::arm(isolate.thread_safe_handle(), self.config.time_limit())
                .map_err(|e| BridgeError::Engine(format!("failed to start watchdog: {e}")))?
        } else {
            ExecutionGuard::idle()
        };
        let limit = self.config.time_limit().unwrap_or_default();

        self.depth.set(self.depth.get() + 1);
        let result = {
            let scope = pin!(v8::HandleScope::new(&mut *isolate));
            let mut scope = scope.init();
            let ctx = v8::Local::new(&scope, &context);
            let scope = &mut v8::ContextScope::new(&mut scope, ctx);
            let tc = pin!(v8::TryCatch::new(scope));
            let mut tc = tc.init();

            match f(&mut tc, self) {
                Ok(value) => Ok(value),
                Err(Failure::Bridge(err)) => Err(err),
                Err(_) if tc.has_terminated() => Err(BridgeError::Terminated(limit)),
                Err(failure) => {
                    let rendered = render_exception(&tc, tc.exception(), tc.message());
                    Err(match failure {
                        Failure::Compile => BridgeError::GuestCompile(rendered),
                        _ => BridgeError::GuestRuntime(rendered),
                    })
                }
            }
        };
        self.depth.set(self.depth.get() - 1);

        let fired = outermost && guard.disarm();
        let heap_hit = outermost && self.heap_limit_hit();
        if fired || heap_hit {
            isolate.cancel_terminate_execution();
        }

        if heap_hit {
            return Err(BridgeError::Engine("guest heap limit exceeded".into()));
        }
        if fired {
            tracing::warn!("guest execution terminated after {:?}", limit);
            return Err(BridgeError::Terminated(limit));
        }
        result
    }

    fn heap_limit_hit(&self) -> bool {
        // SAFETY: the owning BridgeContext drops the heap limit state after
        // this state.
        self.heap_limit.is_some_and(|state| unsafe {
            let state = &*state;
            let hit = state.was_hit();
            state.reset();
            hit
        })
    }

    /// Host-to-guest call: invoke a function, or a method on an object.
    pub(crate) fn call_guest(
        &self,
        handle: &v8::Global<v8::Object>,
        method: Option<&str>,
        args: &[HostValue],
    ) -> Result<HostValue, BridgeError> {
        self.enter(|scope, state| {
            let target = v8::Local::new(scope, handle);

            let (callee, receiver): (v8::Local<v8::Value>, v8::Local<v8::Value>) = match method {
                None => {
                    let global = scope.get_current_context().global(scope);
                    (target.into(), global.into())
                }
                Some(name) => {
                    let key = v8::String::new(scope, name)
                        .ok_or_else(|| BridgeError::Engine("method name too long".into()))?;
                    let callee = target.get(scope, key.into()).ok_or(Failure::Runtime)?;
                    (callee, target.into())
                }
            };

            let function = v8::Local::<v8::Function>::try_from(callee).map_err(|_| {
                BridgeError::HostCall(match method {
                    Some(name) => format!("guest object has no method \"{name}\""),
                    None => "guest value is not callable".to_string(),
                })
            })?;

            let mut seen = HostSeen::new();
            let argv: Vec<v8::Local<v8::Value>> = args
                .iter()
                .map(|arg| convert::to_guest(scope, state, arg, &mut seen))
                .collect();

            let result = function.call(scope, receiver, &argv).ok_or(Failure::Runtime)?;
            Ok(convert::to_host(scope, state, result, &mut GuestSeen::default()))
        })
    }

    /// Tear down all bridge state for this context. The isolate must still
    /// be alive; it is dropped by the caller afterward.
    pub(crate) fn teardown(&self) {
        if self.torn_down.replace(true) {
            return;
        }

        // SAFETY: called by the owning BridgeContext before it drops the isolate.
        let isolate = unsafe { &mut *self.isolate };
        let _lock = JsLock::new(isolate, &self.ledger);

        let proxies = self.registry.borrow_mut().drain();
        let neutralized = proxies
            .iter()
            .filter_map(Weak::upgrade)
            .inspect(|proxy| proxy.neutralize())
            .count();

        // Entries are dropped outside the borrow: releasing host values can
        // drop guest proxies, which touch the registry.
        let live = std::mem::take(&mut *self.live.borrow_mut());
        let released = live.len();
        drop(live);

        self.prototypes.borrow_mut().clear();
        self.context.borrow_mut().take();
        self.deferred_releases.borrow_mut().clear();
        self.retired.process_all();

        tracing::debug!(
            "bridge context torn down: {} guest proxies neutralized, {} host proxies released",
            neutralized,
            released
        );
    }
}

fn render_exception(
    scope: &v8::PinScope,
    exception: Option<v8::Local<v8::Value>>,
    message: Option<v8::Local<v8::Message>>,
) -> GuestException {
    let text = exception
        .and_then(|e| e.to_string(scope))
        .map(|s| s.to_rust_string_lossy(scope))
        .or_else(|| message.map(|m| m.get(scope).to_rust_string_lossy(scope)))
        .unwrap_or_else(|| "unknown guest exception".to_string());

    let location = message.and_then(|m| {
        let origin = m
            .get_script_resource_name(scope)
            .and_then(|name| name.to_string(scope))
            .map(|name| name.to_rust_string_lossy(scope))
            .unwrap_or_default();
        let line = m.get_line_number(scope)?;
        Some(SourceLocation {
            origin,
            line,
            column: m.get_start_column() + 1,
        })
    });

    GuestException {
        message: text,
        location,
    }
}
