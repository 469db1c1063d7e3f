//! BridgeContext - one guest context bridged to a host runtime.

use std::pin::pin;
use std::rc::Rc;

use super::convert::{self, GuestSeen, HostSeen};
use super::proxy::GuestProxy;
use super::state::{ContextState, Failure};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, HostError};
use crate::gc::JsLock;
use crate::host::{HostRuntime, HostValue};
use crate::security::{HeapLimitState, heap_limit};

/// Counters describing a context's bridge state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Guest wrappers of host values not yet collected.
    pub live_host_proxies: usize,
    /// Host proxies of guest functions and objects still held by the host.
    pub guest_proxies: usize,
    /// Bytes reported to the collector as external memory.
    pub accounted_bytes: i64,
    /// Values that could not cross and became undef.
    pub conversion_warnings: u64,
    /// Host classes with a built guest prototype.
    pub cached_prototypes: usize,
}

/// Builder for [`BridgeContext`].
///
/// ```rust,ignore
/// let ctx = BridgeContext::builder()
///     .host(runtime.clone())
///     .time_limit_secs(1)
///     .blessing("Guest::")
///     .build()?;
/// ```
#[derive(Default)]
pub struct BridgeContextBuilder {
    host: Option<Rc<HostRuntime>>,
    config: BridgeConfig,
}

impl BridgeContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host runtime to bridge to. A fresh one is created if unset.
    pub fn host(mut self, host: Rc<HostRuntime>) -> Self {
        self.host = Some(host);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn time_limit_secs(mut self, secs: u64) -> Self {
        self.config.time_limit_secs = secs;
        self
    }

    pub fn flags(mut self, flags: impl Into<String>) -> Self {
        self.config.flags = Some(flags.into());
        self
    }

    /// Enable blessing of class-tagged guest objects under `prefix`.
    pub fn blessing(mut self, prefix: impl Into<String>) -> Self {
        self.config.enable_blessing = true;
        self.config.bless_prefix = prefix.into();
        self
    }

    pub fn class_tag_property(mut self, property: impl Into<String>) -> Self {
        self.config.class_tag_property = property.into();
        self
    }

    pub fn heap_max_mb(mut self, mb: usize) -> Self {
        self.config.heap_max_mb = mb;
        self
    }

    pub fn build(self) -> Result<BridgeContext, BridgeError> {
        BridgeContext::new(self.host.unwrap_or_else(HostRuntime::new), self.config)
    }
}

/// A guest context with its own isolate, bridged to a host runtime.
///
/// The isolate is entered only while the bridge works in it, so any number
/// of contexts can share a thread and be used and dropped in any order.
pub struct BridgeContext {
    // Field order is drop order: bridge state, then the isolate, then the
    // heap limit state the isolate calls into.
    state: Rc<ContextState>,
    isolate: v8::OwnedIsolate,
    _heap_limit: Option<Box<HeapLimitState>>,
}

impl BridgeContext {
    pub fn builder() -> BridgeContextBuilder {
        BridgeContextBuilder::new()
    }

    pub fn new(host: Rc<HostRuntime>, config: BridgeConfig) -> Result<Self, BridgeError> {
        crate::platform::init(config.flags.as_deref());

        let max_heap_bytes = config.heap_max_mb * 1024 * 1024;
        let mut params = v8::CreateParams::default();
        if max_heap_bytes > 0 {
            params = params.heap_limits(0, max_heap_bytes);
        }
        let mut isolate = v8::Isolate::new(params);

        let heap_limit = (max_heap_bytes > 0).then(|| heap_limit::install(&mut isolate, max_heap_bytes));

        let context = {
            let scope = pin!(v8::HandleScope::new(&mut *isolate));
            let mut scope = scope.init();
            let context = v8::Context::new(&scope, Default::default());
            let scope = &mut v8::ContextScope::new(&mut scope, context);
            v8::Global::new(scope.as_ref(), context)
        };

        let state = ContextState::new(
            host,
            config,
            &mut *isolate as *mut v8::Isolate,
            context,
            heap_limit.as_deref().map(|s| s as *const HeapLimitState),
        );

        // The isolate was entered on creation. Leave it until the next
        // JsLock so other contexts on this thread are unaffected.
        // SAFETY: nothing has entered another isolate since creation.
        unsafe { isolate.exit() };

        tracing::debug!(
            "bridge context created (time limit: {:?}, blessing: {})",
            state.config.time_limit(),
            state.config.enable_blessing
        );

        Ok(Self {
            state,
            isolate,
            _heap_limit: heap_limit,
        })
    }

    pub fn host(&self) -> &Rc<HostRuntime> {
        &self.state.host
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.state.config
    }

    /// Install `value` as the guest global `name`.
    pub fn bind(&self, name: &str, value: &HostValue) -> Result<(), BridgeError> {
        self.state.enter(|scope, state| {
            let key = v8::String::new(scope, name)
                .ok_or_else(|| BridgeError::Engine(format!("global name too long: {} bytes", name.len())))?;
            let converted = convert::to_guest(scope, state, value, &mut HostSeen::new());
            let global = scope.get_current_context().global(scope);
            global.set(scope, key.into(), converted).ok_or(Failure::Runtime)?;
            tracing::trace!("bound global {} ({})", name, value.kind());
            Ok(())
        })
    }

    /// Compile and run `source`, labelled `origin` in diagnostics.
    ///
    /// On failure the error is also stored as the host runtime's last error;
    /// on success the slot is cleared.
    pub fn eval(&self, source: &str, origin: &str) -> Result<HostValue, BridgeError> {
        let result = self.state.enter(|scope, state| {
            let code = v8::String::new(scope, source)
                .ok_or_else(|| BridgeError::Engine(format!("source too long: {} bytes", source.len())))?;
            let name = v8::String::new(scope, origin)
                .ok_or_else(|| BridgeError::Engine("origin label too long".into()))?;
            let script_origin = v8::ScriptOrigin::new(
                scope,
                name.into(),
                0,
                0,
                false,
                0,
                None,
                false,
                false,
                false,
                None,
            );

            let script = v8::Script::compile(scope, code, Some(&script_origin)).ok_or(Failure::Compile)?;
            let value = script.run(scope).ok_or(Failure::Runtime)?;
            Ok(convert::to_host(scope, state, value, &mut GuestSeen::default()))
        });
        self.record_outcome(&result);
        result
    }

    /// Call a guest function previously obtained from this context.
    pub fn call_guest_function(&self, function: &HostValue, args: &[HostValue]) -> Result<HostValue, BridgeError> {
        let proxy = function
            .as_code()
            .and_then(|code| code.downcast_ref::<GuestProxy>())
            .filter(|proxy| proxy.belongs_to(&self.state) && proxy.is_function())
            .ok_or(BridgeError::NotAGuestFunction)?;

        let result = proxy.invoke(None, args);
        self.record_outcome(&result);
        result
    }

    fn record_outcome(&self, result: &Result<HostValue, BridgeError>) {
        match result {
            Ok(_) => self.state.host.clear_error(),
            Err(err) => {
                tracing::debug!("guest entry failed: {}", err);
                self.state.host.set_error(HostError::from(err.clone()));
            }
        }
    }

    /// Run a full collection and let pending finalizers release their host
    /// values.
    pub fn idle_notification(&mut self) {
        if self.state.is_torn_down() {
            return;
        }
        {
            let _lock = JsLock::new(&mut self.isolate, &self.state.ledger);
            self.isolate.low_memory_notification();
            if let Some(platform) = crate::platform::get_platform() {
                while v8::Platform::pump_message_loop(platform, &self.isolate, false) {}
            }
        }
        self.state.process_deferred();
        tracing::trace!("idle notification: {} host proxies live", self.state.live_host_proxies());
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            live_host_proxies: self.state.live_host_proxies(),
            guest_proxies: self.state.registry.borrow().len(),
            accounted_bytes: self.state.ledger.accounted(),
            conversion_warnings: self.state.warning_count(),
            cached_prototypes: self.state.prototypes.borrow().len(),
        }
    }
}

impl Drop for BridgeContext {
    fn drop(&mut self) {
        self.state.teardown();
        // The owned isolate exits itself when dropped, and must be the
        // current isolate at that point.
        // SAFETY: balanced by that exit; nothing runs in between.
        unsafe { self.isolate.enter() };
    }
}

impl std::fmt::Debug for BridgeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeContext")
            .field("config", &self.state.config)
            .field("stats", &self.stats())
            .finish()
    }
}
