//! Proxies in both directions.
//!
//! ```text
//!   host value ──to_guest──▶ guest wrapper ─┬─ private origin tag ──▶ HostProxy
//!                                          └─ weak handle, finalizer releases it
//!
//!   guest object ──to_host──▶ GuestProxy (strong Global) ◀── IdentityRegistry
//! ```
//!
//! A [`HostProxy`] is the payload behind every guest wrapper of a host value.
//! It lives in the context's live table, keyed by id, until the collector
//! finalizes the wrapper or the context is torn down. The wrapper carries a
//! pointer to it both as function data and as a private origin tag, so a
//! wrapper crossing back to the host unwraps to the original value.
//!
//! A [`GuestProxy`] is the host view of a guest function or object. It holds
//! the guest value strongly until the host drops the last reference.

use std::any::Any;
use std::cell::RefCell;
use std::ffi::c_void;
use std::rc::{Rc, Weak};

use super::state::ContextState;
use crate::DeriveExternalSize;
use crate::error::{BridgeError, HostError};
use crate::gc::{ExternalMemoryGuard, ExternalSize};
use crate::host::{ForeignObject, HostCallable, HostRuntime, HostValue};

pub(crate) type ProxyId = u64;

const ORIGIN_TAG: &str = "v8_host_bridge::origin";

/// What a guest wrapper stands for.
#[derive(DeriveExternalSize)]
#[gc(crate_path = "crate")]
pub(crate) enum Payload {
    /// A host value converted to the guest.
    Value(#[gc(track)] HostValue),
    /// A prototype method, dispatched by name on the receiver.
    Method(#[gc(track)] String),
}

pub(crate) struct HostProxy {
    pub(crate) id: ProxyId,
    pub(crate) payload: Payload,
    pub(crate) ctx: Weak<ContextState>,
    _memory: ExternalMemoryGuard,
}

impl HostProxy {
    /// # Safety
    ///
    /// `external` must hold a pointer produced by [`wrap`] whose wrapper is
    /// still reachable, so the live table still owns the proxy.
    pub(crate) unsafe fn from_external<'a>(external: v8::Local<v8::External>) -> &'a HostProxy {
        unsafe { &*(external.value() as *const HostProxy) }
    }
}

/// Entry in the live table. Dropping it releases the host value.
pub(crate) struct LiveEntry {
    pub(crate) proxy: Box<HostProxy>,
    _weak: v8::Weak<v8::Object>,
}

/// Build a guest wrapper for `payload`.
///
/// `build` creates the wrapper object given the external that points at the
/// proxy. The wrapper is tagged, watched by a weak handle, and its proxy
/// recorded in the live table.
pub(crate) fn wrap<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    state: &ContextState,
    payload: Payload,
    build: impl FnOnce(&mut v8::PinScope<'s, '_>, v8::Local<'s, v8::External>) -> Option<v8::Local<'s, v8::Object>>,
) -> Option<v8::Local<'s, v8::Object>> {
    let size = std::mem::size_of::<HostProxy>() + payload.external_size();
    let id = state.next_proxy_id();
    let proxy = Box::new(HostProxy {
        id,
        payload,
        ctx: state.self_ref(),
        _memory: ExternalMemoryGuard::new(&state.ledger, size as i64),
    });

    let external = v8::External::new(scope, &*proxy as *const HostProxy as *mut c_void);
    let object = build(scope, external)?;
    tag_origin(scope, object, external)?;

    let ctx = state.self_ref();
    let weak = v8::Weak::with_guaranteed_finalizer(
        scope,
        object,
        Box::new(move || {
            if let Some(state) = ctx.upgrade() {
                state.release_host_proxy(id);
            }
        }),
    );

    state.insert_live(LiveEntry { proxy, _weak: weak });
    Some(object)
}

fn origin_key<'s>(scope: &mut v8::PinScope<'s, '_>) -> Option<v8::Local<'s, v8::Private>> {
    let name = v8::String::new(scope, ORIGIN_TAG)?;
    Some(v8::Private::for_api(scope, Some(name)))
}

fn tag_origin(
    scope: &mut v8::PinScope,
    object: v8::Local<v8::Object>,
    external: v8::Local<v8::External>,
) -> Option<()> {
    let key = origin_key(scope)?;
    object.set_private(scope, key, external.into())?.then_some(())
}

/// The proxy behind a wrapper created by [`wrap`], if `object` is one.
pub(crate) fn origin_of<'a>(
    scope: &mut v8::PinScope,
    object: v8::Local<v8::Object>,
) -> Option<&'a HostProxy> {
    let key = origin_key(scope)?;
    let tag = object.get_private(scope, key)?;
    let external = v8::Local::<v8::External>::try_from(tag).ok()?;
    // SAFETY: only wrap() sets the tag, and `object` is reachable here.
    Some(unsafe { HostProxy::from_external(external) })
}

/// The original host value behind a wrapper, if `object` is one.
pub(crate) fn origin_value(scope: &mut v8::PinScope, object: v8::Local<v8::Object>) -> Option<HostValue> {
    match &origin_of(scope, object)?.payload {
        Payload::Value(value) => Some(value.clone()),
        Payload::Method(_) => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GuestKind {
    Function,
    Object,
}

/// Host-side view of a guest function or object.
pub struct GuestProxy {
    handle: RefCell<Option<v8::Global<v8::Object>>>,
    identity: i32,
    kind: GuestKind,
    ctx: Weak<ContextState>,
    _memory: ExternalMemoryGuard,
}

impl GuestProxy {
    pub(crate) fn new(
        scope: &mut v8::PinScope,
        state: &ContextState,
        object: v8::Local<v8::Object>,
        kind: GuestKind,
    ) -> Rc<Self> {
        Rc::new(Self {
            handle: RefCell::new(Some(v8::Global::new(scope, object))),
            identity: object.get_identity_hash().get(),
            kind,
            ctx: state.self_ref(),
            _memory: ExternalMemoryGuard::new(&state.ledger, std::mem::size_of::<Self>() as i64),
        })
    }

    pub fn is_function(&self) -> bool {
        self.kind == GuestKind::Function
    }

    /// Whether the owning context is still alive.
    pub fn is_live(&self) -> bool {
        self.handle.borrow().is_some() && self.ctx.strong_count() > 0
    }

    pub(crate) fn belongs_to(&self, state: &ContextState) -> bool {
        std::ptr::eq(self.ctx.as_ptr(), state)
    }

    pub(crate) fn local<'s>(&self, scope: &mut v8::PinScope<'s, '_>) -> Option<v8::Local<'s, v8::Object>> {
        self.handle.borrow().as_ref().map(|global| v8::Local::new(scope, global))
    }

    /// Release the guest value ahead of context teardown.
    pub(crate) fn neutralize(&self) {
        self.handle.borrow_mut().take();
    }

    /// Call the function, or the method `name` on the object.
    pub(crate) fn invoke(&self, method: Option<&str>, args: &[HostValue]) -> Result<HostValue, BridgeError> {
        let state = self.ctx.upgrade().ok_or(BridgeError::ContextGone)?;
        let handle = self.handle.borrow().clone().ok_or(BridgeError::ContextGone)?;
        state.call_guest(&handle, method, args)
    }
}

impl HostCallable for GuestProxy {
    fn call(&self, _runtime: &HostRuntime, args: &[HostValue]) -> Result<Vec<HostValue>, HostError> {
        Ok(vec![self.invoke(None, args)?])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ForeignObject for GuestProxy {
    fn call_method(
        &self,
        _runtime: &HostRuntime,
        _receiver: &HostValue,
        name: &str,
        args: &[HostValue],
    ) -> Result<Vec<HostValue>, HostError> {
        Ok(vec![self.invoke(Some(name), args)?])
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for GuestProxy {
    fn drop(&mut self) {
        if let Some(state) = self.ctx.upgrade()
            && let Ok(mut registry) = state.registry.try_borrow_mut()
        {
            registry.remove(self.identity, self as *const Self);
        }
    }
}

impl std::fmt::Debug for GuestProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestProxy")
            .field("kind", &self.kind)
            .field("identity", &self.identity)
            .field("live", &self.is_live())
            .finish()
    }
}
