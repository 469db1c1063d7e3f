//! Identity registry: guest object -> live host proxy.
//!
//! Keyed by the guest object's identity hash. Hashes collide, so each bucket
//! holds every live proxy with that hash and lookups confirm with a strict
//! identity comparison against the proxy's own handle.

use std::collections::HashMap;
use std::rc::{Rc, Weak};

use super::proxy::GuestProxy;
use super::state::ContextState;
use crate::host::{HostValue, WeakHostValue};

struct RegistryEntry {
    proxy: Weak<GuestProxy>,
    host: WeakHostValue,
}

#[derive(Default)]
pub(crate) struct IdentityRegistry {
    buckets: HashMap<i32, Vec<RegistryEntry>>,
}

impl IdentityRegistry {
    pub(crate) fn register(&mut self, hash: i32, proxy: &Rc<GuestProxy>, host: WeakHostValue) {
        self.buckets.entry(hash).or_default().push(RegistryEntry {
            proxy: Rc::downgrade(proxy),
            host,
        });
    }

    /// Live candidates for `hash`. Stale entries are pruned on the way.
    pub(crate) fn candidates(&mut self, hash: i32) -> Vec<(Rc<GuestProxy>, HostValue)> {
        let Some(bucket) = self.buckets.get_mut(&hash) else {
            return Vec::new();
        };

        let mut live = Vec::with_capacity(bucket.len());
        bucket.retain(|entry| match (entry.proxy.upgrade(), entry.host.upgrade()) {
            (Some(proxy), Some(host)) => {
                live.push((proxy, host));
                true
            }
            _ => false,
        });

        if bucket.is_empty() {
            self.buckets.remove(&hash);
        }
        live
    }

    /// Drop the entry whose proxy lives at `proxy`.
    pub(crate) fn remove(&mut self, hash: i32, proxy: *const GuestProxy) {
        if let Some(bucket) = self.buckets.get_mut(&hash) {
            bucket.retain(|entry| entry.proxy.as_ptr() != proxy);
            if bucket.is_empty() {
                self.buckets.remove(&hash);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Empty the registry, returning every proxy still referenced.
    pub(crate) fn drain(&mut self) -> Vec<Weak<GuestProxy>> {
        self.buckets
            .drain()
            .flat_map(|(_, bucket)| bucket.into_iter().map(|e| e.proxy))
            .collect()
    }
}

/// The host value already standing for `object`, if any.
pub(crate) fn lookup(
    scope: &mut v8::PinScope,
    state: &ContextState,
    hash: i32,
    object: v8::Local<v8::Object>,
) -> Option<HostValue> {
    let candidates = state.registry.borrow_mut().candidates(hash);
    candidates.into_iter().find_map(|(proxy, host)| {
        let local = proxy.local(scope)?;
        local.strict_equals(object.into()).then_some(host)
    })
}
