//! Flattened guest prototypes for host classes.
//!
//! The guest sees one prototype object per host class. Methods are gathered
//! along the class's linearized ancestors, most derived first, and the first
//! definition of a name wins, so overrides shadow inherited methods exactly
//! as host dispatch would. Prototypes are built on first use and kept until
//! the context is torn down.

use std::collections::{HashMap, HashSet};

use super::callable;
use super::state::ContextState;

#[derive(Default)]
pub(crate) struct ClassProxyCache {
    prototypes: HashMap<String, v8::Global<v8::Object>>,
}

impl ClassProxyCache {
    pub(crate) fn len(&self) -> usize {
        self.prototypes.len()
    }

    pub(crate) fn clear(&mut self) {
        self.prototypes.clear();
    }
}

/// The cached prototype for `class`, building it on first use.
pub(crate) fn get_prototype<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    state: &ContextState,
    class: &str,
) -> Option<v8::Local<'s, v8::Object>> {
    if let Some(global) = state.prototypes.borrow().prototypes.get(class) {
        return Some(v8::Local::new(scope, global));
    }

    let ancestors = state.host.linear_isa(class).unwrap_or_else(|err| {
        tracing::warn!("cannot linearize {}: {}", class, err);
        vec![class.into()]
    });

    let prototype = v8::Object::new(scope);
    let mut installed = HashSet::new();
    for ancestor in &ancestors {
        for (name, _) in state.host.local_methods(ancestor) {
            if !installed.insert(name.clone()) {
                continue;
            }
            let Some(function) = callable::method_function(scope, state, &name) else {
                tracing::warn!("cannot create method {}::{}", ancestor, name);
                continue;
            };
            let Some(key) = v8::String::new(scope, &name) else {
                continue;
            };
            prototype.set(scope, key.into(), function.into());
        }
    }

    tracing::debug!(
        "built prototype for {} with {} methods from {} classes",
        class,
        installed.len(),
        ancestors.len()
    );
    state
        .prototypes
        .borrow_mut()
        .prototypes
        .insert(class.to_string(), v8::Global::new(scope, prototype));
    Some(prototype)
}
