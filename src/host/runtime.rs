//! The host runtime: class table, invocation, and the last-error slot.

use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use super::class::{HostClass, linearize};
use super::value::{HostCode, HostObject, HostValue, ObjectPayload};
use crate::error::HostError;

/// Host interpreter state shared by every bridge context that embeds it.
#[derive(Default)]
pub struct HostRuntime {
    classes: RefCell<HashMap<Rc<str>, HostClass>>,
    last_error: RefCell<Option<HostError>>,
}

impl HostRuntime {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Register or replace a class.
    pub fn define_class(&self, class: HostClass) {
        let name: Rc<str> = class.name().into();
        tracing::debug!("defining host class {}", name);
        self.classes.borrow_mut().insert(name, class);
    }

    /// Register an empty class unless one already exists.
    pub fn ensure_class(&self, name: &str) {
        let mut classes = self.classes.borrow_mut();
        if !classes.contains_key(name) {
            classes.insert(name.into(), HostClass::new(name));
        }
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes.borrow().contains_key(name)
    }

    /// Linearized ancestors of `class`, most derived first.
    pub fn linear_isa(&self, class: &str) -> Result<Vec<Rc<str>>, HostError> {
        linearize(&self.classes.borrow(), class)
    }

    /// Methods defined directly on `class`, in definition order.
    pub fn local_methods(&self, class: &str) -> Vec<(String, HostCode)> {
        self.classes
            .borrow()
            .get(class)
            .map(|c| c.methods().map(|(n, m)| (n.to_string(), m.clone())).collect())
            .unwrap_or_default()
    }

    /// Find `method` along the linearized ancestors of `class`.
    pub fn resolve_method(&self, class: &str, method: &str) -> Result<Option<HostCode>, HostError> {
        let linear = self.linear_isa(class)?;
        let classes = self.classes.borrow();
        Ok(linear
            .iter()
            .find_map(|c| classes.get(c).and_then(|c| c.method(method)).cloned()))
    }

    /// Bless a field map into `class`.
    pub fn bless<K: Into<String>>(
        &self,
        class: &str,
        fields: impl IntoIterator<Item = (K, HostValue)>,
    ) -> HostValue {
        self.ensure_class(class);
        HostValue::Object(HostObject::with_fields(class, fields))
    }

    /// Invoke a callable by reference.
    pub fn call(&self, code: &HostCode, args: &[HostValue]) -> Result<Vec<HostValue>, HostError> {
        code.call(self, args)
    }

    /// Invoke `name` on `receiver`; the receiver is passed as the first
    /// argument. Methods resolved through the class hierarchy take
    /// precedence over a foreign payload's own dispatch.
    pub fn call_method(
        &self,
        receiver: &HostValue,
        name: &str,
        args: &[HostValue],
    ) -> Result<Vec<HostValue>, HostError> {
        let HostValue::Object(object) = receiver else {
            return Err(HostError::new(format!(
                "Can't call method \"{name}\" on unblessed {} value",
                receiver.kind()
            )));
        };

        if let Some(code) = self.resolve_method(object.class(), name)? {
            let mut full = Vec::with_capacity(args.len() + 1);
            full.push(receiver.clone());
            full.extend_from_slice(args);
            return code.call(self, &full);
        }

        match object.payload() {
            ObjectPayload::Foreign(foreign) => foreign.call_method(self, receiver, name, args),
            ObjectPayload::Fields(_) => Err(HostError::new(format!(
                "Can't locate object method \"{name}\" via package \"{}\"",
                object.class()
            ))),
        }
    }

    /// Like [`call_method`](Self::call_method), with error-catching
    /// semantics: failures and panics land in the last-error slot.
    pub fn call_method_catching(
        &self,
        receiver: &HostValue,
        name: &str,
        args: &[HostValue],
    ) -> Result<Vec<HostValue>, HostError> {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.call_method(receiver, name, args)))
            .unwrap_or_else(|panic| Err(HostError::new(panic_message(panic.as_ref()))));

        match outcome {
            Ok(values) => {
                self.clear_error();
                Ok(values)
            }
            Err(err) => {
                self.set_error(err.clone());
                Err(err)
            }
        }
    }

    pub fn last_error(&self) -> Option<HostError> {
        self.last_error.borrow().clone()
    }

    pub fn set_error(&self, err: HostError) {
        *self.last_error.borrow_mut() = Some(err);
    }

    pub fn clear_error(&self) {
        self.last_error.borrow_mut().take();
    }

    pub fn take_error(&self) -> Option<HostError> {
        self.last_error.borrow_mut().take()
    }
}

impl std::fmt::Debug for HostRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostRuntime")
            .field("classes", &self.classes.borrow().len())
            .field("last_error", &self.last_error.borrow())
            .finish()
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("host code panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("host code panicked: {s}")
    } else {
        "host code panicked".to_string()
    }
}
