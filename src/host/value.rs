//! Host values.
//!
//! Lifetime is plain reference counting: cloning a [`HostValue`] retains it,
//! dropping it releases it. Aggregates, callables and blessed objects have
//! identity (two handles may point at the same allocation); scalars do not.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use super::runtime::HostRuntime;
use crate::error::HostError;

/// A value owned by the host runtime.
#[derive(Clone, Default)]
pub enum HostValue {
    #[default]
    Undef,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(Rc<str>),
    Array(HostArray),
    Hash(HostHash),
    Code(HostCode),
    Object(HostObject),
    /// A host value with no guest counterpart (filehandle, glob, ...).
    Opaque(Rc<str>),
}

impl HostValue {
    pub fn str(s: impl Into<Rc<str>>) -> Self {
        HostValue::Str(s.into())
    }

    pub fn array(items: impl IntoIterator<Item = HostValue>) -> Self {
        HostValue::Array(HostArray::from_iter(items))
    }

    pub fn hash<K: Into<String>>(entries: impl IntoIterator<Item = (K, HostValue)>) -> Self {
        HostValue::Hash(HostHash::from_iter(entries))
    }

    pub fn is_undef(&self) -> bool {
        matches!(self, HostValue::Undef)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            HostValue::Int(i) => Some(*i),
            HostValue::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            HostValue::Float(f) => Some(*f),
            HostValue::Int(i) => Some(*i as f64),
            HostValue::UInt(u) => Some(*u as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&HostArray> {
        match self {
            HostValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<&HostHash> {
        match self {
            HostValue::Hash(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_code(&self) -> Option<&HostCode> {
        match self {
            HostValue::Code(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HostObject> {
        match self {
            HostValue::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Short category name, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            HostValue::Undef => "undef",
            HostValue::Bool(_) => "bool",
            HostValue::Int(_) => "int",
            HostValue::UInt(_) => "uint",
            HostValue::Float(_) => "float",
            HostValue::Str(_) => "string",
            HostValue::Array(_) => "array",
            HostValue::Hash(_) => "hash",
            HostValue::Code(_) => "code",
            HostValue::Object(_) => "object",
            HostValue::Opaque(_) => "opaque",
        }
    }

    /// Stable address of the referenced allocation, for reference values.
    pub(crate) fn identity(&self) -> Option<usize> {
        match self {
            HostValue::Array(a) => Some(Rc::as_ptr(&a.0) as *const () as usize),
            HostValue::Hash(h) => Some(Rc::as_ptr(&h.0) as *const () as usize),
            HostValue::Code(c) => Some(Rc::as_ptr(&c.0) as *const () as usize),
            HostValue::Object(o) => Some(Rc::as_ptr(&o.0) as *const () as usize),
            _ => None,
        }
    }

    /// True when both values are references to the same allocation.
    pub fn ptr_eq(&self, other: &HostValue) -> bool {
        match (self.identity(), other.identity()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub(crate) fn downgrade(&self) -> Option<WeakHostValue> {
        match self {
            HostValue::Code(c) => Some(WeakHostValue::Code(Rc::downgrade(&c.0))),
            HostValue::Object(o) => Some(WeakHostValue::Object(Rc::downgrade(&o.0))),
            _ => None,
        }
    }
}

/// Scalars compare by value, references by identity.
impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Undef, HostValue::Undef) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Int(a), HostValue::Int(b)) => a == b,
            (HostValue::UInt(a), HostValue::UInt(b)) => a == b,
            (HostValue::Float(a), HostValue::Float(b)) => a == b,
            (HostValue::Str(a), HostValue::Str(b)) => a == b,
            (HostValue::Opaque(a), HostValue::Opaque(b)) => a == b,
            _ => self.ptr_eq(other),
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Undef => write!(f, "Undef"),
            HostValue::Bool(b) => write!(f, "Bool({b})"),
            HostValue::Int(i) => write!(f, "Int({i})"),
            HostValue::UInt(u) => write!(f, "UInt({u})"),
            HostValue::Float(x) => write!(f, "Float({x})"),
            HostValue::Str(s) => write!(f, "Str({s:?})"),
            HostValue::Array(a) => write!(f, "ARRAY(len={}, {:#x})", a.len(), self.identity().unwrap_or(0)),
            HostValue::Hash(h) => write!(f, "HASH(len={}, {:#x})", h.len(), self.identity().unwrap_or(0)),
            HostValue::Code(_) => write!(f, "CODE({:#x})", self.identity().unwrap_or(0)),
            HostValue::Object(o) => write!(f, "{}=OBJECT({:#x})", o.class(), self.identity().unwrap_or(0)),
            HostValue::Opaque(what) => write!(f, "Opaque({what})"),
        }
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

impl From<i64> for HostValue {
    fn from(i: i64) -> Self {
        HostValue::Int(i)
    }
}

impl From<i32> for HostValue {
    fn from(i: i32) -> Self {
        HostValue::Int(i.into())
    }
}

impl From<u64> for HostValue {
    fn from(u: u64) -> Self {
        HostValue::UInt(u)
    }
}

impl From<f64> for HostValue {
    fn from(x: f64) -> Self {
        HostValue::Float(x)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::Str(s.into())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::Str(s.into())
    }
}

impl From<HostArray> for HostValue {
    fn from(a: HostArray) -> Self {
        HostValue::Array(a)
    }
}

impl From<HostHash> for HostValue {
    fn from(h: HostHash) -> Self {
        HostValue::Hash(h)
    }
}

impl From<HostCode> for HostValue {
    fn from(c: HostCode) -> Self {
        HostValue::Code(c)
    }
}

impl From<HostObject> for HostValue {
    fn from(o: HostObject) -> Self {
        HostValue::Object(o)
    }
}

/// Indexed sequence, shared by reference.
#[derive(Clone, Default)]
pub struct HostArray(pub(crate) Rc<RefCell<Vec<HostValue>>>);

impl HostArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(Rc::new(RefCell::new(Vec::with_capacity(capacity))))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<HostValue> {
        self.0.borrow().get(index).cloned()
    }

    pub fn push(&self, value: HostValue) {
        self.0.borrow_mut().push(value);
    }

    pub fn set(&self, index: usize, value: HostValue) {
        let mut items = self.0.borrow_mut();
        if index >= items.len() {
            items.resize(index + 1, HostValue::Undef);
        }
        items[index] = value;
    }

    /// Snapshot of the elements. Cloning retains each element.
    pub fn to_vec(&self) -> Vec<HostValue> {
        self.0.borrow().clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl FromIterator<HostValue> for HostArray {
    fn from_iter<I: IntoIterator<Item = HostValue>>(iter: I) -> Self {
        Self(Rc::new(RefCell::new(iter.into_iter().collect())))
    }
}

/// Keyed mapping, shared by reference. Iteration follows insertion order.
#[derive(Clone, Default)]
pub struct HostHash(pub(crate) Rc<RefCell<IndexMap<String, HostValue>>>);

impl HostHash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn get(&self, key: &str) -> Option<HostValue> {
        self.0.borrow().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: HostValue) -> Option<HostValue> {
        self.0.borrow_mut().insert(key.into(), value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    /// Snapshot of the entries. Cloning retains each value.
    pub fn entries(&self) -> Vec<(String, HostValue)> {
        self.0
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }

    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl<K: Into<String>> FromIterator<(K, HostValue)> for HostHash {
    fn from_iter<I: IntoIterator<Item = (K, HostValue)>>(iter: I) -> Self {
        Self(Rc::new(RefCell::new(
            iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )))
    }
}

/// Anything the host runtime can invoke.
pub trait HostCallable: Any {
    /// Invoke with positional arguments. Returns the full result list.
    fn call(&self, runtime: &HostRuntime, args: &[HostValue]) -> Result<Vec<HostValue>, HostError>;

    fn as_any(&self) -> &dyn Any;
}

type NativeFn = dyn Fn(&HostRuntime, &[HostValue]) -> Result<Vec<HostValue>, HostError>;

struct NativeCode {
    f: Box<NativeFn>,
}

impl HostCallable for NativeCode {
    fn call(&self, runtime: &HostRuntime, args: &[HostValue]) -> Result<Vec<HostValue>, HostError> {
        (self.f)(runtime, args)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A host callable, shared by reference.
#[derive(Clone)]
pub struct HostCode(pub(crate) Rc<dyn HostCallable>);

impl HostCode {
    /// Wrap a closure producing exactly one value.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&HostRuntime, &[HostValue]) -> Result<HostValue, HostError> + 'static,
    {
        Self::new_list(move |rt, args| f(rt, args).map(|v| vec![v]))
    }

    /// Wrap a closure producing a list of values.
    pub fn new_list<F>(f: F) -> Self
    where
        F: Fn(&HostRuntime, &[HostValue]) -> Result<Vec<HostValue>, HostError> + 'static,
    {
        Self(Rc::new(NativeCode { f: Box::new(f) }))
    }

    pub fn from_callable(callable: Rc<dyn HostCallable>) -> Self {
        Self(callable)
    }

    pub fn call(&self, runtime: &HostRuntime, args: &[HostValue]) -> Result<Vec<HostValue>, HostError> {
        self.0.call(runtime, args)
    }

    pub fn downcast_ref<T: HostCallable>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &HostCode) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

/// Object state implemented outside the host runtime, such as a guest object
/// seen through a proxy.
pub trait ForeignObject: Any {
    /// Invoke the method `name` with `receiver` as the invocant.
    fn call_method(
        &self,
        runtime: &HostRuntime,
        receiver: &HostValue,
        name: &str,
        args: &[HostValue],
    ) -> Result<Vec<HostValue>, HostError>;

    fn as_any(&self) -> &dyn Any;
}

pub enum ObjectPayload {
    Fields(RefCell<IndexMap<String, HostValue>>),
    Foreign(Rc<dyn ForeignObject>),
}

pub(crate) struct ObjectInner {
    class: Rc<str>,
    payload: ObjectPayload,
}

/// A blessed value: a class name plus its payload.
#[derive(Clone)]
pub struct HostObject(pub(crate) Rc<ObjectInner>);

impl HostObject {
    pub fn new(class: impl Into<Rc<str>>, payload: ObjectPayload) -> Self {
        Self(Rc::new(ObjectInner {
            class: class.into(),
            payload,
        }))
    }

    pub fn with_fields<K: Into<String>>(
        class: impl Into<Rc<str>>,
        fields: impl IntoIterator<Item = (K, HostValue)>,
    ) -> Self {
        let fields = fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self::new(class, ObjectPayload::Fields(RefCell::new(fields)))
    }

    pub fn class(&self) -> &str {
        &self.0.class
    }

    pub fn payload(&self) -> &ObjectPayload {
        &self.0.payload
    }

    pub fn field(&self, name: &str) -> Option<HostValue> {
        match &self.0.payload {
            ObjectPayload::Fields(fields) => fields.borrow().get(name).cloned(),
            ObjectPayload::Foreign(_) => None,
        }
    }

    pub fn set_field(&self, name: impl Into<String>, value: HostValue) -> bool {
        match &self.0.payload {
            ObjectPayload::Fields(fields) => {
                fields.borrow_mut().insert(name.into(), value);
                true
            }
            ObjectPayload::Foreign(_) => false,
        }
    }

    pub fn foreign<T: ForeignObject>(&self) -> Option<&T> {
        match &self.0.payload {
            ObjectPayload::Foreign(f) => f.as_any().downcast_ref::<T>(),
            ObjectPayload::Fields(_) => None,
        }
    }

    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

/// Non-owning handle to a reference value, held by the identity registry.
pub(crate) enum WeakHostValue {
    Code(Weak<dyn HostCallable>),
    Object(Weak<ObjectInner>),
}

impl WeakHostValue {
    pub(crate) fn upgrade(&self) -> Option<HostValue> {
        match self {
            WeakHostValue::Code(w) => w.upgrade().map(|rc| HostValue::Code(HostCode(rc))),
            WeakHostValue::Object(w) => w.upgrade().map(|rc| HostValue::Object(HostObject(rc))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_equality_is_by_value() {
        assert_eq!(HostValue::Int(3), HostValue::from(3));
        assert_eq!(HostValue::str("a"), HostValue::from("a"));
        assert_ne!(HostValue::Int(3), HostValue::Float(3.0));
    }

    #[test]
    fn test_aggregate_equality_is_by_identity() {
        let a = HostValue::array([HostValue::Int(1)]);
        let b = HostValue::array([HostValue::Int(1)]);

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert!(a.ptr_eq(&a.clone()));
    }

    #[test]
    fn test_array_set_extends_with_undef() {
        let a = HostArray::new();
        a.set(2, HostValue::Int(9));

        assert_eq!(a.len(), 3);
        assert!(a.get(0).is_some_and(|v| v.is_undef()));
        assert_eq!(a.get(2), Some(HostValue::Int(9)));
    }

    #[test]
    fn test_hash_preserves_insertion_order() {
        let h = HostHash::from_iter([("z", HostValue::Int(1)), ("a", HostValue::Int(2))]);
        assert_eq!(h.keys(), vec!["z".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_weak_handle_tracks_liveness() {
        let code = HostValue::Code(HostCode::new(|_, _| Ok(HostValue::Undef)));
        let weak = code.downgrade().unwrap();

        assert!(weak.upgrade().is_some_and(|v| v.ptr_eq(&code)));

        drop(code);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_code_downcast() {
        let code = HostCode::new(|_, _| Ok(HostValue::Undef));
        assert!(code.downcast_ref::<NativeCode>().is_some());
    }
}
