//! Value conversion in both directions.
//!
//! ## Host to guest
//!
//! | host            | guest                                         |
//! |-----------------|-----------------------------------------------|
//! | undef           | `undefined`                                   |
//! | bool            | boolean                                       |
//! | int / uint      | small integer, number beyond the i32 range    |
//! | float           | number                                        |
//! | string          | string                                        |
//! | array           | new array, elements converted                 |
//! | hash            | new object, entries converted                 |
//! | code            | callable wrapper (or the original function)   |
//! | blessed object  | object with the class's flattened prototype   |
//!
//! ## Guest to host
//!
//! Wrappers of host values unwrap to the original. Arrays and plain objects
//! are copied; functions and class-tagged objects become proxies, one per
//! guest object for as long as the host holds it. Everything else is logged
//! and becomes undef.
//!
//! Both directions keep a per-call table of aggregates already converted, so
//! shared and cyclic structure is preserved.

use std::collections::HashMap;
use std::pin::pin;

use super::callable;
use super::prototype;
use super::proxy::{self, GuestKind, GuestProxy, Payload};
use super::registry;
use super::state::ContextState;
use crate::error::ConversionWarning;
use crate::host::{HostArray, HostCode, HostHash, HostObject, HostValue, ObjectPayload};

/// Host aggregates already converted in this call, by identity.
pub(crate) type HostSeen<'s> = HashMap<usize, v8::Local<'s, v8::Value>>;

/// Guest aggregates already converted in this call.
#[derive(Default)]
pub(crate) struct GuestSeen {
    by_hash: HashMap<i32, Vec<(v8::Global<v8::Object>, HostValue)>>,
}

impl GuestSeen {
    fn get(&self, scope: &mut v8::PinScope, hash: i32, object: v8::Local<v8::Object>) -> Option<HostValue> {
        self.by_hash.get(&hash)?.iter().find_map(|(global, value)| {
            v8::Local::new(scope, global)
                .strict_equals(object.into())
                .then(|| value.clone())
        })
    }

    fn insert(&mut self, scope: &mut v8::PinScope, hash: i32, object: v8::Local<v8::Object>, value: HostValue) {
        self.by_hash
            .entry(hash)
            .or_default()
            .push((v8::Global::new(scope, object), value));
    }
}

enum GuestType {
    Absent,
    Int32(i32),
    Boolean(bool),
    Number(f64),
    BigInt,
    String,
    Array,
    Function,
    Object,
    Unsupported(&'static str),
}

fn classify(scope: &mut v8::PinScope, value: v8::Local<v8::Value>) -> GuestType {
    if value.is_null_or_undefined() {
        GuestType::Absent
    } else if value.is_int32() {
        GuestType::Int32(value.int32_value(scope).unwrap_or_default())
    } else if value.is_boolean() {
        GuestType::Boolean(value.is_true())
    } else if value.is_number() {
        GuestType::Number(value.number_value(scope).unwrap_or(f64::NAN))
    } else if value.is_big_int() {
        GuestType::BigInt
    } else if value.is_string() {
        GuestType::String
    } else if value.is_array() {
        GuestType::Array
    } else if value.is_function() {
        GuestType::Function
    } else if value.is_object() {
        GuestType::Object
    } else if value.is_symbol() {
        GuestType::Unsupported("symbol")
    } else {
        GuestType::Unsupported("unknown")
    }
}

/// Convert a guest value to a host value.
pub(crate) fn to_host(
    scope: &mut v8::PinScope,
    state: &ContextState,
    value: v8::Local<v8::Value>,
    seen: &mut GuestSeen,
) -> HostValue {
    match classify(scope, value) {
        GuestType::Absent => HostValue::Undef,
        GuestType::Int32(i) => HostValue::Int(i.into()),
        GuestType::Boolean(b) => HostValue::Bool(b),
        GuestType::Number(n) => HostValue::Float(n),
        GuestType::BigInt => big_int_to_host(state, value),
        GuestType::String => value
            .to_string(scope)
            .map(|s| HostValue::str(s.to_rust_string_lossy(scope)))
            .unwrap_or_default(),
        GuestType::Array => match v8::Local::<v8::Array>::try_from(value) {
            Ok(array) => array_to_host(scope, state, array, seen),
            Err(_) => HostValue::Undef,
        },
        GuestType::Function => match v8::Local::<v8::Object>::try_from(value) {
            Ok(function) => function_to_host(scope, state, function),
            Err(_) => HostValue::Undef,
        },
        GuestType::Object => match v8::Local::<v8::Object>::try_from(value) {
            Ok(object) => object_to_host(scope, state, object, seen),
            Err(_) => HostValue::Undef,
        },
        GuestType::Unsupported(what) => {
            state.warn(ConversionWarning::UnsupportedGuest(what));
            HostValue::Undef
        }
    }
}

fn big_int_to_host(state: &ContextState, value: v8::Local<v8::Value>) -> HostValue {
    let Ok(big) = v8::Local::<v8::BigInt>::try_from(value) else {
        return HostValue::Undef;
    };
    if let (v, true) = big.i64_value() {
        return HostValue::Int(v);
    }
    if let (v, true) = big.u64_value() {
        return HostValue::UInt(v);
    }
    state.warn(ConversionWarning::BigIntOverflow);
    HostValue::Undef
}

fn array_to_host(
    scope: &mut v8::PinScope,
    state: &ContextState,
    array: v8::Local<v8::Array>,
    seen: &mut GuestSeen,
) -> HostValue {
    let object: v8::Local<v8::Object> = array.into();
    if let Some(original) = proxy::origin_value(scope, object) {
        return original;
    }

    let hash = object.get_identity_hash().get();
    if let Some(existing) = seen.get(scope, hash, object) {
        return existing;
    }

    let length = array.length();
    let out = HostArray::with_capacity(length as usize);
    seen.insert(scope, hash, object, HostValue::Array(out.clone()));

    // Index getters and proxy traps may throw; each failure is reported
    // and the element becomes undef.
    let tc = pin!(v8::TryCatch::new(scope));
    let mut tc = tc.init();
    for index in 0..length {
        let item = match array.get_index(&tc, index) {
            Some(item) => to_host(&mut tc, state, item, seen),
            None => {
                report_caught(&tc, state, tc.has_terminated(), tc.exception(), &index.to_string());
                tc.reset();
                HostValue::Undef
            }
        };
        out.push(item);
    }
    HostValue::Array(out)
}

fn function_to_host(scope: &mut v8::PinScope, state: &ContextState, function: v8::Local<v8::Object>) -> HostValue {
    if let Some(original) = proxy::origin_value(scope, function) {
        return original;
    }

    let hash = function.get_identity_hash().get();
    if let Some(existing) = registry::lookup(scope, state, hash, function) {
        return existing;
    }

    let proxy = GuestProxy::new(scope, state, function, GuestKind::Function);
    let code = HostCode::from_callable(proxy.clone());
    let value = HostValue::Code(code);
    if let Some(weak) = value.downgrade() {
        state.registry.borrow_mut().register(hash, &proxy, weak);
    }
    value
}

fn object_to_host(
    scope: &mut v8::PinScope,
    state: &ContextState,
    object: v8::Local<v8::Object>,
    seen: &mut GuestSeen,
) -> HostValue {
    if let Some(original) = proxy::origin_value(scope, object) {
        return original;
    }

    let hash = object.get_identity_hash().get();
    if state.config.enable_blessing
        && let Some(tag) = class_tag(scope, state, object)
    {
        return blessed_to_host(scope, state, object, hash, &tag);
    }

    if let Some(existing) = seen.get(scope, hash, object) {
        return existing;
    }

    let out = HostHash::new();
    seen.insert(scope, hash, object, HostValue::Hash(out.clone()));

    let tc = pin!(v8::TryCatch::new(scope));
    let mut tc = tc.init();
    let Some(names) = object.get_property_names(&tc, Default::default()) else {
        report_caught(&tc, state, tc.has_terminated(), tc.exception(), "<own keys>");
        return HostValue::Hash(out);
    };
    for index in 0..names.length() {
        let Some(key) = names.get_index(&tc, index) else {
            continue;
        };
        let Some(name) = key.to_string(&tc) else {
            continue;
        };
        let name = name.to_rust_string_lossy(&tc);
        let value = match object.get(&tc, key) {
            Some(value) => to_host(&mut tc, state, value, seen),
            None => {
                report_caught(&tc, state, tc.has_terminated(), tc.exception(), &name);
                tc.reset();
                HostValue::Undef
            }
        };
        out.insert(name, value);
    }
    HostValue::Hash(out)
}

/// Record a guest exception caught while reading `property`.
///
/// Termination is left for the caller's guard to report.
fn report_caught(
    scope: &v8::PinScope,
    state: &ContextState,
    terminated: bool,
    exception: Option<v8::Local<v8::Value>>,
    property: &str,
) {
    if terminated {
        return;
    }
    let reason = exception
        .and_then(|e| e.to_string(scope))
        .map(|s| s.to_rust_string_lossy(scope))
        .unwrap_or_else(|| "unknown exception".to_string());
    state.warn(ConversionWarning::PropertyAccess {
        property: property.to_string(),
        reason,
    });
}

/// The class tag of a guest object, looked up along its prototype chain.
fn class_tag(scope: &mut v8::PinScope, state: &ContextState, object: v8::Local<v8::Object>) -> Option<String> {
    let property = &state.config.class_tag_property;
    let key = v8::String::new(scope, property)?;
    let tc = pin!(v8::TryCatch::new(scope));
    let tc = tc.init();
    let Some(tag) = object.get(&tc, key.into()) else {
        report_caught(&tc, state, tc.has_terminated(), tc.exception(), property);
        return None;
    };
    if !tag.is_string() {
        return None;
    }
    Some(tag.to_string(&tc)?.to_rust_string_lossy(&tc))
}

fn blessed_to_host(
    scope: &mut v8::PinScope,
    state: &ContextState,
    object: v8::Local<v8::Object>,
    hash: i32,
    tag: &str,
) -> HostValue {
    if let Some(existing) = registry::lookup(scope, state, hash, object) {
        return existing;
    }

    let class = state.config.blessed_class_name(tag);
    state.host.ensure_class(&class);

    let proxy = GuestProxy::new(scope, state, object, GuestKind::Object);
    let blessed = HostValue::Object(HostObject::new(class.as_str(), ObjectPayload::Foreign(proxy.clone())));
    if let Some(weak) = blessed.downgrade() {
        state.registry.borrow_mut().register(hash, &proxy, weak);
    }

    tracing::trace!("blessed guest object into {}", class);
    blessed
}

/// Convert a host value to a guest value.
pub(crate) fn to_guest<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    state: &ContextState,
    value: &HostValue,
    seen: &mut HostSeen<'s>,
) -> v8::Local<'s, v8::Value> {
    match value {
        HostValue::Undef => v8::undefined(scope).into(),
        HostValue::Bool(b) => v8::Boolean::new(scope, *b).into(),
        HostValue::Int(i) => match i32::try_from(*i) {
            Ok(small) => v8::Integer::new(scope, small).into(),
            Err(_) => v8::Number::new(scope, *i as f64).into(),
        },
        HostValue::UInt(u) => match i32::try_from(*u) {
            Ok(small) => v8::Integer::new(scope, small).into(),
            Err(_) => v8::Number::new(scope, *u as f64).into(),
        },
        HostValue::Float(f) => v8::Number::new(scope, *f).into(),
        HostValue::Str(s) => match v8::String::new(scope, s) {
            Some(string) => string.into(),
            None => {
                state.warn(ConversionWarning::StringTooLong(s.len()));
                v8::undefined(scope).into()
            }
        },
        HostValue::Array(_) | HostValue::Hash(_) | HostValue::Code(_) | HostValue::Object(_) => {
            aggregate_to_guest(scope, state, value, seen).unwrap_or_else(|| v8::undefined(scope).into())
        }
        HostValue::Opaque(what) => {
            state.warn(ConversionWarning::UnsupportedHost(what.to_string()));
            v8::undefined(scope).into()
        }
    }
}

fn aggregate_to_guest<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    state: &ContextState,
    value: &HostValue,
    seen: &mut HostSeen<'s>,
) -> Option<v8::Local<'s, v8::Value>> {
    if let Some(original) = guest_original(scope, state, value) {
        return Some(original);
    }

    let id = value.identity()?;
    if let Some(existing) = seen.get(&id) {
        return Some(*existing);
    }

    let converted: v8::Local<v8::Value> = match value {
        HostValue::Array(array) => {
            let items = array.to_vec();
            let length = i32::try_from(items.len()).unwrap_or(i32::MAX);
            let wrapper = proxy::wrap(scope, state, Payload::Value(value.clone()), |scope, _| {
                Some(v8::Array::new(scope, length).into())
            })?;
            seen.insert(id, wrapper.into());
            for (index, item) in items.iter().enumerate() {
                let item = to_guest(scope, state, item, seen);
                wrapper.set_index(scope, index as u32, item);
            }
            wrapper.into()
        }
        HostValue::Hash(hash) => {
            let entries = hash.entries();
            let wrapper = proxy::wrap(scope, state, Payload::Value(value.clone()), |scope, _| {
                Some(v8::Object::new(scope))
            })?;
            seen.insert(id, wrapper.into());
            for (key, item) in &entries {
                let Some(key) = v8::String::new(scope, key) else {
                    state.warn(ConversionWarning::StringTooLong(key.len()));
                    continue;
                };
                let item = to_guest(scope, state, item, seen);
                // Own data property even for keys like "__proto__".
                wrapper.create_data_property(scope, key.into(), item);
            }
            wrapper.into()
        }
        HostValue::Code(_) => {
            let function = callable::closure_function(scope, state, value)?;
            seen.insert(id, function.into());
            function.into()
        }
        HostValue::Object(object) => {
            let proto = prototype::get_prototype(scope, state, object.class());
            let wrapper = proxy::wrap(scope, state, Payload::Value(value.clone()), |scope, _| {
                let wrapper = v8::Object::new(scope);
                if let Some(proto) = proto {
                    wrapper.set_prototype(scope, proto.into());
                }
                Some(wrapper)
            })?;
            seen.insert(id, wrapper.into());
            wrapper.into()
        }
        _ => return None,
    };
    Some(converted)
}

/// The guest value itself, when `value` is a proxy of this context.
fn guest_original<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    state: &ContextState,
    value: &HostValue,
) -> Option<v8::Local<'s, v8::Value>> {
    let proxy = match value {
        HostValue::Code(code) => code.downcast_ref::<GuestProxy>()?,
        HostValue::Object(object) => object.foreign::<GuestProxy>()?,
        _ => return None,
    };
    if !proxy.belongs_to(state) {
        return None;
    }
    proxy.local(scope).map(Into::into)
}
