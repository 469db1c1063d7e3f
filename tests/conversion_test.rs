mod common;

use common::{eval, new_context};
use v8_host_bridge::{HostArray, HostCode, HostHash, HostValue};

#[test]
fn test_guest_scalars() {
    let ctx = new_context();

    assert_eq!(eval(&ctx, "42"), HostValue::Int(42));
    assert_eq!(eval(&ctx, "-7"), HostValue::Int(-7));
    assert_eq!(eval(&ctx, "1.5"), HostValue::Float(1.5));
    assert_eq!(eval(&ctx, "2147483648"), HostValue::Float(2147483648.0));
    assert_eq!(eval(&ctx, "true"), HostValue::Bool(true));
    assert_eq!(eval(&ctx, "'hello'"), HostValue::str("hello"));
    assert_eq!(eval(&ctx, "null"), HostValue::Undef);
    assert_eq!(eval(&ctx, "undefined"), HostValue::Undef);
}

#[test]
fn test_guest_bigint() {
    let ctx = new_context();

    assert_eq!(eval(&ctx, "10n"), HostValue::Int(10));
    assert_eq!(eval(&ctx, "-(2n ** 40n)"), HostValue::Int(-(1 << 40)));
    assert_eq!(eval(&ctx, "2n ** 63n"), HostValue::UInt(1 << 63));

    assert_eq!(ctx.stats().conversion_warnings, 0);
    assert_eq!(eval(&ctx, "2n ** 70n"), HostValue::Undef);
    assert_eq!(ctx.stats().conversion_warnings, 1);
}

#[test]
fn test_unsupported_guest_value_degrades() {
    let ctx = new_context();

    assert_eq!(eval(&ctx, "Symbol('x')"), HostValue::Undef);
    assert_eq!(ctx.stats().conversion_warnings, 1);

    // One bad element does not abort the rest of the array.
    let array = eval(&ctx, "[1, Symbol('y'), 3]");
    let array = array.as_array().expect("array");
    assert_eq!(array.to_vec(), vec![HostValue::Int(1), HostValue::Undef, HostValue::Int(3)]);
    assert_eq!(ctx.stats().conversion_warnings, 2);
}

#[test]
fn test_host_scalars_in_guest() {
    let ctx = new_context();

    ctx.bind("small", &HostValue::Int(12)).unwrap();
    ctx.bind("big", &HostValue::Int(1 << 40)).unwrap();
    ctx.bind("unsigned", &HostValue::UInt(u64::from(u32::MAX))).unwrap();
    ctx.bind("flag", &HostValue::Bool(false)).unwrap();
    ctx.bind("text", &HostValue::str("héllo")).unwrap();
    ctx.bind("nothing", &HostValue::Undef).unwrap();

    assert_eq!(eval(&ctx, "small * 2"), HostValue::Int(24));
    assert_eq!(eval(&ctx, "big === 1099511627776"), HostValue::Bool(true));
    assert_eq!(eval(&ctx, "unsigned === 4294967295"), HostValue::Bool(true));
    assert_eq!(eval(&ctx, "flag === false"), HostValue::Bool(true));
    assert_eq!(eval(&ctx, "text.length"), HostValue::Int(5));
    assert_eq!(eval(&ctx, "nothing === undefined"), HostValue::Bool(true));
}

#[test]
fn test_opaque_host_value_becomes_undefined() {
    let ctx = new_context();

    ctx.bind("handle", &HostValue::Opaque("GLOB".into())).unwrap();
    assert_eq!(eval(&ctx, "typeof handle"), HostValue::str("undefined"));
    assert_eq!(ctx.stats().conversion_warnings, 1);
}

#[test]
fn test_guest_array_and_object_are_copied() {
    let ctx = new_context();

    let value = eval(&ctx, "[1, 'a', [2, 3], { x: 1 }]");
    let array = value.as_array().expect("array");
    assert_eq!(array.len(), 4);
    assert_eq!(array.get(1), Some(HostValue::str("a")));

    let nested = array.get(2).unwrap();
    assert_eq!(nested.as_array().unwrap().to_vec(), vec![HostValue::Int(2), HostValue::Int(3)]);

    let object = array.get(3).unwrap();
    assert_eq!(object.as_hash().unwrap().get("x"), Some(HostValue::Int(1)));
}

#[test]
fn test_guest_object_keys_keep_order() {
    let ctx = new_context();

    let value = eval(&ctx, "({ b: 1, a: 'two', c: [true] })");
    let hash = value.as_hash().expect("hash");
    assert_eq!(hash.keys(), vec!["b", "a", "c"]);
    assert_eq!(hash.get("a"), Some(HostValue::str("two")));
}

#[test]
fn test_guest_shared_structure_is_preserved() {
    let ctx = new_context();

    let value = eval(&ctx, "var o = { n: 1 }; [o, o]");
    let array = value.as_array().unwrap();
    assert!(array.get(0).unwrap().ptr_eq(&array.get(1).unwrap()));
}

#[test]
fn test_guest_cycle_converts() {
    let ctx = new_context();

    let value = eval(&ctx, "var a = [1]; a.push(a); a");
    let array = value.as_array().unwrap();
    assert_eq!(array.len(), 2);
    assert!(array.get(1).unwrap().ptr_eq(&value));

    array.clear();
}

#[test]
fn test_host_hash_in_guest() {
    let ctx = new_context();

    let hash = HostValue::hash([
        ("a", HostValue::Int(1)),
        ("b", HostValue::array([HostValue::Int(1), HostValue::Int(2)])),
    ]);
    ctx.bind("h", &hash).unwrap();

    assert_eq!(eval(&ctx, "h.a + h.b.length"), HostValue::Int(3));
    assert_eq!(eval(&ctx, "Object.keys(h).join(',')"), HostValue::str("a,b"));
}

#[test]
fn test_host_cycle_converts() {
    let ctx = new_context();

    let array = HostArray::new();
    array.push(HostValue::Int(1));
    array.push(HostValue::Array(array.clone()));
    let hash = HostHash::new();
    hash.insert("self", HostValue::Hash(hash.clone()));
    hash.insert("list", HostValue::Array(array.clone()));

    ctx.bind("x", &HostValue::Array(array.clone())).unwrap();
    ctx.bind("y", &HostValue::Hash(hash.clone())).unwrap();

    assert_eq!(eval(&ctx, "x[1] === x"), HostValue::Bool(true));
    assert_eq!(eval(&ctx, "y.self === y && y.list[1][0] === 1"), HostValue::Bool(true));

    array.clear();
    hash.clear();
}

#[test]
fn test_host_aggregate_round_trip_keeps_identity() {
    let ctx = new_context();

    let array = HostValue::array([HostValue::Int(1), HostValue::str("two")]);
    let hash = HostValue::hash([("k", HostValue::Int(1))]);
    ctx.bind("arr", &array).unwrap();
    ctx.bind("obj", &hash).unwrap();

    assert!(eval(&ctx, "arr").ptr_eq(&array));
    assert!(eval(&ctx, "obj").ptr_eq(&hash));
    assert!(eval(&ctx, "[arr]").as_array().unwrap().get(0).unwrap().ptr_eq(&array));
}

#[test]
fn test_host_code_round_trip_keeps_identity() {
    let ctx = new_context();

    let code = HostValue::Code(HostCode::new(|_, _| Ok(HostValue::Int(1))));
    ctx.bind("f", &code).unwrap();

    assert_eq!(eval(&ctx, "typeof f"), HostValue::str("function"));
    assert!(eval(&ctx, "f").ptr_eq(&code));
}

#[test]
fn test_host_mutual_cycle_converts() {
    let ctx = new_context();

    let outer = HostHash::new();
    let inner = HostHash::new();
    outer.insert("b", HostValue::Hash(inner.clone()));
    inner.insert("a", HostValue::Hash(outer.clone()));

    let list = HostArray::new();
    let entry = HostHash::new();
    entry.insert("list", HostValue::Array(list.clone()));
    list.push(HostValue::Hash(entry.clone()));

    ctx.bind("x", &HostValue::Hash(outer.clone())).unwrap();
    ctx.bind("list", &HostValue::Array(list.clone())).unwrap();

    assert_eq!(eval(&ctx, "x.b.a === x"), HostValue::Bool(true));
    assert_eq!(eval(&ctx, "x.b.a.b === x.b"), HostValue::Bool(true));
    assert_eq!(eval(&ctx, "list[0].list === list"), HostValue::Bool(true));

    inner.clear();
    entry.clear();
}

#[test]
fn test_guest_mutual_cycle_converts() {
    let ctx = new_context();

    let value = eval(&ctx, "var a = {}, b = { a }; a.b = b; a");
    let a = value.as_hash().expect("hash");
    let b = a.get("b").expect("b");
    let back = b.as_hash().expect("hash").get("a").expect("a");
    assert!(back.ptr_eq(&value));

    let value = eval(&ctx, "var l = [], o = { l }; l.push(o); l");
    let l = value.as_array().expect("array");
    let o = l.get(0).expect("element");
    assert!(o.as_hash().unwrap().get("l").unwrap().ptr_eq(&value));

    b.as_hash().unwrap().clear();
    o.as_hash().unwrap().clear();
}

#[test]
fn test_throwing_getter_is_reported() {
    let ctx = new_context();

    let value = eval(&ctx, "({ ok: 1, get bad() { throw new Error('g') }, after: 2 })");
    let hash = value.as_hash().expect("hash");
    assert_eq!(hash.get("ok"), Some(HostValue::Int(1)));
    assert_eq!(hash.get("bad"), Some(HostValue::Undef));
    assert_eq!(hash.get("after"), Some(HostValue::Int(2)));
    assert_eq!(ctx.stats().conversion_warnings, 1);

    // The caught exception does not leak into later evaluations.
    assert_eq!(eval(&ctx, "1 + 1"), HostValue::Int(2));
}

#[test]
fn test_throwing_proxy_traps_are_reported() {
    let ctx = new_context();

    let keys = eval(&ctx, "new Proxy({}, { ownKeys() { throw new Error('k') } })");
    assert_eq!(keys.as_hash().map(|h| h.len()), Some(0));
    assert_eq!(ctx.stats().conversion_warnings, 1);

    let values = eval(
        &ctx,
        "new Proxy({ a: 1, b: 2 }, { get(t, p) { if (p === 'b') throw new Error('v'); return t[p] } })",
    );
    let values = values.as_hash().expect("hash");
    assert_eq!(values.get("a"), Some(HostValue::Int(1)));
    assert_eq!(values.get("b"), Some(HostValue::Undef));
    assert_eq!(ctx.stats().conversion_warnings, 2);
}

#[test]
fn test_host_hash_keys_become_own_properties() {
    let ctx = new_context();

    let hash = HostValue::hash([("__proto__", HostValue::Int(5)), ("plain", HostValue::Int(1))]);
    ctx.bind("h", &hash).unwrap();

    assert_eq!(eval(&ctx, "Object.keys(h).join(',')"), HostValue::str("__proto__,plain"));
    assert_eq!(eval(&ctx, "h.__proto__"), HostValue::Int(5));
    assert_eq!(eval(&ctx, "Object.getPrototypeOf(h) === Object.prototype"), HostValue::Bool(true));
}
