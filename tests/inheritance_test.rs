mod common;

use std::rc::Rc;

use common::{context_with_host, eval};
use v8_host_bridge::{HostClass, HostCode, HostRuntime, HostValue, Mro};

fn returns(text: &'static str) -> HostCode {
    HostCode::new(move |_, _| Ok(HostValue::str(text)))
}

/// Reads the `name` field of the invocant.
fn field_reader(field: &'static str) -> HostCode {
    HostCode::new(move |_, args| {
        let this = args.first().and_then(HostValue::as_object).ok_or("not an object")?;
        Ok(this.field(field).unwrap_or_default())
    })
}

fn base_and_derived() -> Rc<HostRuntime> {
    let host = HostRuntime::new();
    host.define_class(HostClass::new("Base").with_method("greet", returns("hello from Base")));
    host.define_class(
        HostClass::new("Derived")
            .with_parent("Base")
            .with_method("name", field_reader("name")),
    );
    host
}

#[test]
fn test_prototype_exposes_inherited_and_local_methods() {
    let host = base_and_derived();
    let ctx = context_with_host(&host);

    let obj = host.bless("Derived", [("name", HostValue::str("d1"))]);
    ctx.bind("obj", &obj).unwrap();

    assert_eq!(eval(&ctx, "obj.greet()"), HostValue::str("hello from Base"));
    assert_eq!(eval(&ctx, "obj.name()"), HostValue::str("d1"));

    // Flattened: both methods live on the one prototype.
    assert_eq!(
        eval(
            &ctx,
            "var p = Object.getPrototypeOf(obj); p.hasOwnProperty('greet') && p.hasOwnProperty('name')"
        ),
        HostValue::Bool(true)
    );
    assert_eq!(eval(&ctx, "Object.getPrototypeOf(obj).name.name"), HostValue::str("name"));
}

#[test]
fn test_override_shadows_base_method() {
    let host = base_and_derived();
    host.define_class(
        HostClass::new("Loud")
            .with_parent("Base")
            .with_method("greet", returns("HELLO FROM LOUD")),
    );
    let ctx = context_with_host(&host);

    ctx.bind("loud", &host.bless("Loud", Vec::<(String, HostValue)>::new())).unwrap();
    ctx.bind("base", &host.bless("Base", Vec::<(String, HostValue)>::new())).unwrap();

    assert_eq!(eval(&ctx, "loud.greet()"), HostValue::str("HELLO FROM LOUD"));
    assert_eq!(eval(&ctx, "base.greet()"), HostValue::str("hello from Base"));
}

#[test]
fn test_prototype_is_shared_per_class() {
    let host = base_and_derived();
    let ctx = context_with_host(&host);

    ctx.bind("a", &host.bless("Derived", [("name", HostValue::str("a"))])).unwrap();
    ctx.bind("b", &host.bless("Derived", [("name", HostValue::str("b"))])).unwrap();

    assert_eq!(
        eval(&ctx, "Object.getPrototypeOf(a) === Object.getPrototypeOf(b)"),
        HostValue::Bool(true)
    );
    assert_eq!(eval(&ctx, "a.name() + b.name()"), HostValue::str("ab"));
    assert_eq!(ctx.stats().cached_prototypes, 1);
}

#[test]
fn test_blessed_object_round_trips() {
    let host = base_and_derived();
    let ctx = context_with_host(&host);

    let obj = host.bless("Derived", [("name", HostValue::str("same"))]);
    ctx.bind("obj", &obj).unwrap();
    assert!(eval(&ctx, "obj").ptr_eq(&obj));
}

#[test]
fn test_method_on_unblessed_receiver_throws() {
    let host = base_and_derived();
    let ctx = context_with_host(&host);

    ctx.bind("obj", &host.bless("Derived", [("name", HostValue::str("x"))])).unwrap();
    let message = eval(
        &ctx,
        "try { Object.getPrototypeOf(obj).greet.call(5) } catch (e) { e.message }",
    );
    assert!(message.as_str().unwrap().contains("unblessed"), "{message:?}");
}

/// Diamond: D(B, C), B(A), C(A). Only A and C define `hello`.
fn diamond(mro: Mro) -> Rc<HostRuntime> {
    let host = HostRuntime::new();
    host.define_class(HostClass::new("A").with_method("hello", returns("A")));
    host.define_class(HostClass::new("B").with_parent("A"));
    host.define_class(HostClass::new("C").with_parent("A").with_method("hello", returns("C")));
    host.define_class(HostClass::new("D").with_parent("B").with_parent("C").with_mro(mro));
    host
}

#[test]
fn test_depth_first_diamond() {
    let host = diamond(Mro::Dfs);
    let ctx = context_with_host(&host);

    ctx.bind("d", &host.bless("D", Vec::<(String, HostValue)>::new())).unwrap();
    assert_eq!(eval(&ctx, "d.hello()"), HostValue::str("A"));
}

#[test]
fn test_c3_diamond() {
    let host = diamond(Mro::C3);
    let ctx = context_with_host(&host);

    ctx.bind("d", &host.bless("D", Vec::<(String, HostValue)>::new())).unwrap();
    assert_eq!(eval(&ctx, "d.hello()"), HostValue::str("C"));
}
