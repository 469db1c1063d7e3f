mod common;

use common::{eval, new_context};
use v8_host_bridge::{BridgeError, HostCode, HostError, HostValue};

#[test]
fn test_guest_exception_reaches_host_error_channel() {
    let ctx = new_context();

    let err = ctx.eval("throw new Error('boom')", "boom.js").unwrap_err();
    let BridgeError::GuestRuntime(exception) = &err else {
        panic!("expected runtime error, got {err:?}");
    };
    assert!(exception.message.contains("boom"));

    let location = exception.location.as_ref().expect("location");
    assert_eq!(location.origin, "boom.js");
    assert_eq!(location.line, 1);

    let last = ctx.host().last_error().expect("host error set");
    assert!(last.message().contains("boom"));
}

#[test]
fn test_compile_error_carries_location() {
    let ctx = new_context();

    let err = ctx.eval("var x = 1;\nvar = ;", "bad.js").unwrap_err();
    let BridgeError::GuestCompile(exception) = &err else {
        panic!("expected compile error, got {err:?}");
    };
    assert!(exception.message.contains("SyntaxError"), "{exception}");

    let location = exception.location.as_ref().expect("location");
    assert_eq!(location.origin, "bad.js");
    assert_eq!(location.line, 2);
    assert!(err.to_string().contains("bad.js:2:"), "{err}");
}

#[test]
fn test_runtime_error_line_number() {
    let ctx = new_context();

    let err = ctx.eval("\n\nundefinedFunction()", "lines.js").unwrap_err();
    let exception = err.guest_exception().unwrap();
    assert!(exception.message.contains("ReferenceError"));
    assert_eq!(exception.location.as_ref().unwrap().line, 3);
}

#[test]
fn test_thrown_non_error_value() {
    let ctx = new_context();

    let err = ctx.eval("throw 'plain string'", "plain.js").unwrap_err();
    assert_eq!(err.guest_exception().unwrap().message, "plain string");
}

#[test]
fn test_success_clears_host_error() {
    let ctx = new_context();

    assert!(ctx.eval("throw new Error('first')", "a.js").is_err());
    assert!(ctx.host().last_error().is_some());

    assert_eq!(eval(&ctx, "1"), HostValue::Int(1));
    assert!(ctx.host().last_error().is_none());
}

#[test]
fn test_uncaught_host_error_fails_eval() {
    let ctx = new_context();

    let failing = HostCode::new(|_, _| Err(HostError::new("kaput")));
    ctx.bind("failing", &failing.into()).unwrap();

    let err = ctx.eval("failing()", "host.js").unwrap_err();
    assert!(err.to_string().contains("kaput"), "{err}");
    assert!(ctx.host().last_error().unwrap().message().contains("kaput"));
}

#[test]
fn test_context_usable_after_errors() {
    let ctx = new_context();

    for _ in 0..3 {
        assert!(ctx.eval("throw new Error('again')", "loop.js").is_err());
        assert!(ctx.eval("}", "loop.js").is_err());
    }
    assert_eq!(eval(&ctx, "'still ' + 'alive'"), HostValue::str("still alive"));
}
