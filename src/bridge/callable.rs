//! Guest-callable wrappers around host code.
//!
//! Two variants share the calling convention:
//!
//! - closure: wraps a host callable; arguments are converted and the
//!   callable invoked directly
//! - method: installed on class prototypes; the guest receiver is converted
//!   and the host method dispatched by name
//!
//! Either way the host must produce exactly one value. Host errors (and
//! panics) become guest `Error` exceptions carrying the host message, and
//! the host error slot is cleared afterward.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use super::convert::{self, GuestSeen, HostSeen};
use super::proxy::{self, HostProxy, Payload};
use super::state::ContextState;
use crate::error::HostError;
use crate::host::{HostValue, panic_message};

/// Guest function invoking `code` when called.
pub(crate) fn closure_function<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    state: &ContextState,
    code: &HostValue,
) -> Option<v8::Local<'s, v8::Object>> {
    proxy::wrap(scope, state, Payload::Value(code.clone()), |scope, data| {
        v8::Function::builder(
            |scope: &mut v8::PinScope,
             args: v8::FunctionCallbackArguments,
             mut retval: v8::ReturnValue| {
                if let Some(result) = invoke_closure(scope, &args) {
                    retval.set(result);
                }
            },
        )
        .data(data.into())
        .build(scope)
        .map(Into::into)
    })
}

/// Guest function dispatching the host method `name` on its receiver.
pub(crate) fn method_function<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    state: &ContextState,
    name: &str,
) -> Option<v8::Local<'s, v8::Object>> {
    proxy::wrap(scope, state, Payload::Method(name.to_string()), |scope, data| {
        let function = v8::Function::builder(
            |scope: &mut v8::PinScope,
             args: v8::FunctionCallbackArguments,
             mut retval: v8::ReturnValue| {
                if let Some(result) = invoke_method(scope, &args) {
                    retval.set(result);
                }
            },
        )
        .data(data.into())
        .build(scope)?;

        let label = v8::String::new(scope, name)?;
        function.set_name(label);
        Some(function.into())
    })
}

/// The proxy behind the running function, with its context.
fn resolve(args: &v8::FunctionCallbackArguments) -> Option<(Rc<ContextState>, &'static HostProxy)> {
    let external = v8::Local::<v8::External>::try_from(args.data()).ok()?;
    // SAFETY: the function carrying this data is running, so its wrapper is
    // reachable and the live table still owns the proxy.
    let proxy: &'static HostProxy = unsafe { HostProxy::from_external(external) };
    let state = proxy.ctx.upgrade()?;
    (!state.is_torn_down()).then_some((state, proxy))
}

fn convert_args(
    scope: &mut v8::PinScope,
    state: &ContextState,
    args: &v8::FunctionCallbackArguments,
    seen: &mut GuestSeen,
) -> Vec<HostValue> {
    (0..args.length())
        .map(|i| convert::to_host(scope, state, args.get(i), seen))
        .collect()
}

fn invoke_closure<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    args: &v8::FunctionCallbackArguments,
) -> Option<v8::Local<'s, v8::Value>> {
    let Some((state, proxy)) = resolve(args) else {
        throw_error(scope, "bridge context has been torn down");
        return None;
    };
    let Payload::Value(HostValue::Code(code)) = &proxy.payload else {
        throw_error(scope, "host value is not callable");
        return None;
    };
    let code = code.clone();

    let host_args = convert_args(scope, &state, args, &mut GuestSeen::default());
    let outcome = catch_unwind(AssertUnwindSafe(|| state.host.call(&code, &host_args)))
        .unwrap_or_else(|panic| Err(HostError::new(panic_message(panic.as_ref()))));

    finish(scope, &state, outcome)
}

fn invoke_method<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    args: &v8::FunctionCallbackArguments,
) -> Option<v8::Local<'s, v8::Value>> {
    let Some((state, proxy)) = resolve(args) else {
        throw_error(scope, "bridge context has been torn down");
        return None;
    };
    let Payload::Method(name) = &proxy.payload else {
        throw_error(scope, "host value is not a method");
        return None;
    };
    let name = name.clone();

    let mut seen = GuestSeen::default();
    let receiver = convert::to_host(scope, &state, args.this().into(), &mut seen);
    let host_args = convert_args(scope, &state, args, &mut seen);
    let outcome = state.host.call_method_catching(&receiver, &name, &host_args);

    finish(scope, &state, outcome)
}

fn finish<'s>(
    scope: &mut v8::PinScope<'s, '_>,
    state: &ContextState,
    outcome: Result<Vec<HostValue>, HostError>,
) -> Option<v8::Local<'s, v8::Value>> {
    let result = outcome.and_then(|mut values| match values.len() {
        1 => Ok(values.remove(0)),
        n => Err(HostError::new(format!(
            "expected exactly one return value from host callable, got {n}"
        ))),
    });

    match result {
        Ok(value) => Some(convert::to_guest(scope, state, &value, &mut HostSeen::new())),
        Err(err) => {
            tracing::debug!("host call failed: {}", err);
            state.host.clear_error();
            throw_error(scope, err.message());
            None
        }
    }
}

fn throw_error(scope: &mut v8::PinScope, message: &str) {
    if scope.is_execution_terminating() {
        return;
    }
    let Some(text) = v8::String::new(scope, message) else {
        return;
    };
    let exception = v8::Exception::error(scope, text);
    scope.throw_exception(exception);
}
