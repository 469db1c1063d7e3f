#![allow(dead_code)]

use std::rc::Rc;

use v8_host_bridge::{BridgeContext, HostRuntime, HostValue};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A context with default configuration and its own host runtime.
pub fn new_context() -> BridgeContext {
    init_logging();
    BridgeContext::builder().build().expect("failed to create context")
}

/// A context bridged to `host`.
pub fn context_with_host(host: &Rc<HostRuntime>) -> BridgeContext {
    init_logging();
    BridgeContext::builder()
        .host(host.clone())
        .build()
        .expect("failed to create context")
}

/// Evaluate `source`, panicking on failure.
pub fn eval(ctx: &BridgeContext, source: &str) -> HostValue {
    ctx.eval(source, "test.js")
        .unwrap_or_else(|e| panic!("eval of {source:?} failed: {e}"))
}

/// Run idle notifications until the collector stops releasing host proxies.
pub fn collect(ctx: &mut BridgeContext) {
    let mut live = ctx.stats().live_host_proxies;
    for round in 0..10 {
        ctx.idle_notification();
        let now = ctx.stats().live_host_proxies;
        if round >= 2 && now == live {
            break;
        }
        live = now;
    }
}
