//! Global V8 platform initialization.
//!
//! V8 can only be initialized once per process. Engine flags supplied by a
//! context are applied before the first initialization when possible and
//! passed through again for every later context.

use std::sync::OnceLock;

static PLATFORM: OnceLock<v8::SharedRef<v8::Platform>> = OnceLock::new();

/// Initialize the platform (once) and apply `flags`.
pub fn init(flags: Option<&str>) -> &'static v8::SharedRef<v8::Platform> {
    if let Some(flags) = flags.filter(|f| !f.trim().is_empty()) {
        tracing::debug!("Applying engine flags: {}", flags);
        v8::V8::set_flags_from_string(flags);
    }

    PLATFORM.get_or_init(|| {
        let platform = v8::new_default_platform(0, false).make_shared();
        v8::V8::initialize_platform(platform.clone());
        v8::V8::initialize();
        platform
    })
}

/// The platform, if [`init`] has run.
pub fn get_platform() -> Option<&'static v8::SharedRef<v8::Platform>> {
    PLATFORM.get()
}
