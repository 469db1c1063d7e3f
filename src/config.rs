//! Bridge configuration, fixed for the lifetime of a context.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Name of the guest property that marks an object for blessing.
pub const DEFAULT_CLASS_TAG_PROPERTY: &str = "__hostClass";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Execution time limit per top-level guest entry (0 = unlimited).
    pub time_limit_secs: u64,

    /// Engine flags, passed through to V8 before the isolate is created.
    pub flags: Option<String>,

    /// Cross class-tagged guest objects as blessed host objects.
    pub enable_blessing: bool,

    /// Prepended to the guest class tag to form the host class name.
    pub bless_prefix: String,

    /// Guest property holding the class tag.
    pub class_tag_property: String,

    /// Maximum guest heap in MB (0 = engine default).
    pub heap_max_mb: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            time_limit_secs: 0,
            flags: None,
            enable_blessing: false,
            bless_prefix: String::new(),
            class_tag_property: DEFAULT_CLASS_TAG_PROPERTY.to_string(),
            heap_max_mb: 0,
        }
    }
}

impl BridgeConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn time_limit(&self) -> Option<Duration> {
        (self.time_limit_secs > 0).then(|| Duration::from_secs(self.time_limit_secs))
    }

    /// Host class name for a guest class tag.
    pub fn blessed_class_name(&self, tag: &str) -> String {
        format!("{}{}", self.bless_prefix, tag)
    }
}
