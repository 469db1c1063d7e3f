//! Error types for the bridge and the host runtime.

use std::fmt;
use std::time::Duration;

/// Where a guest exception originated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub origin: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.origin, self.line, self.column)
    }
}

/// A guest exception rendered for the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestException {
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl GuestException {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }
}

impl fmt::Display for GuestException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} at {}", self.message, location),
            None => f.write_str(&self.message),
        }
    }
}

/// Errors surfaced by [`BridgeContext`](crate::BridgeContext) operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    #[error("compile error: {0}")]
    GuestCompile(GuestException),

    #[error("{0}")]
    GuestRuntime(GuestException),

    #[error("host call failed: {0}")]
    HostCall(String),

    #[error("bridge context has been torn down")]
    ContextGone,

    #[error("execution terminated after exceeding time limit of {0:?}")]
    Terminated(Duration),

    #[error("value is not a guest function of this context")]
    NotAGuestFunction,

    #[error("engine error: {0}")]
    Engine(String),
}

impl BridgeError {
    /// The guest exception, for compile and runtime failures.
    pub fn guest_exception(&self) -> Option<&GuestException> {
        match self {
            BridgeError::GuestCompile(e) | BridgeError::GuestRuntime(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_termination(&self) -> bool {
        matches!(self, BridgeError::Terminated(_))
    }
}

/// A value category that cannot cross the boundary. Logged, counted, and
/// replaced by the absent value; never returned.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConversionWarning {
    #[error("cannot convert guest value of type {0} to a host value")]
    UnsupportedGuest(&'static str),

    #[error("cannot convert host value ({0}) to a guest value")]
    UnsupportedHost(String),

    #[error("guest BigInt does not fit in 64 bits")]
    BigIntOverflow,

    #[error("host string of {0} bytes exceeds the engine's string limit")]
    StringTooLong(usize),

    #[error("reading guest property {property:?} threw: {reason}")]
    PropertyAccess { property: String, reason: String },
}

/// An error raised by host code, the host runtime's die-value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HostError {
    message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<BridgeError> for HostError {
    fn from(err: BridgeError) -> Self {
        HostError::new(err.to_string())
    }
}

impl From<&str> for HostError {
    fn from(message: &str) -> Self {
        HostError::new(message)
    }
}

impl From<String> for HostError {
    fn from(message: String) -> Self {
        HostError::new(message)
    }
}
