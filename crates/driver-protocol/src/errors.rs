//! Error Handling Guidelines
//!
//! Two kinds of error live here:
//!
//! 1. **ActorError**: something went wrong with the actor machinery itself
//!    (a mailbox closed, a message arrived in a state that cannot handle it).
//!    These are returned from `Actor::handle` and logged by the run loop.
//! 2. **ErrorRecord**: a driver-level report for the supervisor. Records carry
//!    an [`ErrorCode`], a [`Severity`] and the [`Subsystem`] that raised them,
//!    and are broadcast rather than returned.
//!
//! Messages should say what failed and, when known, why:
//! - ✅ "Bus executor has shut down (bus request for register 0x010 not sent)"
//! - ❌ "send failed"

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for actor operations
#[derive(Error, Debug, Clone)]
pub enum ActorError {
    /// Actor received a message no state in its hierarchy handles
    #[error("Unexpected message in state {state}: {message}")]
    UnexpectedMessage { state: String, message: String },

    /// Communication channel closed
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for ActorError {
    fn from(s: String) -> Self {
        ActorError::Other(s)
    }
}

impl From<&str> for ActorError {
    fn from(s: &str) -> Self {
        ActorError::Other(s.to_string())
    }
}

/// Driver error taxonomy carried in broadcast [`ErrorRecord`]s and in
/// point-to-point failure replies.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The bus or the layer below is not available for transactions
    #[error("bus unavailable")]
    BusUnavailable,

    /// A transaction phase (or the init phase) ran out of retries
    #[error("transaction phase timed out")]
    Timeout,

    /// The busy window elapsed before the transaction finished
    #[error("busy window exceeded")]
    BusyTimeout,

    /// The bus executor completed the transfer with an error code
    #[error("bus transaction failed with code {0}")]
    BusTransaction(i32),

    /// A deferred request was dropped because the queue was full.
    /// Never broadcast; kept so callers can name the condition.
    #[error("deferred queue full")]
    QueueFull,

    /// A reply arrived whose correlation id does not match the outstanding request
    #[error("mismatched response id")]
    MismatchedCorrelation,

    /// A request arrived while a transaction was already in flight
    #[error("device busy")]
    DeviceBusy,

    /// The device layer reported a fatal error or could not be reached
    #[error("device layer unavailable")]
    DeviceUnavailable,

    /// A request arrived while the layer was not enabled
    #[error("driver not enabled")]
    NotEnabled,

    /// A request asked for zero bytes or more than the transfer limit
    #[error("invalid transfer length")]
    InvalidLength,

    /// Anything else, with a raw code
    #[error("error code {0}")]
    Other(i32),
}

/// How serious a broadcast error is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Reported, no state change
    Warning,
    /// Accompanies a return to a safe state or escalation to Error
    Error,
}

/// Which layer raised a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Subsystem {
    ApiLayer,
    DeviceLayer,
}

impl std::fmt::Display for Subsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subsystem::ApiLayer => write!(f, "api-layer"),
            Subsystem::DeviceLayer => write!(f, "device-layer"),
        }
    }
}

/// A broadcast error report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub code: ErrorCode,
    pub severity: Severity,
    pub subsystem: Subsystem,
    /// Free-form context (register address, received sequence number, ...)
    pub extra_info: u32,
}

impl ErrorRecord {
    pub fn warning(subsystem: Subsystem, code: ErrorCode) -> Self {
        Self {
            code,
            severity: Severity::Warning,
            subsystem,
            extra_info: 0,
        }
    }

    pub fn error(subsystem: Subsystem, code: ErrorCode) -> Self {
        Self {
            code,
            severity: Severity::Error,
            subsystem,
            extra_info: 0,
        }
    }

    pub fn with_extra(mut self, extra_info: u32) -> Self {
        self.extra_info = extra_info;
        self
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}

impl std::fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {:?}: {} (extra 0x{:x})",
            self.subsystem, self.severity, self.code, self.extra_info
        )
    }
}
