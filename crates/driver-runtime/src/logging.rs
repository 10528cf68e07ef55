/// Centralized logging macros for the driver actors
///
/// These forward to `tracing`, so output format and level filtering are
/// whatever subscriber the host process installs. `actor_debug!` is
/// additionally gated by the actor's own [`Verbosity`], which can be changed
/// at runtime with `DriverCommand::SetDebugLevel`.
///
/// Log a debug message if `$level` is within the actor's verbosity
///
/// # Example
/// ```
/// use driver_runtime::{actor_debug, Verbosity};
/// let verbosity = Verbosity::new(2);
/// actor_debug!(verbosity, 1, "DeviceActor: {:?} → {:?}", "Idle", "Read");
/// ```
#[macro_export]
macro_rules! actor_debug {
    ($verbosity:expr, $level:expr, $($arg:tt)*) => {
        if $crate::logging::Verbosity::allows(&$verbosity, $level) {
            $crate::tracing::debug!($($arg)*);
        }
    };
}

/// Log info-level message
///
/// Use for state changes a supervisor would care about
#[macro_export]
macro_rules! actor_info {
    ($($arg:tt)*) => {
        $crate::tracing::info!($($arg)*)
    };
}

/// Log warning-level message
///
/// Use for recoverable errors and unexpected conditions
#[macro_export]
macro_rules! actor_warn {
    ($($arg:tt)*) => {
        $crate::tracing::warn!($($arg)*)
    };
}

/// Log error-level message
#[macro_export]
macro_rules! actor_error {
    ($($arg:tt)*) => {
        $crate::tracing::error!($($arg)*)
    };
}

/// Per-actor debug threshold
///
/// Level 0 silences `actor_debug!` entirely; higher levels let more detail
/// through. Messages at level 1 are transitions and rejected requests,
/// level 2 adds per-request traffic, level 3 adds stale and absorbed events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verbosity(u8);

impl Verbosity {
    pub fn new(level: u8) -> Self {
        Self(level)
    }

    pub fn level(&self) -> u8 {
        self.0
    }

    pub fn set(&mut self, level: u8) {
        self.0 = level;
    }

    pub fn allows(&self, level: u8) -> bool {
        level <= self.0
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Self(1)
    }
}
