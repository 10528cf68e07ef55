//! Runtime configuration for the driver actors
//!
//! Every field defaults to the value in [`crate::constants`], so a config
//! source only needs to name what it overrides:
//!
//! ```
//! # use driver_actors::config::DriverConfig;
//! let config: DriverConfig =
//!     serde_json::from_str(r#"{ "device": { "max_retries": 5 } }"#).unwrap();
//! assert_eq!(config.device.max_retries, 5);
//! assert_eq!(config.api.deferred_capacity, 5);
//! ```

use crate::constants::{api, device, DEFAULT_DEBUG_LEVEL};
use driver_protocol::ActorError;
use driver_runtime::MailboxCapacity;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub lockup_timeout_ms: u64,
    pub init_timeout_ms: u64,
    pub busy_window_ms: u64,
    pub max_retries: u8,
    pub max_transfer_len: usize,
    pub debug_level: u8,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            lockup_timeout_ms: device::LOCKUP_TIMEOUT_MS,
            init_timeout_ms: device::INIT_TIMEOUT_MS,
            busy_window_ms: device::BUSY_WINDOW_MS,
            max_retries: device::MAX_RETRIES,
            max_transfer_len: device::MAX_TRANSFER_LEN,
            debug_level: DEFAULT_DEBUG_LEVEL,
        }
    }
}

impl DeviceConfig {
    pub fn lockup_timeout(&self) -> Duration {
        Duration::from_millis(self.lockup_timeout_ms)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn busy_window(&self) -> Duration {
        Duration::from_millis(self.busy_window_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub init_timeout_ms: u64,
    pub busy_window_ms: u64,
    pub deferred_capacity: usize,
    pub debug_level: u8,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            init_timeout_ms: api::INIT_TIMEOUT_MS,
            busy_window_ms: api::BUSY_WINDOW_MS,
            deferred_capacity: api::DEFERRED_CAPACITY,
            debug_level: DEFAULT_DEBUG_LEVEL,
        }
    }
}

impl ApiConfig {
    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn busy_window(&self) -> Duration {
        Duration::from_millis(self.busy_window_ms)
    }
}

/// Configuration of one peripheral instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub device: DeviceConfig,
    pub api: ApiConfig,
    pub mailbox: MailboxCapacity,
}

impl DriverConfig {
    /// Reject settings the actors cannot run with
    pub fn validate(&self) -> Result<(), ActorError> {
        if self.device.lockup_timeout_ms == 0
            || self.device.init_timeout_ms == 0
            || self.device.busy_window_ms == 0
            || self.api.init_timeout_ms == 0
            || self.api.busy_window_ms == 0
        {
            return Err(ActorError::Config(
                "timeouts must be non-zero: a zero timeout expires before any reply can arrive"
                    .into(),
            ));
        }
        if self.device.max_transfer_len == 0 {
            return Err(ActorError::Config(
                "max_transfer_len must be at least 1 byte".into(),
            ));
        }
        if self.api.busy_window_ms <= self.device.busy_window_ms {
            return Err(ActorError::Config(format!(
                "api.busy_window_ms ({}) must exceed device.busy_window_ms ({}) \
                 or the API layer abandons transactions the device layer is still running",
                self.api.busy_window_ms, self.device.busy_window_ms
            )));
        }
        Ok(())
    }
}
