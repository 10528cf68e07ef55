//! # Driver Actors
//!
//! The two layers of the register-bus peripheral driver.
//!
//! ## Actors
//!
//! - **ApiActor**: Client-facing layer; brings the device layer up, forwards
//!   one request at a time and defers the rest in a bounded FIFO
//! - **DeviceActor**: Owns the bus; turns requests into correlated bus
//!   transfers under lockup/busy timers and a bounded retry policy
//!
//! ## Wiring
//!
//! ```ignore
//! let config = DriverConfig::default();
//! config.validate()?;
//! let (mut manager, handles) = ChannelManager::with_capacity(config.mailbox);
//!
//! let mut device = DeviceActor::new(config.device, manager.device_sender(), manager.bus_sender());
//! device.subscribe_with(manager.api_sender(), ApiMessage::DeviceReport);
//! let api = ApiActor::new(config.api, manager.api_sender(), manager.device_sender());
//!
//! tokio::spawn(async move { device.run(handles.device_rx).await });
//! tokio::spawn(async move { api.run(handles.api_rx).await });
//! // handles.bus_rx goes to the bus executor
//!
//! manager.send_command(DriverCommand::Enable)?;
//! ```

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::todo
)]

pub mod api_actor;
pub mod config;
pub mod constants;
pub mod device_actor;
pub mod retry;

pub use api_actor::ApiActor;
pub use config::{ApiConfig, DeviceConfig, DriverConfig};
pub use device_actor::DeviceActor;
pub use retry::{RetryDecision, RetryPolicy};
