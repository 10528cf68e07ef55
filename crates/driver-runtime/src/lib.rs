//! # Driver Runtime
//!
//! Provides the runtime infrastructure for the register-bus driver actors.
//!
//! This crate defines:
//! - **Actor trait**: Base trait for all actors with lifecycle methods
//! - **Channel management**: Typed mailboxes and routing for supervisor traffic
//! - **Hierarchical dispatch**: Superstate fall-through, entry/exit actions
//! - **Correlation**: Tagged request/response between actors
//! - **Supervision**: Cancellable one-shot timers with stale-tick detection
//! - **Broadcast**: Observer lists for status and error reports
//!
//! ## Architecture
//!
//! The runtime follows these principles:
//! - **Zero shared state**: Each actor owns its data
//! - **Message passing**: Actors communicate via typed messages
//! - **Sequential processing**: Messages are handled one at a time
//! - **Failure isolation**: Actor errors are logged, never propagated as panics
//!
//! ## Example
//!
//! ```ignore
//! use driver_runtime::{Actor, ChannelManager};
//!
//! let (mut manager, handles) = ChannelManager::new();
//!
//! let device = DeviceActor::new(DeviceConfig::default(), manager.device_sender(), manager.bus_sender());
//! tokio::spawn(async move { device.run(handles.device_rx).await });
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

pub mod actor;
pub mod broadcast;
pub mod channels;
pub mod correlation;
pub mod hsm;
pub mod logging;
pub mod supervision;

#[doc(hidden)]
pub use tracing;

pub use actor::Actor;
pub use broadcast::Broadcaster;
pub use channels::{
    ActorHandles, ApiMessage, BusRequest, ChannelManager, DeviceMessage, MailboxCapacity,
    TransactionCall,
};
pub use correlation::{CorrelationError, Correlator, ReplyTo, Replyable, Response};
pub use hsm::{Dispatch, Hsm, Outcome, StateHandlers};
pub use logging::Verbosity;
pub use supervision::{spawn_timeout, TimeoutHandle, Timer, TimerTick};
