//! # Driver Protocol
//!
//! Type-safe message definitions for the register-bus driver actors.
//!
//! This crate has no dependency on the async runtime, so everything here is
//! plain data that can be constructed and checked in ordinary unit tests.
//!
//! ## Architecture
//!
//! - **DriverCommand**: Supervisor → API layer, API layer → device layer
//! - **TransactionRequest / TransactionOutcome**: read/write requests and their replies
//! - **BusReply / BusReadiness**: what the bus executor reports back
//! - **DriverEvent**: broadcast status and error reports
//! - **DeviceState / ApiState**: state hierarchies of the two layers (pure data)
//!
//! ## Message Flow
//!
//! ```text
//! Supervisor → DriverCommand → API layer → DriverCommand → Device layer → bus executor
//!      ▲                           │   ▲                       │   ▲             │
//!      └──────── DriverEvent ──────┘   └── TransactionOutcome ─┘   └── BusReply ─┘
//! ```

#![deny(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::todo
)]

pub mod errors;
pub mod messages;
pub mod state;

pub use errors::{ActorError, ErrorCode, ErrorRecord, Severity, Subsystem};
pub use messages::{
    BusReadiness, BusReply, CorrelationId, DriverCommand, DriverEvent, Operation,
    TransactionOutcome, TransactionRequest, TransactionResponse,
};
pub use state::{
    ApiState, DeviceState, DriverStatus, Hierarchy, SharedStatus, LOCK_FLAG, STATE_MASK,
};
