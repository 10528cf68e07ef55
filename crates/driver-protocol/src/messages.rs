use crate::errors::{ErrorCode, ErrorRecord, Subsystem};
use crate::state::DriverStatus;
use serde::{Deserialize, Serialize};

/// Tag attached to a request and echoed in its response
///
/// `epoch` changes whenever the issuing actor starts a fresh series (the
/// device layer does so on every Idle entry); `seq` counts requests within
/// the series. Ids from different epochs never compare equal, so a reply
/// from an abandoned transaction cannot alias a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CorrelationId {
    pub epoch: u32,
    pub seq: u32,
}

impl CorrelationId {
    pub fn new(epoch: u32, seq: u32) -> Self {
        Self { epoch, seq }
    }
}

impl From<u32> for CorrelationId {
    /// Plain numeric ids, for callers that keep their own counter
    fn from(seq: u32) -> Self {
        Self { epoch: 0, seq }
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.epoch, self.seq)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Read,
    Write,
}

/// One register transfer
///
/// For reads `data` is empty and `len` is the number of bytes wanted;
/// for writes `len` always equals `data.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub operation: Operation,
    pub register: u16,
    pub data: Vec<u8>,
    pub len: usize,
}

impl TransactionRequest {
    pub fn read(register: u16, len: usize) -> Self {
        Self {
            operation: Operation::Read,
            register,
            data: Vec::new(),
            len,
        }
    }

    pub fn write(register: u16, data: Vec<u8>) -> Self {
        let len = data.len();
        Self {
            operation: Operation::Write,
            register,
            data,
            len,
        }
    }
}

/// Result of a completed transfer
///
/// `data` holds the bytes read, or echoes the bytes written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub operation: Operation,
    pub register: u16,
    pub data: Vec<u8>,
}

/// What a requestor eventually receives for a read/write request
pub type TransactionOutcome = Result<TransactionResponse, ErrorCode>;

/// Reply from the bus executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusReply {
    Complete { data: Vec<u8> },
    Error { code: i32 },
}

/// Bus-status broadcast consumed by the device layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusReadiness {
    Ready,
    NotReady,
}

/// Commands from the supervisor (API layer) or the API layer (device layer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverCommand {
    Enable,
    Disable,
    /// Re-publish the current status report
    RequestStatus,
    /// Change the debug verbosity threshold
    SetDebugLevel(u8),
}

/// Broadcast from a driver layer to its subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverEvent {
    ReadyReport { source: Subsystem },
    DisabledReport { source: Subsystem },
    ErrorReport { source: Subsystem },
    GenericError(ErrorRecord),
}

impl DriverEvent {
    /// Status report matching `status`, None for `Unknown`
    pub fn for_status(source: Subsystem, status: DriverStatus) -> Option<Self> {
        match status {
            DriverStatus::Unknown => None,
            DriverStatus::Disabled => Some(DriverEvent::DisabledReport { source }),
            DriverStatus::Enabled => Some(DriverEvent::ReadyReport { source }),
            DriverStatus::FatalError => Some(DriverEvent::ErrorReport { source }),
        }
    }

    /// Status carried by a status report
    pub fn status(&self) -> Option<DriverStatus> {
        match self {
            DriverEvent::ReadyReport { .. } => Some(DriverStatus::Enabled),
            DriverEvent::DisabledReport { .. } => Some(DriverStatus::Disabled),
            DriverEvent::ErrorReport { .. } => Some(DriverStatus::FatalError),
            DriverEvent::GenericError(_) => None,
        }
    }

    pub fn source(&self) -> Subsystem {
        match self {
            DriverEvent::ReadyReport { source }
            | DriverEvent::DisabledReport { source }
            | DriverEvent::ErrorReport { source } => *source,
            DriverEvent::GenericError(record) => record.subsystem,
        }
    }
}
