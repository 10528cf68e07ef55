use driver_protocol::{
    ActorError, BusReadiness, BusReply, DriverCommand, DriverEvent, TransactionOutcome,
    TransactionRequest,
};
use futures_channel::mpsc;
use serde::{Deserialize, Serialize};

use crate::correlation::{Replyable, Response};
use crate::supervision::TimerTick;

/// Read/write request addressed to either driver layer
pub type TransactionCall = Replyable<TransactionRequest, TransactionOutcome>;

/// Transfer request addressed to the bus executor
pub type BusRequest = Replyable<TransactionRequest, BusReply>;

/// Mailbox messages of the device-layer actor
#[derive(Debug, Clone)]
pub enum DeviceMessage {
    /// Enable/disable/status/debug-level from the API layer or a supervisor
    Command(DriverCommand),
    /// Read or write request from any requestor
    Transaction(TransactionCall),
    /// Bus-status broadcast
    BusStatus(BusReadiness),
    /// Completion or error from the bus executor
    Bus(Response<BusReply>),

    // Self-posted signals
    /// Leave Starting / Enabled for the next state
    Proceed,
    /// Issue the bus request for the transaction just captured
    ///
    /// `generation` is the attempt it was posted for; a signal from an
    /// earlier attempt is stale and must be dropped.
    StartTransfer { generation: u32 },
    /// Re-attempt the current phase
    Retry { generation: u32 },

    // Timer ticks
    LockupTimeout(TimerTick),
    BusyTimeout(TimerTick),
}

/// Mailbox messages of the API-layer actor
#[derive(Debug, Clone)]
pub enum ApiMessage {
    /// Enable/disable/status/debug-level from the supervisor
    Command(DriverCommand),
    /// Read or write request from a client
    Transaction(TransactionCall),
    /// Broadcast report from the device layer
    DeviceReport(DriverEvent),
    /// Reply from the device layer to a forwarded request
    Device(Response<TransactionOutcome>),

    // Self-posted signals
    /// Ask the device layer to start
    StartInit,
    /// Start the oldest deferred request
    Recall,

    // Timer ticks
    LockupTimeout(TimerTick),
    BusyTimeout(TimerTick),
}

impl DeviceMessage {
    /// Short name for logs and error reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Command(_) => "Command",
            Self::Transaction(_) => "Transaction",
            Self::BusStatus(_) => "BusStatus",
            Self::Bus(_) => "Bus",
            Self::Proceed => "Proceed",
            Self::StartTransfer { .. } => "StartTransfer",
            Self::Retry { .. } => "Retry",
            Self::LockupTimeout(_) => "LockupTimeout",
            Self::BusyTimeout(_) => "BusyTimeout",
        }
    }
}

impl ApiMessage {
    /// Short name for logs and error reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Command(_) => "Command",
            Self::Transaction(_) => "Transaction",
            Self::DeviceReport(_) => "DeviceReport",
            Self::Device(_) => "Device",
            Self::StartInit => "StartInit",
            Self::Recall => "Recall",
            Self::LockupTimeout(_) => "LockupTimeout",
            Self::BusyTimeout(_) => "BusyTimeout",
        }
    }
}

/// Bounded mailbox sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxCapacity {
    pub api: usize,
    pub device: usize,
    pub bus: usize,
}

impl Default for MailboxCapacity {
    /// Ten events per actor covers one in-flight transaction, its timers,
    /// self-posts and a full deferred queue; the bus executor only ever sees
    /// one outstanding request plus a superseded retry.
    fn default() -> Self {
        Self {
            api: 10,
            device: 10,
            bus: 4,
        }
    }
}

/// Receivers handed to the actors (and the bus executor) at spawn time
pub struct ActorHandles {
    pub api_rx: mpsc::Receiver<ApiMessage>,
    pub device_rx: mpsc::Receiver<DeviceMessage>,
    pub bus_rx: mpsc::Receiver<BusRequest>,
}

/// Channel manager for driver communication
///
/// Owns a sender for every mailbox and routes supervisor traffic. Clone is
/// cheap: only senders are held.
#[derive(Clone)]
pub struct ChannelManager {
    api_tx: mpsc::Sender<ApiMessage>,
    device_tx: mpsc::Sender<DeviceMessage>,
    bus_tx: mpsc::Sender<BusRequest>,
}

impl ChannelManager {
    /// Create a channel manager and actor handles with default capacities
    ///
    /// Returns (ChannelManager for the supervisor, ActorHandles for spawning actors)
    pub fn new() -> (Self, ActorHandles) {
        Self::with_capacity(MailboxCapacity::default())
    }

    pub fn with_capacity(capacity: MailboxCapacity) -> (Self, ActorHandles) {
        let (api_tx, api_rx) = mpsc::channel(capacity.api);
        let (device_tx, device_rx) = mpsc::channel(capacity.device);
        let (bus_tx, bus_rx) = mpsc::channel(capacity.bus);

        let handles = ActorHandles {
            api_rx,
            device_rx,
            bus_rx,
        };
        let manager = Self {
            api_tx,
            device_tx,
            bus_tx,
        };

        (manager, handles)
    }

    /// Send a supervisor command to the API layer
    pub fn send_command(&mut self, cmd: DriverCommand) -> Result<(), ActorError> {
        Self::send_critical(&mut self.api_tx, ApiMessage::Command(cmd), "API layer")
    }

    /// Submit a read/write request to the API layer
    pub fn submit(&mut self, call: TransactionCall) -> Result<(), ActorError> {
        Self::send_critical(&mut self.api_tx, ApiMessage::Transaction(call), "API layer")
    }

    /// Deliver a bus-status broadcast to the device layer
    pub fn publish_bus_status(&mut self, readiness: BusReadiness) -> Result<(), ActorError> {
        Self::send_critical(
            &mut self.device_tx,
            DeviceMessage::BusStatus(readiness),
            "Device layer",
        )
    }

    /// Sends through the manager's own sender rather than a fresh clone, so
    /// a full mailbox is reported instead of growing by one slot per call.
    fn send_critical<M>(
        tx: &mut mpsc::Sender<M>,
        msg: M,
        target: &'static str,
    ) -> Result<(), ActorError> {
        tx.try_send(msg).map_err(|e| {
            if e.is_disconnected() {
                ActorError::ChannelClosed(format!("{} has shut down", target))
            } else {
                ActorError::Other(format!(
                    "{} mailbox overloaded: too many pending messages",
                    target
                ))
            }
        })
    }

    /// Clone senders for direct actor-to-actor communication
    pub fn api_sender(&self) -> mpsc::Sender<ApiMessage> {
        self.api_tx.clone()
    }

    pub fn device_sender(&self) -> mpsc::Sender<DeviceMessage> {
        self.device_tx.clone()
    }

    pub fn bus_sender(&self) -> mpsc::Sender<BusRequest> {
        self.bus_tx.clone()
    }
}
