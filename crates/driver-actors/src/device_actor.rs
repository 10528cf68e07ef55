use driver_protocol::{
    ActorError, BusReadiness, BusReply, DeviceState, DriverCommand, DriverEvent, DriverStatus,
    ErrorCode, ErrorRecord, Operation, SharedStatus, Subsystem, TransactionOutcome,
    TransactionRequest, TransactionResponse,
};
use driver_runtime::{
    actor_debug, actor_error, actor_info, actor_warn, Actor, Broadcaster, BusRequest, Correlator,
    DeviceMessage, Dispatch, Hsm, Outcome, ReplyTo, Replyable, StateHandlers, Timer,
    TransactionCall, Verbosity,
};
use futures_channel::mpsc;

use crate::config::DeviceConfig;
use crate::retry::{RetryDecision, RetryPolicy};

const SUBSYSTEM: Subsystem = Subsystem::DeviceLayer;

/// DeviceActor owns the bus and runs one register transaction at a time
///
/// Responsibilities:
/// - Turn read/write requests into bus requests tagged with a correlation id
/// - Bound every bus request with the lockup timer, retry on timeout
/// - Escalate bus errors to the Error state, return to Idle on exhausted retries
/// - Reply to the original requestor and broadcast status/error reports
///
/// ## State Machine
///
/// For the state hierarchy and invariants, see:
/// `driver-protocol/src/state.rs` - DeviceState documentation
///
/// Key coordination patterns:
/// - **Self-posted start**: Read/Write entry posts StartTransfer, which issues the bus request
/// - **Tagged self-posts**: StartTransfer/Retry carry the attempt they were posted for and
///   are dropped once a newer attempt has begun
/// - **Retry supersedes**: a retry issues a new id, replies to the old one are rejected
/// - **Bus not ready**: forces Disabled from any state, abandoning the held transaction
pub struct DeviceActor {
    hsm: Hsm<DeviceState>,
    ctx: DeviceContext,
}

struct DeviceContext {
    config: DeviceConfig,
    verbosity: Verbosity,
    status: DriverStatus,
    shared: SharedStatus,

    // Channel to send messages to self (self-posts, bus replies, timer ticks)
    self_tx: mpsc::Sender<DeviceMessage>,
    bus_tx: mpsc::Sender<BusRequest>,
    events: Broadcaster<DriverEvent>,

    // Armed per transfer attempt, and as the init timer while Starting
    lockup_timer: Timer<DeviceMessage>,
    // Armed for the whole Busy branch
    busy_timer: Timer<DeviceMessage>,

    bus_ids: Correlator,
    retry: RetryPolicy,
    // Bumped per capture, retry and start-up; tags StartTransfer/Retry
    attempt: u32,

    // The one transaction being executed (invariant: Some only inside Busy)
    transaction: Option<TransactionCall>,

    // Last bus-status broadcast; None until the first one arrives
    bus_readiness: Option<BusReadiness>,

    last_error: Option<ErrorCode>,
    last_bus_error: Option<i32>,
}

impl DeviceActor {
    pub fn new(
        config: DeviceConfig,
        self_tx: mpsc::Sender<DeviceMessage>,
        bus_tx: mpsc::Sender<BusRequest>,
    ) -> Self {
        let ctx = DeviceContext {
            verbosity: Verbosity::new(config.debug_level),
            retry: RetryPolicy::new(config.max_retries),
            config,
            status: DriverStatus::Unknown,
            shared: SharedStatus::new(),
            lockup_timer: Timer::new("lockup", self_tx.clone(), DeviceMessage::LockupTimeout),
            busy_timer: Timer::new("busy", self_tx.clone(), DeviceMessage::BusyTimeout),
            self_tx,
            bus_tx,
            events: Broadcaster::new("DeviceActor"),
            bus_ids: Correlator::new(),
            attempt: 0,
            transaction: None,
            bus_readiness: None,
            last_error: None,
            last_bus_error: None,
        };

        Self {
            hsm: Hsm::new(DeviceState::Disabled),
            ctx,
        }
    }

    /// Subscribe to status and error reports
    pub fn subscribe(&mut self, capacity: usize) -> mpsc::Receiver<DriverEvent> {
        self.ctx.events.subscribe(capacity)
    }

    /// Deliver status and error reports into another actor's mailbox
    pub fn subscribe_with<M: Send + 'static>(
        &mut self,
        tx: mpsc::Sender<M>,
        wrap: fn(DriverEvent) -> M,
    ) {
        self.ctx.events.subscribe_with(tx, wrap);
    }

    /// Lock-free view of status and busy flag, usable after the actor is spawned
    pub fn status_handle(&self) -> SharedStatus {
        self.ctx.shared.clone()
    }

    pub fn state(&self) -> DeviceState {
        self.hsm.state()
    }

    pub fn status(&self) -> DriverStatus {
        self.ctx.status
    }

    pub fn last_error(&self) -> Option<ErrorCode> {
        self.ctx.last_error
    }

    /// Code from the last bus executor error
    pub fn last_bus_error(&self) -> Option<i32> {
        self.ctx.last_bus_error
    }
}

impl DeviceContext {
    /// Begin a new attempt; signals posted for earlier ones go stale
    fn next_attempt(&mut self) {
        self.attempt = self.attempt.wrapping_add(1);
    }

    /// False (and logged) for a StartTransfer/Retry left over from an earlier attempt
    fn is_current(&self, event: &DeviceMessage, generation: u32) -> bool {
        if generation == self.attempt {
            return true;
        }
        actor_debug!(
            self.verbosity,
            3,
            "DeviceActor: dropping stale {} (attempt {}, now {})",
            event.kind(),
            generation,
            self.attempt
        );
        false
    }

    /// Post to own mailbox; false if the mailbox could not take it
    fn post(&mut self, msg: DeviceMessage) -> bool {
        let kind = msg.kind();
        match self.self_tx.try_send(msg) {
            Ok(()) => true,
            Err(e) => {
                actor_warn!("DeviceActor: self-post {} dropped: {}", kind, e);
                false
            }
        }
    }

    fn set_status(&mut self, status: DriverStatus) {
        self.status = status;
        self.shared.set_status(status);
        self.publish_status();
    }

    fn publish_status(&mut self) {
        if let Some(event) = DriverEvent::for_status(SUBSYSTEM, self.status) {
            self.events.publish(event);
        }
    }

    fn report(&mut self, record: ErrorRecord) {
        if record.is_warning() {
            actor_warn!("DeviceActor: {}", record);
        } else {
            actor_error!("DeviceActor: {}", record);
        }
        self.last_error = Some(record.code);
        self.events.publish(DriverEvent::GenericError(record));
    }

    fn reply(&self, call: &TransactionCall, outcome: TransactionOutcome) {
        if let Err(e) = call.respond(outcome) {
            actor_warn!(
                "DeviceActor: reply to {} ({}) lost: {}",
                call.reply_to.name(),
                call.id,
                e
            );
        }
    }

    fn validate(&self, request: &TransactionRequest) -> Result<(), ErrorCode> {
        let len_ok = request.len > 0 && request.len <= self.config.max_transfer_len;
        let data_ok = match request.operation {
            Operation::Read => true,
            Operation::Write => request.data.len() == request.len,
        };
        if len_ok && data_ok {
            Ok(())
        } else {
            Err(ErrorCode::InvalidLength)
        }
    }

    fn held_register(&self) -> u32 {
        self.transaction
            .as_ref()
            .map(|call| u32::from(call.body.register))
            .unwrap_or_default()
    }

    /// Send the held transaction to the bus executor under a fresh id
    fn issue_bus_request(&mut self) {
        let Some(call) = &self.transaction else {
            actor_warn!("DeviceActor: transfer start with no transaction held");
            return;
        };
        if self.bus_readiness == Some(BusReadiness::NotReady) {
            actor_warn!("DeviceActor: bus not ready, bus request withheld");
            return;
        }

        let id = self.bus_ids.issue();
        let reply_to = ReplyTo::new("DeviceActor", self.self_tx.clone(), DeviceMessage::Bus);
        let request = Replyable::new(id, reply_to, call.body.clone());

        actor_debug!(
            self.verbosity,
            2,
            "DeviceActor: bus {:?} 0x{:03x} ({} bytes) id {}",
            call.body.operation,
            call.body.register,
            call.body.len,
            id
        );

        // A lost request is recovered by the lockup timer like a lost reply
        if let Err(e) = self.bus_tx.try_send(request) {
            actor_warn!("DeviceActor: bus request {} not sent: {}", id, e);
        }
    }

    fn complete_transaction(&mut self, data: Vec<u8>) {
        if let Some(call) = self.transaction.take() {
            let request = &call.body;
            let data = match request.operation {
                Operation::Read => data,
                Operation::Write => request.data.clone(),
            };
            let response = TransactionResponse {
                operation: request.operation,
                register: request.register,
                data,
            };
            actor_debug!(
                self.verbosity,
                2,
                "DeviceActor: {:?} 0x{:03x} complete for {}",
                request.operation,
                request.register,
                call.reply_to.name()
            );
            self.reply(&call, Ok(response));
        }
    }

    /// Requested length when a read reply carries a different number of bytes
    fn short_or_long_read(&self, data: &[u8]) -> Option<usize> {
        self.transaction
            .as_ref()
            .map(|call| &call.body)
            .filter(|request| request.operation == Operation::Read && request.len != data.len())
            .map(|request| request.len)
    }

    fn fail_transaction(&mut self, code: ErrorCode) {
        if let Some(call) = self.transaction.take() {
            self.reply(&call, Err(code));
        }
    }

    // ---- state handlers ----

    fn backstop(&mut self, event: &DeviceMessage) -> Outcome<DeviceState> {
        match event {
            DeviceMessage::Command(DriverCommand::Disable) => {
                actor_info!("DeviceActor: disable requested");
                Outcome::Transition(DeviceState::Disabled)
            }
            DeviceMessage::Command(DriverCommand::RequestStatus) => {
                self.publish_status();
                Outcome::Handled
            }
            DeviceMessage::Command(DriverCommand::SetDebugLevel(level)) => {
                self.verbosity.set(*level);
                actor_info!("DeviceActor: debug level {}", level);
                Outcome::Handled
            }
            DeviceMessage::BusStatus(readiness) => {
                self.bus_readiness = Some(*readiness);
                match readiness {
                    BusReadiness::NotReady => {
                        actor_warn!("DeviceActor: bus not ready, disabling");
                        Outcome::Transition(DeviceState::Disabled)
                    }
                    BusReadiness::Ready => Outcome::Handled,
                }
            }
            DeviceMessage::Transaction(call) => {
                actor_debug!(
                    self.verbosity,
                    1,
                    "DeviceActor: rejecting {:?} from {}, not enabled",
                    call.body.operation,
                    call.reply_to.name()
                );
                self.reply(call, Err(ErrorCode::NotEnabled));
                Outcome::Handled
            }
            DeviceMessage::Bus(response) => {
                actor_debug!(
                    self.verbosity,
                    3,
                    "DeviceActor: dropping bus reply {}, no transfer in progress",
                    response.id
                );
                Outcome::Handled
            }
            DeviceMessage::Proceed
            | DeviceMessage::StartTransfer { .. }
            | DeviceMessage::Retry { .. }
            | DeviceMessage::LockupTimeout(_)
            | DeviceMessage::BusyTimeout(_) => {
                actor_debug!(self.verbosity, 3, "DeviceActor: stale {}", event.kind());
                Outcome::Handled
            }
            DeviceMessage::Command(DriverCommand::Enable) => Outcome::Unhandled,
        }
    }

    fn disabled(&mut self, event: &DeviceMessage) -> Outcome<DeviceState> {
        match event {
            DeviceMessage::Command(DriverCommand::Enable) => {
                Outcome::Transition(DeviceState::Starting)
            }
            DeviceMessage::Command(DriverCommand::Disable) => Outcome::Handled,
            DeviceMessage::BusStatus(BusReadiness::NotReady) => {
                // Already here, no second DisabledReport
                self.bus_readiness = Some(BusReadiness::NotReady);
                Outcome::Handled
            }
            _ => Outcome::Unhandled,
        }
    }

    fn starting(&mut self, event: &DeviceMessage) -> Outcome<DeviceState> {
        match event {
            DeviceMessage::Proceed => {
                if self.bus_readiness == Some(BusReadiness::NotReady) {
                    actor_debug!(self.verbosity, 1, "DeviceActor: waiting for bus ready");
                    Outcome::Handled
                } else {
                    Outcome::Transition(DeviceState::Idle)
                }
            }
            DeviceMessage::BusStatus(BusReadiness::Ready) => {
                self.bus_readiness = Some(BusReadiness::Ready);
                Outcome::Transition(DeviceState::Idle)
            }
            DeviceMessage::Retry { generation } => {
                if !self.is_current(event, *generation) {
                    return Outcome::Handled;
                }
                self.next_attempt();
                self.lockup_timer.arm(self.config.init_timeout());
                self.post(DeviceMessage::Proceed);
                Outcome::Handled
            }
            DeviceMessage::LockupTimeout(tick) => {
                if !self.lockup_timer.accept(*tick) {
                    return Outcome::Handled;
                }
                match self.retry.on_timeout() {
                    RetryDecision::Retry { attempt } => {
                        actor_warn!(
                            "DeviceActor: start-up timed out, retry {}/{}",
                            attempt,
                            self.retry.max_retries()
                        );
                        let generation = self.attempt;
                        if !self.post(DeviceMessage::Retry { generation }) {
                            self.lockup_timer.arm(self.config.init_timeout());
                        }
                        Outcome::Handled
                    }
                    RetryDecision::Exhausted { attempts } => {
                        self.report(
                            ErrorRecord::error(SUBSYSTEM, ErrorCode::Timeout)
                                .with_extra(u32::from(attempts)),
                        );
                        Outcome::Transition(DeviceState::Error)
                    }
                }
            }
            DeviceMessage::Command(DriverCommand::Enable) => Outcome::Handled,
            _ => Outcome::Unhandled,
        }
    }

    fn enabled(&mut self, event: &DeviceMessage) -> Outcome<DeviceState> {
        match event {
            DeviceMessage::Proceed => Outcome::Transition(DeviceState::Idle),
            DeviceMessage::Command(DriverCommand::Disable) => {
                Outcome::Transition(DeviceState::Disabled)
            }
            DeviceMessage::Command(DriverCommand::Enable) => Outcome::Handled,
            _ => Outcome::Unhandled,
        }
    }

    fn idle(&mut self, event: &DeviceMessage) -> Outcome<DeviceState> {
        match event {
            // Posted by Enabled entry, we are already here
            DeviceMessage::Proceed => Outcome::Handled,
            DeviceMessage::Transaction(call) => {
                let request = &call.body;
                if let Err(code) = self.validate(request) {
                    self.report(
                        ErrorRecord::warning(SUBSYSTEM, code)
                            .with_extra(u32::try_from(request.len).unwrap_or(u32::MAX)),
                    );
                    self.reply(call, Err(code));
                    return Outcome::Handled;
                }

                actor_debug!(
                    self.verbosity,
                    2,
                    "DeviceActor: {:?} 0x{:03x} ({} bytes) for {} id {}",
                    request.operation,
                    request.register,
                    request.len,
                    call.reply_to.name(),
                    call.id
                );

                let target = match request.operation {
                    Operation::Read => DeviceState::Read,
                    Operation::Write => DeviceState::Write,
                };
                self.retry.reset();
                self.next_attempt();
                self.transaction = Some(call.clone());
                Outcome::Transition(target)
            }
            _ => Outcome::Unhandled,
        }
    }

    fn busy(&mut self, event: &DeviceMessage) -> Outcome<DeviceState> {
        match event {
            DeviceMessage::Transaction(call) => {
                self.report(
                    ErrorRecord::warning(SUBSYSTEM, ErrorCode::DeviceBusy)
                        .with_extra(u32::from(call.body.register)),
                );
                self.reply(call, Err(ErrorCode::DeviceBusy));
                Outcome::Handled
            }
            DeviceMessage::BusyTimeout(tick) => {
                if !self.busy_timer.accept(*tick) {
                    return Outcome::Handled;
                }
                match self.retry.on_timeout() {
                    RetryDecision::Retry { attempt } => {
                        actor_warn!(
                            "DeviceActor: busy window elapsed, retry {}/{}",
                            attempt,
                            self.retry.max_retries()
                        );
                        self.busy_timer.arm(self.config.busy_window());
                        let generation = self.attempt;
                        self.post(DeviceMessage::Retry { generation });
                        Outcome::Handled
                    }
                    RetryDecision::Exhausted { .. } => {
                        self.bus_ids.clear();
                        let register = self.held_register();
                        self.report(
                            ErrorRecord::error(SUBSYSTEM, ErrorCode::BusyTimeout)
                                .with_extra(register),
                        );
                        self.fail_transaction(ErrorCode::BusyTimeout);
                        Outcome::Transition(DeviceState::Idle)
                    }
                }
            }
            DeviceMessage::Proceed => Outcome::Handled,
            _ => Outcome::Unhandled,
        }
    }

    /// Read and Write differ only in the request they carry
    fn transfer(&mut self, event: &DeviceMessage) -> Outcome<DeviceState> {
        match event {
            DeviceMessage::StartTransfer { generation } => {
                if self.is_current(event, *generation) {
                    self.issue_bus_request();
                }
                Outcome::Handled
            }
            DeviceMessage::Retry { generation } => {
                if !self.is_current(event, *generation) {
                    return Outcome::Handled;
                }
                self.next_attempt();
                self.lockup_timer.arm(self.config.lockup_timeout());
                self.issue_bus_request();
                Outcome::Handled
            }
            DeviceMessage::Bus(response) => {
                if let Err(e) = self.bus_ids.accept(response.id) {
                    self.report(
                        ErrorRecord::warning(SUBSYSTEM, ErrorCode::MismatchedCorrelation)
                            .with_extra(e.received().seq),
                    );
                    return Outcome::Handled;
                }
                self.lockup_timer.disarm();

                match &response.body {
                    BusReply::Complete { data } => {
                        if let Some(expected) = self.short_or_long_read(data) {
                            actor_warn!(
                                "DeviceActor: read returned {} bytes, expected {}",
                                data.len(),
                                expected
                            );
                            self.report(
                                ErrorRecord::error(SUBSYSTEM, ErrorCode::InvalidLength)
                                    .with_extra(u32::try_from(data.len()).unwrap_or(u32::MAX)),
                            );
                            self.fail_transaction(ErrorCode::InvalidLength);
                        } else {
                            self.complete_transaction(data.clone());
                        }
                        Outcome::Transition(DeviceState::Idle)
                    }
                    BusReply::Error { code } => {
                        self.last_bus_error = Some(*code);
                        let register = self.held_register();
                        self.report(
                            ErrorRecord::error(SUBSYSTEM, ErrorCode::BusTransaction(*code))
                                .with_extra(register),
                        );
                        self.fail_transaction(ErrorCode::BusTransaction(*code));
                        Outcome::Transition(DeviceState::Error)
                    }
                }
            }
            DeviceMessage::LockupTimeout(tick) => {
                if !self.lockup_timer.accept(*tick) {
                    return Outcome::Handled;
                }
                match self.retry.on_timeout() {
                    RetryDecision::Retry { attempt } => {
                        actor_warn!(
                            "DeviceActor: no bus reply, retry {}/{}",
                            attempt,
                            self.retry.max_retries()
                        );
                        let generation = self.attempt;
                        if !self.post(DeviceMessage::Retry { generation }) {
                            self.lockup_timer.arm(self.config.lockup_timeout());
                        }
                        Outcome::Handled
                    }
                    RetryDecision::Exhausted { .. } => {
                        self.bus_ids.clear();
                        let register = self.held_register();
                        self.report(
                            ErrorRecord::error(SUBSYSTEM, ErrorCode::Timeout).with_extra(register),
                        );
                        self.fail_transaction(ErrorCode::Timeout);
                        Outcome::Transition(DeviceState::Idle)
                    }
                }
            }
            _ => Outcome::Unhandled,
        }
    }

    fn error(&mut self, event: &DeviceMessage) -> Outcome<DeviceState> {
        match event {
            DeviceMessage::Command(DriverCommand::Enable) => {
                actor_info!("DeviceActor: recovering from error");
                Outcome::Transition(DeviceState::Starting)
            }
            DeviceMessage::Command(DriverCommand::Disable) => {
                Outcome::Transition(DeviceState::Disabled)
            }
            _ => Outcome::Unhandled,
        }
    }
}

impl StateHandlers<DeviceState> for DeviceContext {
    type Event = DeviceMessage;

    fn on_event(&mut self, state: DeviceState, event: &DeviceMessage) -> Outcome<DeviceState> {
        match state {
            DeviceState::Backstop => self.backstop(event),
            DeviceState::Disabled => self.disabled(event),
            DeviceState::Starting => self.starting(event),
            DeviceState::Enabled => self.enabled(event),
            DeviceState::Idle => self.idle(event),
            DeviceState::Busy => self.busy(event),
            DeviceState::Read | DeviceState::Write => self.transfer(event),
            DeviceState::Error => self.error(event),
        }
    }

    fn on_entry(&mut self, state: DeviceState) {
        match state {
            DeviceState::Backstop => {}
            DeviceState::Disabled => self.set_status(DriverStatus::Disabled),
            DeviceState::Starting => {
                self.retry.reset();
                self.next_attempt();
                self.lockup_timer.arm(self.config.init_timeout());
                self.post(DeviceMessage::Proceed);
            }
            DeviceState::Enabled => {
                // Queue proceed before anyone hears we are ready
                self.post(DeviceMessage::Proceed);
                self.set_status(DriverStatus::Enabled);
            }
            DeviceState::Idle => self.bus_ids.reset(),
            DeviceState::Busy => {
                self.shared.set_busy(true);
                self.busy_timer.arm(self.config.busy_window());
            }
            DeviceState::Read | DeviceState::Write => {
                self.lockup_timer.arm(self.config.lockup_timeout());
                let generation = self.attempt;
                self.post(DeviceMessage::StartTransfer { generation });
            }
            DeviceState::Error => self.set_status(DriverStatus::FatalError),
        }
    }

    fn on_exit(&mut self, state: DeviceState) {
        match state {
            DeviceState::Starting | DeviceState::Read | DeviceState::Write => {
                self.lockup_timer.disarm();
            }
            DeviceState::Busy => {
                self.busy_timer.disarm();
                self.bus_ids.clear();
                // Left Busy without completing: disable or bus loss
                self.fail_transaction(ErrorCode::BusUnavailable);
                self.shared.set_busy(false);
            }
            _ => {}
        }
    }
}

impl Actor for DeviceActor {
    type Message = DeviceMessage;

    fn name(&self) -> &'static str {
        "DeviceActor"
    }

    async fn init(&mut self) -> Result<(), ActorError> {
        self.hsm.start(&mut self.ctx);
        Ok(())
    }

    async fn handle(&mut self, msg: DeviceMessage) -> Result<(), ActorError> {
        match self.hsm.dispatch(&mut self.ctx, &msg) {
            Dispatch::Handled { .. } => Ok(()),
            Dispatch::Transitioned { from, to, .. } => {
                actor_debug!(self.ctx.verbosity, 1, "DeviceActor: {:?} → {:?}", from, to);
                Ok(())
            }
            Dispatch::Unhandled => Err(ActorError::UnexpectedMessage {
                state: format!("{:?}", self.hsm.state()),
                message: msg.kind().into(),
            }),
        }
    }

    async fn shutdown(&mut self) {
        self.ctx.lockup_timer.disarm();
        self.ctx.busy_timer.disarm();
        self.ctx.fail_transaction(ErrorCode::BusUnavailable);
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use driver_protocol::{CorrelationId, Severity};
    use driver_runtime::{Response, TimerTick};
    use futures::stream::StreamExt;

    type Outcomes = mpsc::Receiver<Response<TransactionOutcome>>;

    fn create_test_actor() -> (
        DeviceActor,
        mpsc::Receiver<DeviceMessage>,
        mpsc::Receiver<BusRequest>,
        mpsc::Receiver<DriverEvent>,
    ) {
        create_test_actor_with(DeviceConfig::default())
    }

    fn create_test_actor_with(
        config: DeviceConfig,
    ) -> (
        DeviceActor,
        mpsc::Receiver<DeviceMessage>,
        mpsc::Receiver<BusRequest>,
        mpsc::Receiver<DriverEvent>,
    ) {
        let (self_tx, self_rx) = mpsc::channel(100);
        let (bus_tx, bus_rx) = mpsc::channel(100);
        let mut actor = DeviceActor::new(config, self_tx, bus_tx);
        let events = actor.subscribe(100);
        (actor, self_rx, bus_rx, events)
    }

    fn requestor() -> (ReplyTo<TransactionOutcome>, Outcomes) {
        let (tx, rx) = mpsc::channel(100);
        (ReplyTo::new("test-client", tx, |r| r), rx)
    }

    fn call(
        reply_to: &ReplyTo<TransactionOutcome>,
        id: u32,
        request: TransactionRequest,
    ) -> DeviceMessage {
        DeviceMessage::Transaction(Replyable::new(
            CorrelationId::from(id),
            reply_to.clone(),
            request,
        ))
    }

    /// Feed queued self-posts back in, as the run loop would
    async fn pump(actor: &mut DeviceActor, self_rx: &mut mpsc::Receiver<DeviceMessage>) {
        while let Ok(Some(msg)) = self_rx.try_next() {
            let _ = actor.handle(msg).await;
        }
    }

    fn drain<T>(rx: &mut mpsc::Receiver<T>) -> Vec<T> {
        let mut out = Vec::new();
        while let Ok(Some(item)) = rx.try_next() {
            out.push(item);
        }
        out
    }

    fn records(events: &[DriverEvent]) -> Vec<ErrorRecord> {
        events
            .iter()
            .filter_map(|e| match e {
                DriverEvent::GenericError(record) => Some(*record),
                _ => None,
            })
            .collect()
    }

    async fn enabled_actor() -> (
        DeviceActor,
        mpsc::Receiver<DeviceMessage>,
        mpsc::Receiver<BusRequest>,
        mpsc::Receiver<DriverEvent>,
    ) {
        let (mut actor, mut self_rx, bus_rx, mut events) = create_test_actor();
        actor.init().await.unwrap();
        actor
            .handle(DeviceMessage::Command(DriverCommand::Enable))
            .await
            .unwrap();
        pump(&mut actor, &mut self_rx).await;
        assert_eq!(actor.state(), DeviceState::Idle);
        drain(&mut events);
        (actor, self_rx, bus_rx, events)
    }

    /// Idle actor with a read of 0x10 in flight; returns the bus request
    async fn reading_actor() -> (
        DeviceActor,
        mpsc::Receiver<DeviceMessage>,
        mpsc::Receiver<BusRequest>,
        mpsc::Receiver<DriverEvent>,
        Outcomes,
        BusRequest,
    ) {
        let (mut actor, mut self_rx, mut bus_rx, events) = enabled_actor().await;
        let (client, outcomes) = requestor();
        actor
            .handle(call(&client, 1, TransactionRequest::read(0x10, 2)))
            .await
            .unwrap();
        pump(&mut actor, &mut self_rx).await;
        assert_eq!(actor.state(), DeviceState::Read);
        let request = bus_rx.try_next().unwrap().unwrap();
        (actor, self_rx, bus_rx, events, outcomes, request)
    }

    #[tokio::test(start_paused = true)]
    async fn test_init_broadcasts_disabled_once() {
        let (mut actor, _self_rx, _bus_rx, mut events) = create_test_actor();
        assert_eq!(actor.status(), DriverStatus::Unknown);

        actor.init().await.unwrap();

        assert_eq!(actor.state(), DeviceState::Disabled);
        assert_eq!(actor.status_handle().status(), DriverStatus::Disabled);
        assert_eq!(
            drain(&mut events),
            vec![DriverEvent::DisabledReport {
                source: Subsystem::DeviceLayer
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_enable_reaches_idle_with_one_ready_report() {
        let (mut actor, mut self_rx, _bus_rx, mut events) = create_test_actor();
        actor.init().await.unwrap();
        drain(&mut events);

        actor
            .handle(DeviceMessage::Command(DriverCommand::Enable))
            .await
            .unwrap();
        assert_eq!(actor.state(), DeviceState::Starting);

        pump(&mut actor, &mut self_rx).await;

        assert_eq!(actor.state(), DeviceState::Idle);
        assert_eq!(actor.status(), DriverStatus::Enabled);
        assert_eq!(
            drain(&mut events),
            vec![DriverEvent::ReadyReport {
                source: Subsystem::DeviceLayer
            }]
        );
        // Init timer disarmed on the way out of Starting
        assert!(!actor.ctx.lockup_timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_redundant_enable_is_noop() {
        let (mut actor, mut self_rx, _bus_rx, mut events) = enabled_actor().await;

        actor
            .handle(DeviceMessage::Command(DriverCommand::Enable))
            .await
            .unwrap();
        pump(&mut actor, &mut self_rx).await;

        assert_eq!(actor.state(), DeviceState::Idle);
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_rejects_requests() {
        let (mut actor, _self_rx, mut bus_rx, _events) = create_test_actor();
        actor.init().await.unwrap();
        let (client, mut outcomes) = requestor();

        actor
            .handle(call(&client, 9, TransactionRequest::read(0x10, 2)))
            .await
            .unwrap();

        let reply = outcomes.try_next().unwrap().unwrap();
        assert_eq!(reply.id, CorrelationId::from(9));
        assert_eq!(reply.body, Err(ErrorCode::NotEnabled));
        assert!(bus_rx.try_next().is_err());
        assert_eq!(actor.state(), DeviceState::Disabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_completes_and_returns_to_idle() {
        let (mut actor, mut self_rx, _bus_rx, mut events, mut outcomes, request) =
            reading_actor().await;
        assert_eq!(request.body, TransactionRequest::read(0x10, 2));
        assert!(actor.status_handle().is_busy());

        request
            .respond(BusReply::Complete {
                data: vec![0xDE, 0xAD],
            })
            .unwrap();
        pump(&mut actor, &mut self_rx).await;

        assert_eq!(actor.state(), DeviceState::Idle);
        assert!(!actor.status_handle().is_busy());
        let reply = outcomes.try_next().unwrap().unwrap();
        assert_eq!(reply.id, CorrelationId::from(1));
        let response = reply.body.unwrap();
        assert_eq!(response.data, vec![0xDE, 0xAD]);
        assert_eq!(response.register, 0x10);

        // Exactly one reply, no error broadcast
        assert!(outcomes.try_next().is_err());
        assert!(records(&drain(&mut events)).is_empty());
        assert!(!actor.ctx.lockup_timer.is_armed());
        assert!(!actor.ctx.busy_timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_echoes_data() {
        let (mut actor, mut self_rx, mut bus_rx, _events) = enabled_actor().await;
        let (client, mut outcomes) = requestor();

        actor
            .handle(call(&client, 4, TransactionRequest::write(0x22, vec![1, 2, 3])))
            .await
            .unwrap();
        pump(&mut actor, &mut self_rx).await;
        assert_eq!(actor.state(), DeviceState::Write);

        let request = bus_rx.try_next().unwrap().unwrap();
        assert_eq!(request.body.data, vec![1, 2, 3]);
        request
            .respond(BusReply::Complete { data: Vec::new() })
            .unwrap();
        pump(&mut actor, &mut self_rx).await;

        let response = outcomes.try_next().unwrap().unwrap().body.unwrap();
        assert_eq!(response.operation, Operation::Write);
        assert_eq!(response.data, vec![1, 2, 3]);
        assert_eq!(actor.state(), DeviceState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_while_busy_warns_without_state_change() {
        let (mut actor, mut self_rx, mut bus_rx, mut events, _outcomes, _request) =
            reading_actor().await;
        let (other, mut other_outcomes) = requestor();

        actor
            .handle(call(&other, 2, TransactionRequest::write(0x11, vec![7])))
            .await
            .unwrap();
        pump(&mut actor, &mut self_rx).await;

        assert_eq!(actor.state(), DeviceState::Read);
        let reported = records(&drain(&mut events));
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].code, ErrorCode::DeviceBusy);
        assert_eq!(reported[0].severity, Severity::Warning);
        assert_eq!(
            other_outcomes.try_next().unwrap().unwrap().body,
            Err(ErrorCode::DeviceBusy)
        );
        // Second request never reached the bus
        assert!(bus_rx.try_next().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mismatched_bus_reply_is_ignored() {
        let (mut actor, mut self_rx, _bus_rx, mut events, mut outcomes, request) =
            reading_actor().await;

        let stale = Replyable::new(
            CorrelationId::new(request.id.epoch, request.id.seq + 5),
            request.reply_to.clone(),
            request.body.clone(),
        );
        stale
            .respond(BusReply::Complete { data: vec![0, 0] })
            .unwrap();
        pump(&mut actor, &mut self_rx).await;

        assert_eq!(actor.state(), DeviceState::Read);
        assert!(outcomes.try_next().is_err());
        let reported = records(&drain(&mut events));
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].code, ErrorCode::MismatchedCorrelation);
        assert_eq!(reported[0].severity, Severity::Warning);
        assert_eq!(actor.ctx.bus_ids.outstanding(), Some(request.id));

        // The real reply still completes the transaction
        request
            .respond(BusReply::Complete { data: vec![1, 2] })
            .unwrap();
        pump(&mut actor, &mut self_rx).await;
        assert_eq!(
            outcomes.try_next().unwrap().unwrap().body.unwrap().data,
            vec![1, 2]
        );
        assert_eq!(actor.state(), DeviceState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bus_error_escalates_to_error() {
        let (mut actor, mut self_rx, _bus_rx, mut events, mut outcomes, request) =
            reading_actor().await;

        request.respond(BusReply::Error { code: -5 }).unwrap();
        pump(&mut actor, &mut self_rx).await;

        assert_eq!(actor.state(), DeviceState::Error);
        assert_eq!(actor.status(), DriverStatus::FatalError);
        assert_eq!(actor.last_bus_error(), Some(-5));
        assert_eq!(actor.last_error(), Some(ErrorCode::BusTransaction(-5)));

        let events = drain(&mut events);
        let reported = records(&events);
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].severity, Severity::Error);
        assert_eq!(reported[0].extra_info, 0x10);
        assert!(events.contains(&DriverEvent::ErrorReport {
            source: Subsystem::DeviceLayer
        }));
        assert_eq!(
            outcomes.try_next().unwrap().unwrap().body,
            Err(ErrorCode::BusTransaction(-5))
        );
        assert!(!actor.ctx.lockup_timer.is_armed());
        assert!(!actor.ctx.busy_timer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lockup_retries_then_returns_to_idle() {
        let (mut actor, mut self_rx, mut bus_rx, mut events, mut outcomes, first) =
            reading_actor().await;
        let mut ids = vec![first.id];

        // Bus never answers: each lockup tick re-issues under a new id
        for _ in 0..DeviceConfig::default().max_retries {
            let tick = self_rx.next().await.unwrap();
            assert!(matches!(tick, DeviceMessage::LockupTimeout(_)));
            actor.handle(tick).await.unwrap();
            pump(&mut actor, &mut self_rx).await;
            assert_eq!(actor.state(), DeviceState::Read);
            ids.push(bus_rx.try_next().unwrap().unwrap().id);
        }
        assert!(records(&drain(&mut events)).is_empty());

        let tick = self_rx.next().await.unwrap();
        actor.handle(tick).await.unwrap();
        pump(&mut actor, &mut self_rx).await;

        assert_eq!(actor.state(), DeviceState::Idle);
        let reported = records(&drain(&mut events));
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].code, ErrorCode::Timeout);
        assert_eq!(reported[0].severity, Severity::Error);
        assert_eq!(
            outcomes.try_next().unwrap().unwrap().body,
            Err(ErrorCode::Timeout)
        );

        // Every attempt had its own id, and nothing more went to the bus
        ids.dedup();
        assert_eq!(ids.len(), usize::from(DeviceConfig::default().max_retries) + 1);
        assert!(bus_rx.try_next().is_err());

        // A late reply to any attempt is dropped in Idle
        first
            .respond(BusReply::Complete { data: vec![0, 0] })
            .unwrap();
        pump(&mut actor, &mut self_rx).await;
        assert_eq!(actor.state(), DeviceState::Idle);
        assert!(outcomes.try_next().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_queued_behind_late_completion_is_dropped() {
        let (mut actor, mut self_rx, mut bus_rx, _events, mut outcomes, first) =
            reading_actor().await;
        let (client, mut next_outcomes) = requestor();

        // Lockup tick taken, but the reply and a new request land before it is handled
        let tick = self_rx.next().await.unwrap();
        assert!(matches!(tick, DeviceMessage::LockupTimeout(_)));
        first
            .respond(BusReply::Complete { data: vec![1, 2] })
            .unwrap();
        actor
            .ctx
            .self_tx
            .try_send(call(&client, 2, TransactionRequest::read(0x20, 2)))
            .unwrap();

        actor.handle(tick).await.unwrap();
        pump(&mut actor, &mut self_rx).await;

        assert_eq!(
            outcomes.try_next().unwrap().unwrap().body.unwrap().data,
            vec![1, 2]
        );
        assert_eq!(actor.state(), DeviceState::Read);

        // The retry posted for the first transaction must not re-issue the second
        let issued = drain(&mut bus_rx);
        assert_eq!(issued.len(), 1);
        assert_eq!(issued[0].body, TransactionRequest::read(0x20, 2));
        assert_eq!(actor.ctx.bus_ids.outstanding(), Some(issued[0].id));
        assert!(next_outcomes.try_next().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_window_exhaustion_returns_to_idle() {
        // Lockup never fires: every attempt is cut short by the busy window
        let config = DeviceConfig {
            lockup_timeout_ms: 500,
            busy_window_ms: 100,
            ..DeviceConfig::default()
        };
        let max_retries = config.max_retries;
        let (mut actor, mut self_rx, mut bus_rx, mut events) = create_test_actor_with(config);
        actor.init().await.unwrap();
        actor
            .handle(DeviceMessage::Command(DriverCommand::Enable))
            .await
            .unwrap();
        pump(&mut actor, &mut self_rx).await;
        drain(&mut events);

        let (client, mut outcomes) = requestor();
        actor
            .handle(call(&client, 1, TransactionRequest::read(0x10, 2)))
            .await
            .unwrap();
        pump(&mut actor, &mut self_rx).await;

        let mut issued = drain(&mut bus_rx);
        while actor.state() == DeviceState::Read {
            let msg = self_rx.next().await.unwrap();
            assert!(matches!(msg, DeviceMessage::BusyTimeout(_)));
            actor.handle(msg).await.unwrap();
            pump(&mut actor, &mut self_rx).await;
            issued.extend(drain(&mut bus_rx));
        }

        assert_eq!(actor.state(), DeviceState::Idle);
        assert_eq!(issued.len(), usize::from(max_retries) + 1);
        let reported = records(&drain(&mut events));
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].code, ErrorCode::BusyTimeout);
        assert_eq!(reported[0].severity, Severity::Error);
        assert_eq!(reported[0].extra_info, 0x10);
        assert_eq!(
            outcomes.try_next().unwrap().unwrap().body,
            Err(ErrorCode::BusyTimeout)
        );
        assert!(outcomes.try_next().is_err());
        assert!(!actor.ctx.lockup_timer.is_armed());
        assert!(!actor.ctx.busy_timer.is_armed());
        assert!(!actor.status_handle().is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_with_wrong_length_is_rejected() {
        let (mut actor, mut self_rx, _bus_rx, mut events, mut outcomes, request) =
            reading_actor().await;

        request
            .respond(BusReply::Complete {
                data: vec![1, 2, 3],
            })
            .unwrap();
        pump(&mut actor, &mut self_rx).await;

        assert_eq!(actor.state(), DeviceState::Idle);
        assert_eq!(
            outcomes.try_next().unwrap().unwrap().body,
            Err(ErrorCode::InvalidLength)
        );
        let reported = records(&drain(&mut events));
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].code, ErrorCode::InvalidLength);
        assert_eq!(reported[0].extra_info, 3);
        assert_eq!(actor.last_error(), Some(ErrorCode::InvalidLength));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_resets_per_transaction() {
        let (mut actor, mut self_rx, mut bus_rx, _events, mut outcomes, _first) =
            reading_actor().await;

        let tick = self_rx.next().await.unwrap();
        actor.handle(tick).await.unwrap();
        pump(&mut actor, &mut self_rx).await;
        assert_eq!(actor.ctx.retry.attempts(), 1);

        let retried = bus_rx.try_next().unwrap().unwrap();
        retried
            .respond(BusReply::Complete { data: vec![5, 6] })
            .unwrap();
        pump(&mut actor, &mut self_rx).await;
        assert!(outcomes.try_next().unwrap().unwrap().body.is_ok());

        let (client, _outcomes) = requestor();
        actor
            .handle(call(&client, 2, TransactionRequest::read(0x12, 1)))
            .await
            .unwrap();
        assert_eq!(actor.ctx.retry.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bus_not_ready_disables_from_read() {
        let (mut actor, mut self_rx, _bus_rx, mut events, mut outcomes, _request) =
            reading_actor().await;

        actor
            .handle(DeviceMessage::BusStatus(BusReadiness::NotReady))
            .await
            .unwrap();
        pump(&mut actor, &mut self_rx).await;

        assert_eq!(actor.state(), DeviceState::Disabled);
        assert_eq!(
            drain(&mut events),
            vec![DriverEvent::DisabledReport {
                source: Subsystem::DeviceLayer
            }]
        );
        assert_eq!(
            outcomes.try_next().unwrap().unwrap().body,
            Err(ErrorCode::BusUnavailable)
        );
        assert!(!actor.ctx.lockup_timer.is_armed());
        assert!(!actor.ctx.busy_timer.is_armed());
        assert!(!actor.status_handle().is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bus_not_ready_disables_from_idle_and_error() {
        let (mut actor, _self_rx, _bus_rx, mut events) = enabled_actor().await;
        actor
            .handle(DeviceMessage::BusStatus(BusReadiness::NotReady))
            .await
            .unwrap();
        assert_eq!(actor.state(), DeviceState::Disabled);

        actor.ctx.status = DriverStatus::FatalError;
        actor.hsm = Hsm::new(DeviceState::Error);
        actor.hsm.start(&mut actor.ctx);
        drain(&mut events);

        actor
            .handle(DeviceMessage::BusStatus(BusReadiness::NotReady))
            .await
            .unwrap();
        assert_eq!(actor.state(), DeviceState::Disabled);
        assert_eq!(
            drain(&mut events),
            vec![DriverEvent::DisabledReport {
                source: Subsystem::DeviceLayer
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_bus_not_ready_while_disabled_does_not_rebroadcast() {
        let (mut actor, _self_rx, _bus_rx, mut events) = create_test_actor();
        actor.init().await.unwrap();
        drain(&mut events);

        actor
            .handle(DeviceMessage::BusStatus(BusReadiness::NotReady))
            .await
            .unwrap();

        assert_eq!(actor.state(), DeviceState::Disabled);
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_starting_waits_for_bus_ready() {
        let (mut actor, mut self_rx, _bus_rx, _events) = create_test_actor();
        actor.init().await.unwrap();
        actor
            .handle(DeviceMessage::BusStatus(BusReadiness::NotReady))
            .await
            .unwrap();

        actor
            .handle(DeviceMessage::Command(DriverCommand::Enable))
            .await
            .unwrap();
        pump(&mut actor, &mut self_rx).await;
        assert_eq!(actor.state(), DeviceState::Starting);

        actor
            .handle(DeviceMessage::BusStatus(BusReadiness::Ready))
            .await
            .unwrap();
        pump(&mut actor, &mut self_rx).await;
        assert_eq!(actor.state(), DeviceState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_up_timeout_exhaustion_goes_to_error() {
        let (mut actor, mut self_rx, _bus_rx, mut events) = create_test_actor();
        actor.init().await.unwrap();
        actor
            .handle(DeviceMessage::BusStatus(BusReadiness::NotReady))
            .await
            .unwrap();
        actor
            .handle(DeviceMessage::Command(DriverCommand::Enable))
            .await
            .unwrap();
        pump(&mut actor, &mut self_rx).await;
        drain(&mut events);

        while actor.state() == DeviceState::Starting {
            let msg = self_rx.next().await.unwrap();
            actor.handle(msg).await.unwrap();
        }

        assert_eq!(actor.state(), DeviceState::Error);
        let events = drain(&mut events);
        let reported = records(&events);
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].code, ErrorCode::Timeout);
        assert_eq!(reported[0].severity, Severity::Error);
        assert_eq!(
            events.last(),
            Some(&DriverEvent::ErrorReport {
                source: Subsystem::DeviceLayer
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_enable_recovers_from_error() {
        let (mut actor, mut self_rx, _bus_rx, mut events, _outcomes, request) =
            reading_actor().await;
        request.respond(BusReply::Error { code: 1 }).unwrap();
        pump(&mut actor, &mut self_rx).await;
        assert_eq!(actor.state(), DeviceState::Error);
        drain(&mut events);

        actor
            .handle(DeviceMessage::Command(DriverCommand::Enable))
            .await
            .unwrap();
        pump(&mut actor, &mut self_rx).await;

        assert_eq!(actor.state(), DeviceState::Idle);
        assert_eq!(
            drain(&mut events),
            vec![DriverEvent::ReadyReport {
                source: Subsystem::DeviceLayer
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_from_error() {
        let (mut actor, _self_rx, _bus_rx, _events) = create_test_actor();
        actor.hsm = Hsm::new(DeviceState::Error);
        actor.init().await.unwrap();
        assert_eq!(actor.status(), DriverStatus::FatalError);

        actor
            .handle(DeviceMessage::Command(DriverCommand::Disable))
            .await
            .unwrap();
        assert_eq!(actor.state(), DeviceState::Disabled);
        assert_eq!(actor.status(), DriverStatus::Disabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_request_republishes() {
        let (mut actor, _self_rx, _bus_rx, mut events) = enabled_actor().await;

        actor
            .handle(DeviceMessage::Command(DriverCommand::RequestStatus))
            .await
            .unwrap();

        assert_eq!(
            drain(&mut events),
            vec![DriverEvent::ReadyReport {
                source: Subsystem::DeviceLayer
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_debug_level() {
        let (mut actor, _self_rx, _bus_rx, _events) = create_test_actor();
        actor
            .handle(DeviceMessage::Command(DriverCommand::SetDebugLevel(3)))
            .await
            .unwrap();
        assert_eq!(actor.ctx.verbosity.level(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_length_rejected_in_idle() {
        let (mut actor, _self_rx, mut bus_rx, mut events) = enabled_actor().await;
        let (client, mut outcomes) = requestor();

        actor
            .handle(call(&client, 3, TransactionRequest::read(0x10, 0)))
            .await
            .unwrap();
        actor
            .handle(call(&client, 4, TransactionRequest::read(0x10, 64)))
            .await
            .unwrap();

        assert_eq!(actor.state(), DeviceState::Idle);
        assert!(bus_rx.try_next().is_err());
        for _ in 0..2 {
            assert_eq!(
                outcomes.try_next().unwrap().unwrap().body,
                Err(ErrorCode::InvalidLength)
            );
        }
        let reported = records(&drain(&mut events));
        assert!(reported
            .iter()
            .all(|r| r.code == ErrorCode::InvalidLength && r.is_warning()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_tick_in_idle_is_dropped() {
        let (mut actor, _self_rx, _bus_rx, mut events) = enabled_actor().await;

        actor
            .handle(DeviceMessage::LockupTimeout(TimerTick { generation: 1 }))
            .await
            .unwrap();
        actor
            .handle(DeviceMessage::BusyTimeout(TimerTick { generation: 1 }))
            .await
            .unwrap();

        assert_eq!(actor.state(), DeviceState::Idle);
        assert!(drain(&mut events).is_empty());
    }
}
