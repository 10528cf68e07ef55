use std::collections::VecDeque;

use driver_protocol::{
    ActorError, ApiState, DriverCommand, DriverEvent, DriverStatus, ErrorCode, ErrorRecord,
    SharedStatus, Subsystem, TransactionOutcome,
};
use driver_runtime::{
    actor_debug, actor_error, actor_info, actor_warn, Actor, ApiMessage, Broadcaster, Correlator,
    DeviceMessage, Dispatch, Hsm, Outcome, ReplyTo, Replyable, StateHandlers, Timer,
    TransactionCall, Verbosity,
};
use futures_channel::mpsc;

use crate::config::ApiConfig;

const SUBSYSTEM: Subsystem = Subsystem::ApiLayer;

/// ApiActor is the client-facing layer in front of the DeviceActor
///
/// Responsibilities:
/// - Bring the device layer up on Enable and wait for its ReadyReport
/// - Forward one request at a time under its own correlation id
/// - Hold requests that arrive mid-transaction in a bounded FIFO
/// - Relay device replies to the original requestor with the requestor's id
///
/// ## State Machine
///
/// For the state hierarchy and invariants, see:
/// `driver-protocol/src/state.rs` - ApiState documentation
///
/// The device layer's status broadcasts must be routed into this actor's
/// mailbox (`DeviceActor::subscribe_with(api_tx, ApiMessage::DeviceReport)`).
pub struct ApiActor {
    hsm: Hsm<ApiState>,
    ctx: ApiContext,
}

struct ApiContext {
    config: ApiConfig,
    verbosity: Verbosity,
    status: DriverStatus,
    shared: SharedStatus,

    self_tx: mpsc::Sender<ApiMessage>,
    device_tx: mpsc::Sender<DeviceMessage>,
    events: Broadcaster<DriverEvent>,

    // Start-up handshake timer
    init_timer: Timer<ApiMessage>,
    busy_timer: Timer<ApiMessage>,

    device_ids: Correlator,
    // Requestor of the transaction the device layer is working on
    in_flight: Option<TransactionCall>,
    deferred: VecDeque<TransactionCall>,

    // Last status the device layer broadcast
    device_status: DriverStatus,
    last_error: Option<ErrorCode>,
}

impl ApiActor {
    pub fn new(
        config: ApiConfig,
        self_tx: mpsc::Sender<ApiMessage>,
        device_tx: mpsc::Sender<DeviceMessage>,
    ) -> Self {
        let ctx = ApiContext {
            verbosity: Verbosity::new(config.debug_level),
            deferred: VecDeque::with_capacity(config.deferred_capacity),
            config,
            status: DriverStatus::Unknown,
            shared: SharedStatus::new(),
            init_timer: Timer::new("init", self_tx.clone(), ApiMessage::LockupTimeout),
            busy_timer: Timer::new("busy", self_tx.clone(), ApiMessage::BusyTimeout),
            self_tx,
            device_tx,
            events: Broadcaster::new("ApiActor"),
            device_ids: Correlator::new(),
            in_flight: None,
            device_status: DriverStatus::Unknown,
            last_error: None,
        };

        Self {
            hsm: Hsm::new(ApiState::Disabled),
            ctx,
        }
    }

    pub fn subscribe(&mut self, capacity: usize) -> mpsc::Receiver<DriverEvent> {
        self.ctx.events.subscribe(capacity)
    }

    pub fn subscribe_with<M: Send + 'static>(
        &mut self,
        tx: mpsc::Sender<M>,
        wrap: fn(DriverEvent) -> M,
    ) {
        self.ctx.events.subscribe_with(tx, wrap);
    }

    pub fn status_handle(&self) -> SharedStatus {
        self.ctx.shared.clone()
    }

    pub fn state(&self) -> ApiState {
        self.hsm.state()
    }

    pub fn status(&self) -> DriverStatus {
        self.ctx.status
    }

    pub fn last_error(&self) -> Option<ErrorCode> {
        self.ctx.last_error
    }

    /// Number of requests waiting behind the in-flight one
    pub fn deferred_len(&self) -> usize {
        self.ctx.deferred.len()
    }
}

impl ApiContext {
    fn post(&mut self, msg: ApiMessage) {
        let kind = msg.kind();
        if let Err(e) = self.self_tx.try_send(msg) {
            actor_warn!("ApiActor: self-post {} dropped: {}", kind, e);
        }
    }

    fn send_device_command(&mut self, cmd: DriverCommand) {
        if let Err(e) = self.device_tx.try_send(DeviceMessage::Command(cmd)) {
            actor_warn!("ApiActor: {:?} not delivered to device layer: {}", cmd, e);
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
            actor_warn!("ApiActor: {}", record);
        } else {
            actor_error!("ApiActor: {}", record);
        }
        self.last_error = Some(record.code);
        self.events.publish(DriverEvent::GenericError(record));
    }

    fn reply(&self, call: &TransactionCall, outcome: TransactionOutcome) {
        if let Err(e) = call.respond(outcome) {
            actor_warn!(
                "ApiActor: reply to {} ({}) lost: {}",
                call.reply_to.name(),
                call.id,
                e
            );
        }
    }

    /// Queue behind the in-flight request; a full queue drops silently
    fn defer(&mut self, call: TransactionCall) {
        if self.deferred.len() >= self.config.deferred_capacity {
            actor_debug!(
                self.verbosity,
                1,
                "ApiActor: deferred queue full, dropping {:?} 0x{:03x} from {}",
                call.body.operation,
                call.body.register,
                call.reply_to.name()
            );
            return;
        }
        actor_debug!(
            self.verbosity,
            2,
            "ApiActor: deferring {:?} 0x{:03x} ({} waiting)",
            call.body.operation,
            call.body.register,
            self.deferred.len() + 1
        );
        self.deferred.push_back(call);
    }

    /// Forward `call` to the device layer under a fresh id
    fn start(&mut self, call: TransactionCall) -> Outcome<ApiState> {
        let id = self.device_ids.issue();
        let reply_to = ReplyTo::new("ApiActor", self.self_tx.clone(), ApiMessage::Device);
        let forward = Replyable::new(id, reply_to, call.body.clone());

        match self.device_tx.try_send(DeviceMessage::Transaction(forward)) {
            Ok(()) => {
                actor_debug!(
                    self.verbosity,
                    2,
                    "ApiActor: {:?} 0x{:03x} for {} ({}) forwarded as {}",
                    call.body.operation,
                    call.body.register,
                    call.reply_to.name(),
                    call.id,
                    id
                );
                self.in_flight = Some(call);
                Outcome::Transition(ApiState::Busy)
            }
            Err(e) => {
                actor_warn!("ApiActor: device layer unreachable: {}", e);
                self.device_ids.clear();
                self.report(
                    ErrorRecord::error(SUBSYSTEM, ErrorCode::DeviceUnavailable)
                        .with_extra(u32::from(call.body.register)),
                );
                self.reply(&call, Err(ErrorCode::DeviceUnavailable));
                Outcome::Handled
            }
        }
    }

    fn fail_deferred(&mut self, code: ErrorCode) {
        while let Some(call) = self.deferred.pop_front() {
            self.reply(&call, Err(code));
        }
    }

    // ---- state handlers ----

    fn backstop(&mut self, event: &ApiMessage) -> Outcome<ApiState> {
        match event {
            ApiMessage::Command(DriverCommand::Disable) => {
                actor_info!("ApiActor: disable requested");
                self.send_device_command(DriverCommand::Disable);
                // Its DisabledReport may trail a following Enable
                self.device_status = DriverStatus::Disabled;
                Outcome::Transition(ApiState::Disabled)
            }
            ApiMessage::Command(DriverCommand::RequestStatus) => {
                self.publish_status();
                Outcome::Handled
            }
            ApiMessage::Command(DriverCommand::SetDebugLevel(level)) => {
                self.verbosity.set(*level);
                actor_info!("ApiActor: debug level {}", level);
                Outcome::Handled
            }
            ApiMessage::DeviceReport(DriverEvent::ErrorReport { .. }) => {
                self.report(ErrorRecord::error(SUBSYSTEM, ErrorCode::DeviceUnavailable));
                Outcome::Transition(ApiState::Error)
            }
            ApiMessage::DeviceReport(report) => {
                actor_debug!(self.verbosity, 2, "ApiActor: device report {:?}", report);
                Outcome::Handled
            }
            ApiMessage::Transaction(call) => {
                actor_debug!(
                    self.verbosity,
                    1,
                    "ApiActor: rejecting {:?} from {}, not enabled",
                    call.body.operation,
                    call.reply_to.name()
                );
                self.reply(call, Err(ErrorCode::NotEnabled));
                Outcome::Handled
            }
            ApiMessage::Device(response) => {
                actor_debug!(
                    self.verbosity,
                    3,
                    "ApiActor: dropping device reply {}, nothing in flight",
                    response.id
                );
                Outcome::Handled
            }
            ApiMessage::StartInit
            | ApiMessage::Recall
            | ApiMessage::LockupTimeout(_)
            | ApiMessage::BusyTimeout(_) => {
                actor_debug!(self.verbosity, 3, "ApiActor: stale {}", event.kind());
                Outcome::Handled
            }
            ApiMessage::Command(DriverCommand::Enable) => Outcome::Unhandled,
        }
    }

    fn disabled(&mut self, event: &ApiMessage) -> Outcome<ApiState> {
        match event {
            ApiMessage::Command(DriverCommand::Enable) => Outcome::Transition(ApiState::Starting),
            ApiMessage::Command(DriverCommand::Disable) => Outcome::Handled,
            _ => Outcome::Unhandled,
        }
    }

    fn starting(&mut self, event: &ApiMessage) -> Outcome<ApiState> {
        match event {
            ApiMessage::StartInit => {
                if self.device_status == DriverStatus::Enabled {
                    actor_debug!(self.verbosity, 1, "ApiActor: device layer already enabled");
                    return Outcome::Transition(ApiState::Idle);
                }
                self.init_timer.arm(self.config.init_timeout());
                self.send_device_command(DriverCommand::Enable);
                Outcome::Handled
            }
            ApiMessage::DeviceReport(DriverEvent::ReadyReport { .. }) => {
                Outcome::Transition(ApiState::Idle)
            }
            ApiMessage::LockupTimeout(tick) => {
                if !self.init_timer.accept(*tick) {
                    return Outcome::Handled;
                }
                self.report(ErrorRecord::error(SUBSYSTEM, ErrorCode::Timeout));
                Outcome::Transition(ApiState::Error)
            }
            ApiMessage::Command(DriverCommand::Enable) => Outcome::Handled,
            _ => Outcome::Unhandled,
        }
    }

    fn enabled(&mut self, event: &ApiMessage) -> Outcome<ApiState> {
        match event {
            ApiMessage::Command(DriverCommand::Enable) => Outcome::Handled,
            _ => Outcome::Unhandled,
        }
    }

    fn idle(&mut self, event: &ApiMessage) -> Outcome<ApiState> {
        match event {
            ApiMessage::Transaction(call) => match self.deferred.pop_front() {
                // Oldest first, the newcomer joins the back
                Some(oldest) => {
                    self.defer(call.clone());
                    self.start(oldest)
                }
                None => self.start(call.clone()),
            },
            ApiMessage::Recall => match self.deferred.pop_front() {
                Some(oldest) => self.start(oldest),
                None => Outcome::Handled,
            },
            _ => Outcome::Unhandled,
        }
    }

    fn busy(&mut self, event: &ApiMessage) -> Outcome<ApiState> {
        match event {
            ApiMessage::Transaction(call) => {
                self.defer(call.clone());
                Outcome::Handled
            }
            // Idle entry posts it again
            ApiMessage::Recall => Outcome::Handled,
            ApiMessage::Device(response) => {
                if let Err(e) = self.device_ids.accept(response.id) {
                    self.report(
                        ErrorRecord::warning(SUBSYSTEM, ErrorCode::MismatchedCorrelation)
                            .with_extra(e.received().seq),
                    );
                    return Outcome::Handled;
                }
                if let Some(call) = self.in_flight.take() {
                    self.reply(&call, response.body.clone());
                }
                Outcome::Transition(ApiState::Idle)
            }
            ApiMessage::BusyTimeout(tick) => {
                if !self.busy_timer.accept(*tick) {
                    return Outcome::Handled;
                }
                self.device_ids.clear();
                let register = self
                    .in_flight
                    .as_ref()
                    .map(|call| u32::from(call.body.register))
                    .unwrap_or_default();
                self.report(
                    ErrorRecord::error(SUBSYSTEM, ErrorCode::BusyTimeout).with_extra(register),
                );
                if let Some(call) = self.in_flight.take() {
                    self.reply(&call, Err(ErrorCode::BusyTimeout));
                }
                Outcome::Transition(ApiState::Idle)
            }
            _ => Outcome::Unhandled,
        }
    }

    fn error(&mut self, event: &ApiMessage) -> Outcome<ApiState> {
        match event {
            ApiMessage::Command(DriverCommand::Enable) => {
                actor_info!("ApiActor: recovering from error");
                Outcome::Transition(ApiState::Starting)
            }
            ApiMessage::DeviceReport(DriverEvent::ErrorReport { .. }) => Outcome::Handled,
            _ => Outcome::Unhandled,
        }
    }
}

impl StateHandlers<ApiState> for ApiContext {
    type Event = ApiMessage;

    fn on_event(&mut self, state: ApiState, event: &ApiMessage) -> Outcome<ApiState> {
        match state {
            ApiState::Backstop => self.backstop(event),
            ApiState::Disabled => self.disabled(event),
            ApiState::Starting => self.starting(event),
            ApiState::Enabled => self.enabled(event),
            ApiState::Idle => self.idle(event),
            ApiState::Busy => self.busy(event),
            ApiState::Error => self.error(event),
        }
    }

    fn on_entry(&mut self, state: ApiState) {
        match state {
            ApiState::Backstop => {}
            ApiState::Disabled => self.set_status(DriverStatus::Disabled),
            ApiState::Starting => {
                self.shared.set_busy(true);
                self.post(ApiMessage::StartInit);
            }
            ApiState::Enabled => self.set_status(DriverStatus::Enabled),
            ApiState::Idle => {
                self.device_ids.reset();
                if !self.deferred.is_empty() {
                    self.post(ApiMessage::Recall);
                }
            }
            ApiState::Busy => {
                self.shared.set_busy(true);
                self.busy_timer.arm(self.config.busy_window());
            }
            ApiState::Error => self.set_status(DriverStatus::FatalError),
        }
    }

    fn on_exit(&mut self, state: ApiState) {
        match state {
            ApiState::Starting => {
                self.init_timer.disarm();
                self.shared.set_busy(false);
            }
            ApiState::Enabled => self.fail_deferred(ErrorCode::NotEnabled),
            ApiState::Busy => {
                self.busy_timer.disarm();
                self.device_ids.clear();
                if let Some(call) = self.in_flight.take() {
                    self.reply(&call, Err(ErrorCode::DeviceUnavailable));
                }
                self.shared.set_busy(false);
            }
            _ => {}
        }
    }
}

impl Actor for ApiActor {
    type Message = ApiMessage;

    fn name(&self) -> &'static str {
        "ApiActor"
    }

    async fn init(&mut self) -> Result<(), ActorError> {
        self.hsm.start(&mut self.ctx);
        Ok(())
    }

    async fn handle(&mut self, msg: ApiMessage) -> Result<(), ActorError> {
        // Track the device layer whatever state consumes the report
        if let ApiMessage::DeviceReport(report) = &msg {
            if let Some(status) = report.status() {
                self.ctx.device_status = status;
            }
        }

        match self.hsm.dispatch(&mut self.ctx, &msg) {
            Dispatch::Handled { .. } => Ok(()),
            Dispatch::Transitioned { from, to, .. } => {
                actor_debug!(self.ctx.verbosity, 1, "ApiActor: {:?} → {:?}", from, to);
                Ok(())
            }
            Dispatch::Unhandled => Err(ActorError::UnexpectedMessage {
                state: format!("{:?}", self.hsm.state()),
                message: msg.kind().into(),
            }),
        }
    }

    async fn shutdown(&mut self) {
        self.ctx.init_timer.disarm();
        self.ctx.busy_timer.disarm();
        if let Some(call) = self.ctx.in_flight.take() {
            self.ctx.reply(&call, Err(ErrorCode::DeviceUnavailable));
        }
        self.ctx.fail_deferred(ErrorCode::NotEnabled);
    }
}
