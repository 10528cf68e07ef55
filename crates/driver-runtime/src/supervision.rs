/// Timer utilities for actor supervision
///
/// Every wait in the driver (a bus reply, a busy window, a start-up phase)
/// is bounded by a one-shot timer that posts a timeout message back into the
/// actor's own mailbox.
use futures_channel::mpsc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;

/// Handle to cancel a timeout operation
///
/// When dropped or explicitly cancelled, the timeout task will not send
/// the timeout message, preventing spurious timeouts after operations complete.
#[derive(Debug)]
pub struct TimeoutHandle {
    cancelled: Arc<AtomicBool>,
    task: Option<AbortHandle>,
}

impl TimeoutHandle {
    fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    /// Cancel the timeout, preventing it from firing
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for TimeoutHandle {
    fn drop(&mut self) {
        // Auto-cancel when handle is dropped
        self.cancel();
    }
}

/// Spawn a task that sends `message` to `tx` after `duration`
///
/// Returns a TimeoutHandle that can be used to cancel the timeout. If the
/// handle is dropped or cancelled before the timeout fires, no message is
/// sent. Must be called from within a tokio runtime.
pub fn spawn_timeout<M: Send + 'static>(
    tx: mpsc::Sender<M>,
    message: M,
    duration: Duration,
) -> TimeoutHandle {
    let mut handle = TimeoutHandle::new();
    let cancel_flag = Arc::clone(&handle.cancelled);

    let task = tokio::spawn(async move {
        tokio::time::sleep(duration).await;

        // Final check before sending timeout message
        if !cancel_flag.load(Ordering::Acquire) {
            let mut tx = tx;
            let _ = tx.try_send(message);
        }
    });
    handle.task = Some(task.abort_handle());

    handle
}

/// Payload of a timeout message
///
/// Carries the generation the timer had when it was armed, so a tick that
/// was already queued when the timer was disarmed or re-armed can be told
/// apart from the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTick {
    pub generation: u32,
}

/// Named one-shot timer owned by an actor
///
/// Arming replaces any previous arm. A tick is live only if the timer is
/// still armed and the tick carries the current generation; [`Timer::accept`]
/// consumes a live tick and leaves the timer disarmed.
pub struct Timer<M> {
    name: &'static str,
    tx: mpsc::Sender<M>,
    wrap: fn(TimerTick) -> M,
    generation: u32,
    armed: Option<TimeoutHandle>,
}

impl<M: Send + 'static> Timer<M> {
    pub fn new(name: &'static str, tx: mpsc::Sender<M>, wrap: fn(TimerTick) -> M) -> Self {
        Self {
            name,
            tx,
            wrap,
            generation: 0,
            armed: None,
        }
    }

    pub fn arm(&mut self, duration: Duration) {
        self.disarm();
        self.generation = self.generation.wrapping_add(1);
        let tick = TimerTick {
            generation: self.generation,
        };
        self.armed = Some(spawn_timeout(self.tx.clone(), (self.wrap)(tick), duration));
    }
}

impl<M> Timer<M> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn disarm(&mut self) {
        if let Some(handle) = self.armed.take() {
            handle.cancel();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Consume a tick if it belongs to the current arm
    pub fn accept(&mut self, tick: TimerTick) -> bool {
        if self.armed.is_some() && tick.generation == self.generation {
            self.armed = None;
            true
        } else {
            false
        }
    }
}

// Manual Debug implementation (the sender is not interesting)
impl<M> std::fmt::Debug for Timer<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("name", &self.name)
            .field("generation", &self.generation)
            .field("armed", &self.armed.is_some())
            .finish()
    }
}
