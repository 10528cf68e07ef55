//! # Correlated Request/Response
//!
//! A requestor sends a [`Replyable`] carrying its own return address
//! ([`ReplyTo`]) and a [`CorrelationId`] it chose. The receiver answers with
//! [`Replyable::respond`], which delivers a [`Response`] tagged with the same
//! id straight into the requestor's mailbox.
//!
//! The requestor tracks what it is waiting for with a [`Correlator`] and
//! must check every reply against it: a reply for anything but the current
//! outstanding id is stale and must not be applied.
//!
//! There is no timeout here. Callers arm their own timers.

use driver_protocol::{ActorError, CorrelationId};
use futures_channel::mpsc;
use std::sync::Arc;
use thiserror::Error;

/// Sequence number issued right after a reset
pub const BASELINE_SEQ: u32 = 0;

type Deliver<R> = dyn Fn(Response<R>) -> Result<(), ActorError> + Send + Sync;

/// Return address of a requestor
///
/// Wraps the requestor's mailbox together with the function that turns a
/// [`Response`] into that mailbox's message type, so responders never need to
/// know who is asking. Clone is cheap (Arc increment).
pub struct ReplyTo<R> {
    name: &'static str,
    deliver: Arc<Deliver<R>>,
}

impl<R: Send + 'static> ReplyTo<R> {
    pub fn new<M: Send + 'static>(
        name: &'static str,
        tx: mpsc::Sender<M>,
        wrap: fn(Response<R>) -> M,
    ) -> Self {
        let deliver = move |response: Response<R>| {
            tx.clone().try_send(wrap(response)).map_err(|e| {
                if e.is_disconnected() {
                    ActorError::ChannelClosed(format!("{} has shut down", name))
                } else {
                    ActorError::Other(format!("{} mailbox overloaded", name))
                }
            })
        };
        Self {
            name,
            deliver: Arc::new(deliver),
        }
    }
}

impl<R> ReplyTo<R> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Deliver `body` tagged with `id`
    pub fn send(&self, id: CorrelationId, body: R) -> Result<(), ActorError> {
        (self.deliver)(Response { id, body })
    }
}

impl<R> Clone for ReplyTo<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            deliver: Arc::clone(&self.deliver),
        }
    }
}

// Manual Debug implementation (the delivery closure is opaque)
impl<R> std::fmt::Debug for ReplyTo<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyTo").field("name", &self.name).finish()
    }
}

/// A request of type `T` whose answer is an `R`
#[derive(Debug, Clone)]
pub struct Replyable<T, R> {
    pub id: CorrelationId,
    pub reply_to: ReplyTo<R>,
    pub body: T,
}

impl<T, R> Replyable<T, R> {
    pub fn new(id: CorrelationId, reply_to: ReplyTo<R>, body: T) -> Self {
        Self { id, reply_to, body }
    }

    /// Answer the requestor, echoing its correlation id
    pub fn respond(&self, body: R) -> Result<(), ActorError> {
        self.reply_to.send(self.id, body)
    }
}

/// A reply as it arrives in the requestor's mailbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response<R> {
    pub id: CorrelationId,
    pub body: R,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("response {received} does not match outstanding request {expected}")]
    Mismatch {
        expected: CorrelationId,
        received: CorrelationId,
    },

    #[error("response {received} arrived with no request outstanding")]
    NothingOutstanding { received: CorrelationId },
}

impl CorrelationError {
    pub fn received(&self) -> CorrelationId {
        match self {
            CorrelationError::Mismatch { received, .. }
            | CorrelationError::NothingOutstanding { received } => *received,
        }
    }
}

/// Requestor-side bookkeeping for correlated requests
///
/// At most one id is outstanding at a time; issuing a new one supersedes
/// the previous (that is how a retry invalidates the attempt it replaces).
#[derive(Debug, Default)]
pub struct Correlator {
    epoch: u32,
    seq: u32,
    outstanding: Option<CorrelationId>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh series: new epoch, sequence back to baseline, nothing outstanding
    pub fn reset(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        self.seq = BASELINE_SEQ;
        self.outstanding = None;
    }

    /// Allocate the next id and mark it outstanding
    pub fn issue(&mut self) -> CorrelationId {
        self.seq = self.seq.wrapping_add(1);
        let id = CorrelationId::new(self.epoch, self.seq);
        self.outstanding = Some(id);
        id
    }

    /// Check a reply; on success nothing is outstanding any more
    pub fn accept(&mut self, received: CorrelationId) -> Result<(), CorrelationError> {
        match self.outstanding {
            Some(expected) if expected == received => {
                self.outstanding = None;
                Ok(())
            }
            Some(expected) => Err(CorrelationError::Mismatch { expected, received }),
            None => Err(CorrelationError::NothingOutstanding { received }),
        }
    }

    pub fn outstanding(&self) -> Option<CorrelationId> {
        self.outstanding
    }

    /// Give up on the outstanding request without starting a new series
    pub fn clear(&mut self) {
        self.outstanding = None;
    }
}
