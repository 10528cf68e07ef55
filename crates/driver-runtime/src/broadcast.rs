/// Observer list for an actor's outbound reports
///
/// Each subscriber is a bounded mailbox plus the function that wraps the
/// event into that mailbox's message type. Publishing never blocks: a full
/// subscriber misses the event (logged), a closed one is removed.
use futures_channel::mpsc;

use crate::actor_warn;

type Sink<T> = Box<dyn FnMut(T) -> Delivery + Send>;

enum Delivery {
    Sent,
    Full,
    Closed,
}

pub struct Broadcaster<T> {
    name: &'static str,
    sinks: Vec<Sink<T>>,
}

impl<T: Clone + Send + 'static> Broadcaster<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            sinks: Vec::new(),
        }
    }

    /// New subscriber receiving events as-is
    pub fn subscribe(&mut self, capacity: usize) -> mpsc::Receiver<T> {
        let (tx, rx) = mpsc::channel(capacity);
        self.subscribe_with(tx, |event| event);
        rx
    }

    /// Deliver events into an existing mailbox, wrapped by `wrap`
    pub fn subscribe_with<M: Send + 'static>(&mut self, tx: mpsc::Sender<M>, wrap: fn(T) -> M) {
        let mut tx = tx;
        self.sinks.push(Box::new(move |event| match tx.try_send(wrap(event)) {
            Ok(()) => Delivery::Sent,
            Err(e) if e.is_disconnected() => Delivery::Closed,
            Err(_) => Delivery::Full,
        }));
    }

    pub fn subscriber_count(&self) -> usize {
        self.sinks.len()
    }

    /// Send `event` to every subscriber
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&mut self, event: T) -> usize {
        let name = self.name;
        let mut delivered = 0;
        self.sinks.retain_mut(|sink| match sink(event.clone()) {
            Delivery::Sent => {
                delivered += 1;
                true
            }
            Delivery::Full => {
                actor_warn!("{}: subscriber mailbox full, event dropped", name);
                true
            }
            Delivery::Closed => false,
        });
        delivered
    }
}

// Manual Debug implementation (sinks are closures)
impl<T> std::fmt::Debug for Broadcaster<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("name", &self.name)
            .field("subscribers", &self.sinks.len())
            .finish()
    }
}
