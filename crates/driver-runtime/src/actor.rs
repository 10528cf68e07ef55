use driver_protocol::ActorError;
use futures::stream::StreamExt;
use futures_channel::mpsc;

use crate::{actor_error, actor_info, actor_warn};

/// Actor trait for implementing message-driven components
///
/// Actors are independent, stateful components that communicate through
/// message passing. Each actor has its own mailbox and processes messages
/// sequentially, one to completion before the next.
///
/// # Lifecycle
///
/// 1. **init()** - Called once before message processing starts
/// 2. **handle()** - Called for each received message
/// 3. **shutdown()** - Called when the mailbox closes
///
/// # Example
///
/// ```ignore
/// struct EchoActor {
///     seen: u32,
/// }
///
/// impl Actor for EchoActor {
///     type Message = String;
///
///     fn name(&self) -> &'static str {
///         "EchoActor"
///     }
///
///     async fn handle(&mut self, msg: Self::Message) -> Result<(), ActorError> {
///         self.seen += 1;
///         Ok(())
///     }
/// }
///
/// tokio::spawn(async move { EchoActor { seen: 0 }.run(rx).await });
/// ```
#[allow(async_fn_in_trait)]
pub trait Actor: Send + 'static {
    /// Message type this actor processes
    type Message: Send + 'static;

    /// Actor name (used for logging and debugging)
    fn name(&self) -> &'static str;

    /// Initialize the actor before processing messages
    ///
    /// A failing init stops the actor before it reads its mailbox.
    async fn init(&mut self) -> Result<(), ActorError> {
        Ok(())
    }

    /// Handle a single message
    async fn handle(&mut self, msg: Self::Message) -> Result<(), ActorError>;

    /// Clean up before shutdown
    async fn shutdown(&mut self) {}

    /// Main actor run loop (provided by runtime)
    ///
    /// Consumes the actor and runs it until every sender of `rx` is dropped.
    /// Errors from `handle` are logged and do not stop the loop.
    async fn run(mut self, mut rx: mpsc::Receiver<Self::Message>)
    where
        Self: Sized,
    {
        if let Err(e) = self.init().await {
            actor_error!("{} init failed: {}", self.name(), e);
            return;
        }

        actor_info!("{} started", self.name());

        while let Some(msg) = rx.next().await {
            if let Err(e) = self.handle(msg).await {
                actor_warn!("{} error: {}", self.name(), e);
            }
        }

        self.shutdown().await;

        actor_info!("{} stopped", self.name());
    }
}
