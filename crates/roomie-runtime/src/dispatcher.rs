//! Per-actor ordered dispatch.
//!
//! Each actor gets one worker task fed by an unbounded queue, so events from
//! the same actor are handled strictly in arrival order while different
//! actors proceed concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use roomie_bot::{Conversation, CoreError, InboundEvent, Intent};
use roomie_types::ActorId;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::executor::{ExecutionReport, IntentExecutor};

const STILL_WORKING: &str = "This is taking longer than usual, please wait.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("dispatcher is shut down")]
    ShutDown,
}

/// Handles one event end to end: conversation, then intent delivery.
pub struct BotRuntime {
    conversation: Arc<Conversation>,
    executor: Arc<IntentExecutor>,
    handle_timeout: Duration,
}

impl BotRuntime {
    pub fn new(
        conversation: Arc<Conversation>,
        executor: Arc<IntentExecutor>,
        handle_timeout: Duration,
    ) -> Self {
        Self {
            conversation,
            executor,
            handle_timeout,
        }
    }

    pub fn conversation(&self) -> &Arc<Conversation> {
        &self.conversation
    }

    /// Runs the conversation for `event` and delivers the resulting intents.
    ///
    /// When handling outlives the timeout the actor is told to wait, and the
    /// handler is still awaited: a durable write in progress is never abandoned.
    #[tracing::instrument(skip(self, event), fields(actor_id = %event.actor))]
    pub async fn process(&self, event: InboundEvent) -> ExecutionReport {
        let actor = event.actor;
        let conversation = self.conversation.clone();
        let mut task = tokio::spawn(async move { conversation.handle(event).await });
        let mut report = ExecutionReport::default();

        let joined = match tokio::time::timeout(self.handle_timeout, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                let error = CoreError::Timeout(self.handle_timeout.as_millis() as u64);
                tracing::warn!(error = %error, "event handling exceeded timeout");
                report += self
                    .executor
                    .execute(actor, vec![Intent::reply(STILL_WORKING)])
                    .await;
                task.await
            }
        };

        let intents = match joined {
            Ok(Ok(intents)) => intents,
            Ok(Err(error)) => {
                tracing::error!(error = %error, "event handling failed");
                vec![Intent::reply(error.user_message())]
            }
            Err(join_error) => {
                tracing::error!(error = %join_error, "event handler task aborted");
                vec![Intent::reply(
                    CoreError::Timeout(self.handle_timeout.as_millis() as u64).user_message(),
                )]
            }
        };
        report += self.executor.execute(actor, intents).await;
        report
    }
}

type ActorQueues = Arc<Mutex<Option<HashMap<ActorId, mpsc::UnboundedSender<InboundEvent>>>>>;

/// Routes events to per-actor workers.
///
/// A worker whose queue stays empty for `idle_timeout` removes its own queue and
/// exits; the next event from that actor starts a fresh worker.
pub struct ActorDispatcher {
    runtime: Arc<BotRuntime>,
    queues: ActorQueues,
    workers: Mutex<Vec<JoinHandle<()>>>,
    idle_timeout: Duration,
}

impl ActorDispatcher {
    pub fn new(runtime: Arc<BotRuntime>, idle_timeout: Duration) -> Self {
        Self {
            runtime,
            queues: Arc::new(Mutex::new(Some(HashMap::new()))),
            workers: Mutex::new(Vec::new()),
            idle_timeout,
        }
    }

    /// Queues `event` behind earlier events from the same actor.
    pub async fn submit(&self, event: InboundEvent) -> Result<(), DispatchError> {
        let mut guard = self.queues.lock().await;
        let queues = guard.as_mut().ok_or(DispatchError::ShutDown)?;
        let actor = event.actor;

        let event = match queues.get(&actor) {
            Some(sender) => match sender.send(event) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(event)) => event,
            },
            None => event,
        };

        let sender = self.spawn_worker(actor).await;
        // A freshly spawned worker holds the receiver, so this send cannot fail.
        let _ = sender.send(event);
        queues.insert(actor, sender);
        Ok(())
    }

    /// Number of actors that currently have a live worker queue.
    pub async fn active_actors(&self) -> usize {
        self.queues
            .lock()
            .await
            .as_ref()
            .map_or(0, HashMap::len)
    }

    /// Stops accepting events, drains every queue and waits for the workers.
    pub async fn shutdown(&self) {
        let queues = self.queues.lock().await.take();
        drop(queues);
        let workers = std::mem::take(&mut *self.workers.lock().await);
        for worker in workers {
            if let Err(error) = worker.await {
                tracing::warn!(error = %error, "actor worker ended abnormally");
            }
        }
    }

    async fn spawn_worker(&self, actor: ActorId) -> mpsc::UnboundedSender<InboundEvent> {
        let (sender, receiver) = mpsc::unbounded_channel::<InboundEvent>();
        let worker = tokio::spawn(run_worker(
            actor,
            receiver,
            self.runtime.clone(),
            self.queues.clone(),
            self.idle_timeout,
        ));
        let mut workers = self.workers.lock().await;
        workers.retain(|handle| !handle.is_finished());
        workers.push(worker);
        tracing::debug!(actor_id = %actor, "actor worker started");
        sender
    }
}

async fn run_worker(
    actor: ActorId,
    mut receiver: mpsc::UnboundedReceiver<InboundEvent>,
    runtime: Arc<BotRuntime>,
    queues: ActorQueues,
    idle_timeout: Duration,
) {
    loop {
        match tokio::time::timeout(idle_timeout, receiver.recv()).await {
            Ok(Some(event)) => {
                runtime.process(event).await;
            }
            Ok(None) => break,
            Err(_) => {
                // `submit` sends under this lock, so an empty queue here stays empty.
                let mut guard = queues.lock().await;
                match receiver.try_recv() {
                    Ok(event) => {
                        drop(guard);
                        runtime.process(event).await;
                    }
                    Err(_) => {
                        if let Some(queues) = guard.as_mut() {
                            queues.remove(&actor);
                        }
                        tracing::debug!(actor_id = %actor, "actor worker retired after idling");
                        return;
                    }
                }
            }
        }
    }
    tracing::debug!(actor_id = %actor, "actor worker stopped");
}
