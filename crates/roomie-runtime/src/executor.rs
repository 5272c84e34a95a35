//! Executes intents against the messaging gateway.

use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Duration;

use roomie_bot::{
    send_with_timeout, Content, DeliveryError, Intent, Keyboard, MessageRef, MessagingGateway,
    RuntimeConfig,
};
use roomie_types::ActorId;

use crate::broadcast::Broadcaster;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub delivered: usize,
    pub failed: usize,
}

impl AddAssign for ExecutionReport {
    fn add_assign(&mut self, other: Self) {
        self.delivered += other.delivered;
        self.failed += other.failed;
    }
}

pub struct IntentExecutor {
    gateway: Arc<dyn MessagingGateway>,
    broadcaster: Broadcaster,
    delivery_timeout: Duration,
    retry_attempts: usize,
}

impl IntentExecutor {
    pub fn new(gateway: Arc<dyn MessagingGateway>, config: &RuntimeConfig) -> Self {
        Self {
            broadcaster: Broadcaster::new(
                gateway.clone(),
                config.broadcast_interval(),
                config.delivery_timeout(),
            ),
            gateway,
            delivery_timeout: config.delivery_timeout(),
            retry_attempts: config.immediate_retry_attempts,
        }
    }

    /// Delivers intents in order. A failed delivery is logged and counted; later intents still run.
    #[tracing::instrument(skip(self, intents), fields(actor_id = %actor, intents = intents.len()))]
    pub async fn execute(&self, actor: ActorId, intents: Vec<Intent>) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        for intent in intents {
            let kind = intent.kind_name();
            match self.deliver(actor, intent).await {
                Ok(delivered) => report += delivered,
                Err(error) => {
                    report.failed += 1;
                    tracing::warn!(intent = kind, error = %error, "intent delivery failed");
                }
            }
        }
        report
    }

    async fn deliver(&self, actor: ActorId, intent: Intent) -> Result<ExecutionReport, DeliveryError> {
        let one = ExecutionReport {
            delivered: 1,
            failed: 0,
        };
        match intent {
            Intent::Reply { content, keyboard } => {
                self.reply(actor, &content, keyboard.as_ref()).await?;
                Ok(one)
            }
            Intent::NotifyUser {
                recipient,
                content,
                keyboard,
            }
            | Intent::NotifyAdmin {
                admin: recipient,
                content,
                keyboard,
            } => {
                send_with_timeout(
                    self.gateway.as_ref(),
                    recipient,
                    &content,
                    keyboard.as_ref(),
                    self.delivery_timeout,
                )
                .await?;
                Ok(one)
            }
            Intent::EditMessage {
                message,
                content,
                keyboard,
            } => {
                self.bounded(
                    actor,
                    self.gateway
                        .edit_content(actor, &message, &content, keyboard.as_ref()),
                )
                .await?;
                Ok(one)
            }
            Intent::DeleteMessage { message } => {
                self.bounded(actor, self.gateway.delete_content(actor, &message))
                    .await?;
                Ok(one)
            }
            Intent::Broadcast {
                recipients,
                content,
            } => {
                let result = self.broadcaster.run(&recipients, &content).await;
                let mut report = ExecutionReport {
                    delivered: result.delivered,
                    failed: result.failed,
                };
                // The per-recipient counts stand even when the summary cannot be delivered.
                match self
                    .reply(actor, &Content::text(result.summary()), None)
                    .await
                {
                    Ok(_) => report.delivered += 1,
                    Err(error) => {
                        report.failed += 1;
                        tracing::warn!(error = %error, "broadcast summary delivery failed");
                    }
                }
                Ok(report)
            }
        }
    }

    /// Replies to the acting participant, retrying up to the configured number of extra attempts.
    async fn reply(
        &self,
        actor: ActorId,
        content: &Content,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageRef, DeliveryError> {
        let mut attempt = 0;
        loop {
            match send_with_timeout(
                self.gateway.as_ref(),
                actor,
                content,
                keyboard,
                self.delivery_timeout,
            )
            .await
            {
                Ok(message) => return Ok(message),
                Err(error) if attempt < self.retry_attempts => {
                    attempt += 1;
                    tracing::debug!(attempt, error = %error, "retrying reply delivery");
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn bounded<F>(&self, recipient: ActorId, call: F) -> Result<(), DeliveryError>
    where
        F: std::future::Future<Output = Result<(), DeliveryError>>,
    {
        match tokio::time::timeout(self.delivery_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout {
                recipient,
                timeout_ms: self.delivery_timeout.as_millis() as u64,
            }),
        }
    }
}
