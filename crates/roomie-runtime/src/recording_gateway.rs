//! In-process gateway that records every call. Used by tests and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use roomie_bot::{Content, DeliveryError, Keyboard, MessageRef, MessagingGateway};
use roomie_types::ActorId;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Send {
        recipient: ActorId,
        content: Content,
        keyboard: Option<Keyboard>,
        message: MessageRef,
    },
    Edit {
        recipient: ActorId,
        message: MessageRef,
        content: Content,
        keyboard: Option<Keyboard>,
    },
    Delete {
        recipient: ActorId,
        message: MessageRef,
    },
}

impl GatewayCall {
    pub fn recipient(&self) -> ActorId {
        match self {
            Self::Send { recipient, .. }
            | Self::Edit { recipient, .. }
            | Self::Delete { recipient, .. } => *recipient,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailurePlan {
    Always,
    Times(usize),
}

/// Records successful calls and fails on demand for chosen recipients.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    calls: Mutex<Vec<GatewayCall>>,
    failures: Mutex<HashMap<ActorId, FailurePlan>>,
    attempts: Mutex<HashMap<ActorId, usize>>,
    next_message: AtomicU64,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call addressed to `recipient` fails until [`RecordingGateway::heal`].
    pub async fn fail_for(&self, recipient: ActorId) {
        self.failures
            .lock()
            .await
            .insert(recipient, FailurePlan::Always);
    }

    /// The next `times` calls addressed to `recipient` fail.
    pub async fn fail_times(&self, recipient: ActorId, times: usize) {
        self.failures
            .lock()
            .await
            .insert(recipient, FailurePlan::Times(times));
    }

    pub async fn heal(&self, recipient: ActorId) {
        self.failures.lock().await.remove(&recipient);
    }

    pub async fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().await.clone()
    }

    /// Content successfully sent to `recipient`, in delivery order.
    pub async fn sent_to(&self, recipient: ActorId) -> Vec<Content> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                GatewayCall::Send {
                    recipient: to,
                    content,
                    ..
                } if *to == recipient => Some(content.clone()),
                _ => None,
            })
            .collect()
    }

    /// Calls attempted for `recipient`, including failed ones.
    pub async fn attempts(&self, recipient: ActorId) -> usize {
        self.attempts
            .lock()
            .await
            .get(&recipient)
            .copied()
            .unwrap_or_default()
    }

    async fn check(&self, recipient: ActorId) -> Result<(), DeliveryError> {
        *self.attempts.lock().await.entry(recipient).or_default() += 1;
        let mut failures = self.failures.lock().await;
        match failures.get_mut(&recipient) {
            Some(FailurePlan::Always) => Err(DeliveryError::Unreachable(recipient)),
            Some(FailurePlan::Times(remaining)) => {
                *remaining -= 1;
                if *remaining == 0 {
                    failures.remove(&recipient);
                }
                Err(DeliveryError::Unreachable(recipient))
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    async fn send_content(
        &self,
        recipient: ActorId,
        content: &Content,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageRef, DeliveryError> {
        self.check(recipient).await?;
        let id = self.next_message.fetch_add(1, Ordering::Relaxed) + 1;
        let message = MessageRef::new(format!("msg-{id}"));
        self.calls.lock().await.push(GatewayCall::Send {
            recipient,
            content: content.clone(),
            keyboard: keyboard.cloned(),
            message: message.clone(),
        });
        Ok(message)
    }

    async fn edit_content(
        &self,
        recipient: ActorId,
        message: &MessageRef,
        content: &Content,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), DeliveryError> {
        self.check(recipient).await?;
        self.calls.lock().await.push(GatewayCall::Edit {
            recipient,
            message: message.clone(),
            content: content.clone(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn delete_content(
        &self,
        recipient: ActorId,
        message: &MessageRef,
    ) -> Result<(), DeliveryError> {
        self.check(recipient).await?;
        self.calls.lock().await.push(GatewayCall::Delete {
            recipient,
            message: message.clone(),
        });
        Ok(())
    }
}
