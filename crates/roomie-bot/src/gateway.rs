//! Messaging gateway boundary.

use std::time::Duration;

use async_trait::async_trait;
use roomie_types::ActorId;
use thiserror::Error;

use crate::intents::{Content, Keyboard};

/// Gateway-assigned reference to a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageRef(pub String);

impl MessageRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("recipient {0} is unreachable")]
    Unreachable(ActorId),
    #[error("delivery to {recipient} timed out after {timeout_ms}ms")]
    Timeout { recipient: ActorId, timeout_ms: u64 },
    #[error("gateway rejected the request: {0}")]
    Rejected(String),
}

/// Outbound transport. Every call may fail independently of the others.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send_content(
        &self,
        recipient: ActorId,
        content: &Content,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageRef, DeliveryError>;

    async fn edit_content(
        &self,
        recipient: ActorId,
        message: &MessageRef,
        content: &Content,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), DeliveryError>;

    async fn delete_content(
        &self,
        recipient: ActorId,
        message: &MessageRef,
    ) -> Result<(), DeliveryError>;
}

/// Sends one message, mapping an elapsed `timeout` to [`DeliveryError::Timeout`].
pub async fn send_with_timeout(
    gateway: &dyn MessagingGateway,
    recipient: ActorId,
    content: &Content,
    keyboard: Option<&Keyboard>,
    timeout: Duration,
) -> Result<MessageRef, DeliveryError> {
    match tokio::time::timeout(timeout, gateway.send_content(recipient, content, keyboard)).await {
        Ok(result) => result,
        Err(_) => Err(DeliveryError::Timeout {
            recipient,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
