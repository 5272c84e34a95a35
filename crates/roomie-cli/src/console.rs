//! Line-oriented console transport.
//!
//! Input lines name the actor first, optionally followed by `@handle`:
//!
//! ```text
//! 42@alex /start          text or command
//! 42 !photo file-17 hi    media reference with optional caption
//! 42 #like                button press by payload
//! 100 #process:3 msg-9    button press on a delivered message
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use roomie_bot::{
    Content, DeliveryError, EventKind, InboundEvent, Keyboard, MessageRef, MessagingGateway,
};
use roomie_types::{ActorId, MediaRef};
use thiserror::Error;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsoleParseError {
    #[error("expected '<actor-id>[@handle] <message>'")]
    MissingBody,
    #[error("invalid actor id '{0}'")]
    InvalidActor(String),
    #[error("'!photo' requires a media reference")]
    MissingMedia,
    #[error("'#' requires a payload")]
    MissingPayload,
}

/// Parses one input line. Blank lines and `//` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<InboundEvent>, ConsoleParseError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with("//") {
        return Ok(None);
    }
    let (head, body) = line
        .split_once(char::is_whitespace)
        .ok_or(ConsoleParseError::MissingBody)?;
    let body = body.trim();
    if body.is_empty() {
        return Err(ConsoleParseError::MissingBody);
    }
    let (actor, handle) = match head.split_once('@') {
        Some((actor, handle)) => (actor, Some(handle)),
        None => (head, None),
    };
    let actor = actor
        .parse::<i64>()
        .map(ActorId)
        .map_err(|_| ConsoleParseError::InvalidActor(actor.to_string()))?;

    let kind = if let Some(rest) = body.strip_prefix("!photo") {
        let mut parts = rest.trim().splitn(2, char::is_whitespace);
        let media = parts
            .next()
            .filter(|media| !media.is_empty())
            .ok_or(ConsoleParseError::MissingMedia)?;
        EventKind::Media {
            media: MediaRef::new(media),
            caption: parts.next().map(|caption| caption.trim().to_string()),
        }
    } else if let Some(rest) = body.strip_prefix('#') {
        let mut parts = rest.split_whitespace();
        let payload = parts.next().ok_or(ConsoleParseError::MissingPayload)?;
        EventKind::Selection {
            payload: payload.to_string(),
            origin: parts.next().map(MessageRef::new),
        }
    } else {
        EventKind::Text(body.to_string())
    };

    let event = InboundEvent {
        actor,
        handle: None,
        kind,
    };
    Ok(Some(match handle.filter(|handle| !handle.is_empty()) {
        Some(handle) => event.with_handle(handle),
        None => event,
    }))
}

/// Renders a delivered message and its keyboard as console text.
pub fn render(
    header: &str,
    content: &Content,
    keyboard: Option<&Keyboard>,
) -> String {
    let mut out = match content {
        Content::Text(text) => format!("{header} {text}"),
        Content::Media { media, caption } => {
            format!("{header} [photo {}] {caption}", media.as_str())
        }
    };
    for row in keyboard.map(Keyboard::rows).unwrap_or_default() {
        let buttons: Vec<String> = row
            .iter()
            .map(|button| match &button.payload {
                Some(payload) => format!("[{}] #{payload}", button.label),
                None => format!("[{}]", button.label),
            })
            .collect();
        out.push_str("\n    ");
        out.push_str(&buttons.join("  "));
    }
    out
}

pub struct ConsoleGateway {
    stdout: Mutex<Stdout>,
    next_message: AtomicU64,
}

impl ConsoleGateway {
    pub fn new() -> Self {
        Self {
            stdout: Mutex::new(tokio::io::stdout()),
            next_message: AtomicU64::new(0),
        }
    }

    async fn write(&self, text: String) -> Result<(), DeliveryError> {
        let mut stdout = self.stdout.lock().await;
        stdout
            .write_all(format!("{text}\n").as_bytes())
            .await
            .map_err(|error| DeliveryError::Rejected(error.to_string()))?;
        stdout
            .flush()
            .await
            .map_err(|error| DeliveryError::Rejected(error.to_string()))
    }
}

impl Default for ConsoleGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessagingGateway for ConsoleGateway {
    async fn send_content(
        &self,
        recipient: ActorId,
        content: &Content,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageRef, DeliveryError> {
        let id = self.next_message.fetch_add(1, Ordering::Relaxed) + 1;
        let message = MessageRef::new(format!("msg-{id}"));
        self.write(render(
            &format!("-> {recipient} ({}):", message.as_str()),
            content,
            keyboard,
        ))
        .await?;
        Ok(message)
    }

    async fn edit_content(
        &self,
        recipient: ActorId,
        message: &MessageRef,
        content: &Content,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), DeliveryError> {
        self.write(render(
            &format!("~> {recipient} (edit {}):", message.as_str()),
            content,
            keyboard,
        ))
        .await
    }

    async fn delete_content(
        &self,
        recipient: ActorId,
        message: &MessageRef,
    ) -> Result<(), DeliveryError> {
        self.write(format!("x> {recipient} (deleted {})", message.as_str()))
            .await
    }
}
