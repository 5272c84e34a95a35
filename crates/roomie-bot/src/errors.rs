use roomie_store::StoreError;
use roomie_types::StatusTransitionError;
use thiserror::Error;

use crate::gateway::DeliveryError;

pub type CoreResult<T> = Result<T, CoreError>;

/// Malformed or out-of-range participant input. Always answered with a re-prompt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("please enter a number")]
    NotANumber,
    #[error("age must be between {min} and {max}")]
    AgeOutOfRange { min: u8, max: u8 },
    #[error("please choose one of the offered options")]
    UnknownGender,
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("please send a photo")]
    MissingMedia,
    #[error("please send a text message")]
    ExpectedText,
    #[error("please use the buttons below")]
    ExpectedSelection,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("out of sequence: {0}")]
    State(String),
    #[error("actor {0} is not allowed to perform this action")]
    Forbidden(roomie_types::ActorId),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("operation timed out after {0}ms")]
    Timeout(u64),
}

impl From<StatusTransitionError> for CoreError {
    fn from(error: StatusTransitionError) -> Self {
        Self::State(error.to_string())
    }
}

impl CoreError {
    /// True for errors answered inside the conversation; the rest reach the caller.
    pub fn is_handled_in_conversation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::NotFound(_)
                | Self::State(_)
                | Self::Forbidden(_)
        )
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(error) => capitalize(&error.to_string()),
            Self::NotFound(_) => "This is no longer available.".to_string(),
            Self::State(_) => "That action is not available right now, please try again.".to_string(),
            Self::Forbidden(_) => "This action is not available to you.".to_string(),
            Self::Delivery(_) => "The message could not be delivered.".to_string(),
            Self::Store(_) | Self::Timeout(_) => {
                "Something went wrong, please try again later.".to_string()
            }
        }
    }
}

fn capitalize(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomie_types::{ActorId, TicketStatus};

    #[test]
    fn unit_user_messages_hide_internal_details() {
        let store = CoreError::Store(StoreError::Unavailable("disk full".to_string()));
        assert!(!store.user_message().contains("disk"));
        assert!(!store.is_handled_in_conversation());

        let validation = CoreError::from(ValidationError::AgeOutOfRange { min: 16, max: 99 });
        assert_eq!(validation.user_message(), "Age must be between 16 and 99");
        assert!(validation.is_handled_in_conversation());
    }

    #[test]
    fn unit_status_transition_errors_map_to_state_errors() {
        let error: CoreError = TicketStatus::Processed
            .ensure_transition(TicketStatus::Deferred)
            .expect_err("invalid")
            .into();
        assert!(matches!(error, CoreError::State(_)));

        let delivery = CoreError::from(DeliveryError::Unreachable(ActorId(1)));
        assert!(!delivery.is_handled_in_conversation());
    }

    #[test]
    fn unit_conversation_errors_cover_user_facing_variants_only() {
        let handled = [
            CoreError::NotFound("ticket 1".to_string()),
            CoreError::State("no candidate".to_string()),
            CoreError::Forbidden(ActorId(9)),
        ];
        for error in &handled {
            assert!(error.is_handled_in_conversation(), "{error}");
        }
        assert!(!CoreError::Timeout(5_000).is_handled_in_conversation());
        assert_eq!(
            CoreError::Forbidden(ActorId(9)).user_message(),
            "This action is not available to you."
        );
    }
}
