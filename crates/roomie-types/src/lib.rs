//! Shared data types for the roomie matching and support bot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error returned when a ticket status transition is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusTransitionError {
    #[error("invalid {kind} transition: {from:?} -> {to:?}")]
    Invalid {
        kind: &'static str,
        from: String,
        to: String,
    },
}

/// Error returned when a persisted or user-supplied token does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariantError {
    pub kind: &'static str,
    pub value: String,
}

/// Stable external identifier of a user or administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub i64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle to a media asset held by the messaging gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaRef(pub String);

impl MediaRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Gender options offered at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub const ALL: [Gender; 2] = [Gender::Male, Gender::Female];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }

    /// Display label shown on the gender keyboard. Registration input must match it exactly.
    pub fn label(self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
        }
    }

    /// Parses an exact keyboard label.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|gender| gender.label() == label)
    }

    pub fn parse(raw: &str) -> Result<Self, UnknownVariantError> {
        Self::ALL
            .into_iter()
            .find(|gender| gender.as_str() == raw)
            .ok_or_else(|| UnknownVariantError {
                kind: "gender",
                value: raw.to_string(),
            })
    }
}

/// Which genders a requester is shown while browsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenderFilter {
    Any,
    Only(Gender),
    Except(Gender),
}

impl GenderFilter {
    pub fn matches(self, gender: Gender) -> bool {
        match self {
            Self::Any => true,
            Self::Only(expected) => gender == expected,
            Self::Except(excluded) => gender != excluded,
        }
    }
}

/// Candidate listing filter: never includes `requester`, nor anyone `requester` already liked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateFilter {
    pub requester: ActorId,
    pub gender: GenderFilter,
}

/// One registered participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub actor_id: ActorId,
    pub name: String,
    pub age: u8,
    pub gender: Gender,
    pub affiliation: String,
    pub description: Option<String>,
    pub photo: MediaRef,
    pub created_at: DateTime<Utc>,
}

/// Fields collected by the registration dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProfile {
    pub actor_id: ActorId,
    pub name: String,
    pub age: u8,
    pub gender: Gender,
    pub affiliation: String,
    pub description: Option<String>,
    pub photo: MediaRef,
}

impl NewProfile {
    pub fn into_profile(self, created_at: DateTime<Utc>) -> Profile {
        Profile {
            actor_id: self.actor_id,
            name: self.name,
            age: self.age,
            gender: self.gender,
            affiliation: self.affiliation,
            description: self.description,
            photo: self.photo,
            created_at,
        }
    }
}

/// Single-field profile mutation issued by the edit sub-dialogs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileUpdate {
    Photo(MediaRef),
    Description(Option<String>),
}

impl ProfileUpdate {
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Photo(_) => "photo",
            Self::Description(_) => "description",
        }
    }

    pub fn apply(self, profile: &mut Profile) {
        match self {
            Self::Photo(photo) => profile.photo = photo,
            Self::Description(description) => profile.description = description,
        }
    }
}

/// Directed "from liked to" relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LikeEdge {
    pub from: ActorId,
    pub to: ActorId,
}

/// Support ticket identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub i64);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state for a support ticket. Deletion removes the record instead of setting a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Open,
    Processed,
    Deferred,
}

impl TicketStatus {
    /// Statuses visible in the default "active" listing.
    pub const ACTIVE: [TicketStatus; 2] = [TicketStatus::Open, TicketStatus::Deferred];

    /// Returns true when this status can transition to `next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return true;
        }

        matches!(
            (self, next),
            (Self::Open, Self::Processed)
                | (Self::Open, Self::Deferred)
                | (Self::Deferred, Self::Processed)
        )
    }

    /// Returns an error if transitioning to `next` is not allowed.
    pub fn ensure_transition(self, next: Self) -> Result<(), StatusTransitionError> {
        if self.can_transition_to(next) {
            return Ok(());
        }

        Err(StatusTransitionError::Invalid {
            kind: "ticket_status",
            from: format!("{self:?}"),
            to: format!("{next:?}"),
        })
    }

    /// Persisted integer code.
    pub fn code(self) -> i64 {
        match self {
            Self::Open => 0,
            Self::Processed => 1,
            Self::Deferred => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Open),
            1 => Some(Self::Processed),
            2 => Some(Self::Deferred),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Processed => "processed",
            Self::Deferred => "deferred",
        }
    }
}

/// Topic of a support ticket. Immutable once the ticket exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCategory {
    TechnicalProblem,
    ProfileError,
    UserBlock,
    SuggestionsIdeas,
    GeneralQuestion,
}

impl ReasonCategory {
    pub const ALL: [ReasonCategory; 5] = [
        ReasonCategory::TechnicalProblem,
        ReasonCategory::ProfileError,
        ReasonCategory::UserBlock,
        ReasonCategory::SuggestionsIdeas,
        ReasonCategory::GeneralQuestion,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TechnicalProblem => "technical_problem",
            Self::ProfileError => "profile_error",
            Self::UserBlock => "user_block",
            Self::SuggestionsIdeas => "suggestions_ideas",
            Self::GeneralQuestion => "general_question",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::TechnicalProblem => "Technical problem",
            Self::ProfileError => "Profile error",
            Self::UserBlock => "User block",
            Self::SuggestionsIdeas => "Suggestions / ideas",
            Self::GeneralQuestion => "General question",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, UnknownVariantError> {
        Self::ALL
            .into_iter()
            .find(|reason| reason.as_str() == raw)
            .ok_or_else(|| UnknownVariantError {
                kind: "reason category",
                value: raw.to_string(),
            })
    }
}

/// One support request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportTicket {
    pub id: TicketId,
    pub requester: ActorId,
    pub requester_handle: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub status: TicketStatus,
    pub reason: ReasonCategory,
    pub assigned_admin: Option<ActorId>,
}

/// Fields supplied when a ticket is created. New tickets always start `Open`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicket {
    pub requester: ActorId,
    pub requester_handle: String,
    pub body: String,
    pub reason: ReasonCategory,
    pub assigned_admin: Option<ActorId>,
}

impl NewTicket {
    pub fn into_ticket(self, id: TicketId, created_at: DateTime<Utc>) -> SupportTicket {
        SupportTicket {
            id,
            requester: self.requester,
            requester_handle: self.requester_handle,
            body: self.body,
            created_at,
            status: TicketStatus::Open,
            reason: self.reason,
            assigned_admin: self.assigned_admin,
        }
    }
}

/// Filter used when listing tickets. `None` fields do not constrain the result.
///
/// Results are always ordered newest first, ties broken by descending id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketQuery {
    pub assigned_admin: Option<ActorId>,
    pub reasons: Option<Vec<ReasonCategory>>,
    pub statuses: Option<Vec<TicketStatus>>,
}

impl TicketQuery {
    pub fn matches(&self, ticket: &SupportTicket) -> bool {
        self.assigned_admin
            .is_none_or(|admin| ticket.assigned_admin == Some(admin))
            && self
                .reasons
                .as_ref()
                .is_none_or(|reasons| reasons.contains(&ticket.reason))
            && self
                .statuses
                .as_ref()
                .is_none_or(|statuses| statuses.contains(&ticket.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ticket(status: TicketStatus, reason: ReasonCategory) -> SupportTicket {
        SupportTicket {
            id: TicketId(1),
            requester: ActorId(10),
            requester_handle: "@tenant".to_string(),
            body: "cannot upload photo".to_string(),
            created_at: Utc::now(),
            status,
            reason,
            assigned_admin: Some(ActorId(99)),
        }
    }

    #[test]
    fn unit_ticket_transitions_forbid_reopening() {
        assert!(TicketStatus::Open.can_transition_to(TicketStatus::Processed));
        assert!(TicketStatus::Open.can_transition_to(TicketStatus::Deferred));
        assert!(TicketStatus::Deferred.can_transition_to(TicketStatus::Processed));
        assert!(!TicketStatus::Processed.can_transition_to(TicketStatus::Open));
        assert!(!TicketStatus::Processed.can_transition_to(TicketStatus::Deferred));
        assert!(!TicketStatus::Deferred.can_transition_to(TicketStatus::Open));
        assert!(TicketStatus::Processed
            .ensure_transition(TicketStatus::Deferred)
            .is_err());
    }

    #[test]
    fn unit_ticket_status_codes_match_persisted_values() {
        for status in [
            TicketStatus::Open,
            TicketStatus::Processed,
            TicketStatus::Deferred,
        ] {
            assert_eq!(TicketStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(TicketStatus::Processed.code(), 1);
        assert_eq!(TicketStatus::from_code(7), None);
    }

    #[test]
    fn unit_gender_labels_require_exact_match() {
        assert_eq!(Gender::from_label("Female"), Some(Gender::Female));
        assert_eq!(Gender::from_label("female "), None);
        assert_eq!(Gender::from_label("FEMALE"), None);
        assert!(GenderFilter::Except(Gender::Male).matches(Gender::Female));
        assert!(!GenderFilter::Only(Gender::Male).matches(Gender::Female));
    }

    #[test]
    fn functional_ticket_query_combines_filters() {
        let ticket = sample_ticket(TicketStatus::Deferred, ReasonCategory::UserBlock);
        let active = TicketQuery {
            statuses: Some(TicketStatus::ACTIVE.to_vec()),
            ..TicketQuery::default()
        };
        assert!(active.matches(&ticket));

        let other_admin = TicketQuery {
            assigned_admin: Some(ActorId(5)),
            ..TicketQuery::default()
        };
        assert!(!other_admin.matches(&ticket));

        let wrong_reason = TicketQuery {
            reasons: Some(vec![ReasonCategory::GeneralQuestion]),
            ..TicketQuery::default()
        };
        assert!(!wrong_reason.matches(&ticket));
    }

    #[test]
    fn regression_reason_category_serializes_as_snake_case() {
        let encoded = serde_json::to_string(&ReasonCategory::SuggestionsIdeas).expect("encode");
        assert_eq!(encoded, "\"suggestions_ideas\"");
        assert_eq!(
            ReasonCategory::parse("user_block").expect("parse"),
            ReasonCategory::UserBlock
        );
        assert!(ReasonCategory::parse("spam").is_err());
    }
}
