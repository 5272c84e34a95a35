//! Form dialogs: registration, single-field profile edits and support intake.
//!
//! [`step`] is pure. It reads the current [`SessionState`] and one inbound
//! event and decides the next state, a re-prompt, or a completed form. Durable
//! writes for a completed form are performed by the caller.

use roomie_types::{ActorId, Gender, MediaRef, NewProfile, ReasonCategory};

use crate::bot_config::ProfileLimits;
use crate::errors::ValidationError;
use crate::events::{Action, EventKind};
use crate::intents::{Intent, Keyboard};
use crate::session_store::{DraftField, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStep {
    Name,
    Age,
    Gender,
    Affiliation,
    Description,
    Media,
}

/// Current dialog of one actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialogState {
    #[default]
    Idle,
    Registration(RegistrationStep),
    AwaitingReplacementPhoto,
    AwaitingReplacementDescription,
    AwaitingReasonSelection,
    AwaitingSupportText,
    Browsing,
    AwaitingTicketAnswer(roomie_types::TicketId),
    ComposingBroadcast,
    ConfirmingBroadcast,
    ConfirmingTicketClear,
}

impl DialogState {
    /// Form dialogs own every non-command input until they complete.
    pub fn is_form(self) -> bool {
        matches!(
            self,
            Self::Registration(_)
                | Self::AwaitingReplacementPhoto
                | Self::AwaitingReplacementDescription
                | Self::AwaitingReasonSelection
                | Self::AwaitingSupportText
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Registration(RegistrationStep::Name) => "awaiting_name",
            Self::Registration(RegistrationStep::Age) => "awaiting_age",
            Self::Registration(RegistrationStep::Gender) => "awaiting_gender",
            Self::Registration(RegistrationStep::Affiliation) => "awaiting_affiliation",
            Self::Registration(RegistrationStep::Description) => "awaiting_description",
            Self::Registration(RegistrationStep::Media) => "awaiting_media",
            Self::AwaitingReplacementPhoto => "awaiting_replacement_photo",
            Self::AwaitingReplacementDescription => "awaiting_replacement_description",
            Self::AwaitingReasonSelection => "awaiting_reason_selection",
            Self::AwaitingSupportText => "awaiting_support_text",
            Self::Browsing => "browsing",
            Self::AwaitingTicketAnswer(_) => "awaiting_ticket_answer",
            Self::ComposingBroadcast => "composing_broadcast",
            Self::ConfirmingBroadcast => "confirming_broadcast",
            Self::ConfirmingTicketClear => "confirming_ticket_clear",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogLimits {
    pub profile: ProfileLimits,
    pub support_body_max_chars: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    Name,
    Age,
    Gender,
    Affiliation,
    Description,
    Photo,
    ReplacementPhoto,
    ReplacementDescription,
    Reason,
    SupportText,
}

impl Prompt {
    pub fn text(self, limits: &DialogLimits) -> String {
        match self {
            Self::Name => "What is your name?".to_string(),
            Self::Age => format!(
                "How old are you? ({}-{})",
                limits.profile.min_age, limits.profile.max_age
            ),
            Self::Gender => "Choose your gender.".to_string(),
            Self::Affiliation => "Which university or workplace are you from?".to_string(),
            Self::Description => format!(
                "Tell others about yourself (up to {} characters), or send \"{}\".",
                limits.profile.description_max_chars, limits.profile.skip_token
            ),
            Self::Photo => "Send a photo for your profile.".to_string(),
            Self::ReplacementPhoto => "Send the new photo.".to_string(),
            Self::ReplacementDescription => format!(
                "Send the new description, or \"{}\" to clear it.",
                limits.profile.skip_token
            ),
            Self::Reason => "What is your request about?".to_string(),
            Self::SupportText => "Describe the problem in one message.".to_string(),
        }
    }

    pub fn keyboard(self, limits: &DialogLimits) -> Keyboard {
        match self {
            Self::Gender => Keyboard::GenderChoice,
            Self::Description | Self::ReplacementDescription => {
                Keyboard::SkipDescription(limits.profile.skip_token.clone())
            }
            Self::Reason => Keyboard::SupportReasons,
            _ => Keyboard::Remove,
        }
    }

    pub fn intent(self, limits: &DialogLimits) -> Intent {
        Intent::reply_with(self.text(limits), self.keyboard(limits))
    }

    /// Re-prompt carrying the validation failure ahead of the question.
    pub fn retry_intent(self, error: &ValidationError, limits: &DialogLimits) -> Intent {
        let error = crate::errors::CoreError::from(error.clone()).user_message();
        Intent::reply_with(
            format!("{error}.\n{}", self.text(limits)),
            self.keyboard(limits),
        )
    }
}

/// Fields of a finished registration form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationForm {
    pub name: String,
    pub age: u8,
    pub gender: Gender,
    pub affiliation: String,
    pub description: Option<String>,
    pub photo: MediaRef,
}

impl RegistrationForm {
    pub fn into_new_profile(self, actor: ActorId) -> NewProfile {
        NewProfile {
            actor_id: actor,
            name: self.name,
            age: self.age,
            gender: self.gender,
            affiliation: self.affiliation,
            description: self.description,
            photo: self.photo,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Registration(RegistrationForm),
    ReplacePhoto(MediaRef),
    ReplaceDescription(Option<String>),
    SupportTicket { reason: ReasonCategory, body: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Advance { next: SessionState, prompt: Prompt },
    /// Input rejected; the session stays as it was.
    Reject { error: ValidationError, prompt: Prompt },
    Complete(Completion),
    Cancelled,
    /// Session lost a field it should hold; the caller resets the dialog.
    Corrupt { missing: DraftField },
}

pub fn begin_registration() -> (SessionState, Prompt) {
    (
        SessionState::in_dialog(DialogState::Registration(RegistrationStep::Name)),
        Prompt::Name,
    )
}

pub fn begin_support_intake() -> (SessionState, Prompt) {
    (
        SessionState::in_dialog(DialogState::AwaitingReasonSelection),
        Prompt::Reason,
    )
}

/// Advances a form dialog. Returns `None` when the session is not in a form dialog.
pub fn step(session: &SessionState, event: &EventKind, limits: &DialogLimits) -> Option<Transition> {
    let transition = match session.dialog {
        DialogState::Registration(step) => registration_step(session, step, event, limits),
        DialogState::AwaitingReplacementPhoto => match event {
            EventKind::Media { media, .. } => {
                Transition::Complete(Completion::ReplacePhoto(media.clone()))
            }
            _ => reject(ValidationError::MissingMedia, Prompt::ReplacementPhoto),
        },
        DialogState::AwaitingReplacementDescription => {
            match description_input(event, &limits.profile) {
                Ok(description) => {
                    Transition::Complete(Completion::ReplaceDescription(description))
                }
                Err(error) => reject(error, Prompt::ReplacementDescription),
            }
        }
        DialogState::AwaitingReasonSelection => match event {
            EventKind::Selection { payload, .. } => match Action::parse(payload) {
                Some(Action::SupportReason(reason)) => advance(
                    session,
                    DialogState::AwaitingSupportText,
                    Some((DraftField::Reason, reason.as_str().to_string())),
                    Prompt::SupportText,
                ),
                Some(Action::CancelSupport) => Transition::Cancelled,
                _ => reject(ValidationError::ExpectedSelection, Prompt::Reason),
            },
            _ => reject(ValidationError::ExpectedSelection, Prompt::Reason),
        },
        DialogState::AwaitingSupportText => support_text_step(session, event, limits),
        _ => return None,
    };
    Some(transition)
}

fn registration_step(
    session: &SessionState,
    step: RegistrationStep,
    event: &EventKind,
    limits: &DialogLimits,
) -> Transition {
    let profile = &limits.profile;
    match step {
        RegistrationStep::Name => match bounded_text(event, "name", profile.name_max_chars) {
            Ok(name) => advance(
                session,
                DialogState::Registration(RegistrationStep::Age),
                Some((DraftField::Name, name)),
                Prompt::Age,
            ),
            Err(error) => reject(error, Prompt::Name),
        },
        RegistrationStep::Age => match age_input(event, profile) {
            Ok(age) => advance(
                session,
                DialogState::Registration(RegistrationStep::Gender),
                Some((DraftField::Age, age.to_string())),
                Prompt::Gender,
            ),
            Err(error) => reject(error, Prompt::Age),
        },
        RegistrationStep::Gender => match gender_input(event) {
            Ok(gender) => advance(
                session,
                DialogState::Registration(RegistrationStep::Affiliation),
                Some((DraftField::Gender, gender.as_str().to_string())),
                Prompt::Affiliation,
            ),
            Err(error) => reject(error, Prompt::Gender),
        },
        RegistrationStep::Affiliation => {
            match bounded_text(event, "affiliation", profile.affiliation_max_chars) {
                Ok(affiliation) => advance(
                    session,
                    DialogState::Registration(RegistrationStep::Description),
                    Some((DraftField::Affiliation, affiliation)),
                    Prompt::Description,
                ),
                Err(error) => reject(error, Prompt::Affiliation),
            }
        }
        RegistrationStep::Description => match description_input(event, profile) {
            Ok(description) => advance(
                session,
                DialogState::Registration(RegistrationStep::Media),
                Some((DraftField::Description, description.unwrap_or_default())),
                Prompt::Photo,
            ),
            Err(error) => reject(error, Prompt::Description),
        },
        RegistrationStep::Media => match event {
            EventKind::Media { media, .. } => match registration_form(session, media.clone()) {
                Ok(form) => Transition::Complete(Completion::Registration(form)),
                Err(missing) => Transition::Corrupt { missing },
            },
            _ => reject(ValidationError::MissingMedia, Prompt::Photo),
        },
    }
}

fn support_text_step(session: &SessionState, event: &EventKind, limits: &DialogLimits) -> Transition {
    let body = match bounded_text(event, "request", limits.support_body_max_chars) {
        Ok(body) => body,
        Err(error) => return reject(error, Prompt::SupportText),
    };
    let reason = session
        .field(DraftField::Reason)
        .and_then(|raw| ReasonCategory::parse(raw).ok());
    match reason {
        Some(reason) => Transition::Complete(Completion::SupportTicket { reason, body }),
        None => Transition::Corrupt {
            missing: DraftField::Reason,
        },
    }
}

fn advance(
    session: &SessionState,
    dialog: DialogState,
    field: Option<(DraftField, String)>,
    prompt: Prompt,
) -> Transition {
    let mut next = session.clone();
    next.dialog = dialog;
    if let Some((field, value)) = field {
        next.fields.insert(field, value);
    }
    Transition::Advance { next, prompt }
}

fn reject(error: ValidationError, prompt: Prompt) -> Transition {
    Transition::Reject { error, prompt }
}

fn text_of(event: &EventKind) -> Result<&str, ValidationError> {
    match event {
        EventKind::Text(text) => Ok(text.trim()),
        _ => Err(ValidationError::ExpectedText),
    }
}

fn bounded_text(event: &EventKind, field: &'static str, max: usize) -> Result<String, ValidationError> {
    let text = text_of(event)?;
    if text.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if text.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(text.to_string())
}

fn age_input(event: &EventKind, limits: &ProfileLimits) -> Result<u8, ValidationError> {
    let text = text_of(event)?;
    if text.is_empty() || !text.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ValidationError::NotANumber);
    }
    let out_of_range = ValidationError::AgeOutOfRange {
        min: limits.min_age,
        max: limits.max_age,
    };
    // All-digit strings only fail to parse on overflow.
    let age: u32 = text.parse().map_err(|_| out_of_range.clone())?;
    if age < u32::from(limits.min_age) || age > u32::from(limits.max_age) {
        return Err(out_of_range);
    }
    u8::try_from(age).map_err(|_| out_of_range)
}

fn gender_input(event: &EventKind) -> Result<Gender, ValidationError> {
    match event {
        EventKind::Text(text) => Gender::from_label(text).ok_or(ValidationError::UnknownGender),
        _ => Err(ValidationError::UnknownGender),
    }
}

/// `Ok(None)` when the participant sent the skip token.
fn description_input(
    event: &EventKind,
    limits: &ProfileLimits,
) -> Result<Option<String>, ValidationError> {
    let text = text_of(event)?;
    if text.eq_ignore_ascii_case(limits.skip_token.trim()) {
        return Ok(None);
    }
    if text.is_empty() {
        return Err(ValidationError::Empty {
            field: "description",
        });
    }
    if text.chars().count() > limits.description_max_chars {
        return Err(ValidationError::TooLong {
            field: "description",
            max: limits.description_max_chars,
        });
    }
    Ok(Some(text.to_string()))
}

fn registration_form(session: &SessionState, photo: MediaRef) -> Result<RegistrationForm, DraftField> {
    let require = |field: DraftField| session.field(field).ok_or(field);
    let name = require(DraftField::Name)?.to_string();
    let age = require(DraftField::Age)?
        .parse::<u8>()
        .map_err(|_| DraftField::Age)?;
    let gender = Gender::parse(require(DraftField::Gender)?).map_err(|_| DraftField::Gender)?;
    let affiliation = require(DraftField::Affiliation)?.to_string();
    let description = require(DraftField::Description)?;
    Ok(RegistrationForm {
        name,
        age,
        gender,
        affiliation,
        description: (!description.is_empty()).then(|| description.to_string()),
        photo,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> DialogLimits {
        DialogLimits {
            profile: ProfileLimits::default(),
            support_body_max_chars: 40,
        }
    }

    fn text(raw: &str) -> EventKind {
        EventKind::Text(raw.to_string())
    }

    fn media(raw: &str) -> EventKind {
        EventKind::Media {
            media: MediaRef::new(raw),
            caption: None,
        }
    }

    fn select(action: Action) -> EventKind {
        EventKind::Selection {
            payload: action.payload(),
            origin: None,
        }
    }

    fn expect_advance(transition: Option<Transition>) -> (SessionState, Prompt) {
        match transition {
            Some(Transition::Advance { next, prompt }) => (next, prompt),
            other => panic!("expected advance, got {other:?}"),
        }
    }

    #[test]
    fn functional_registration_walks_every_step_to_completion() {
        let limits = limits();
        let (session, prompt) = begin_registration();
        assert_eq!(prompt, Prompt::Name);

        let (session, prompt) = expect_advance(step(&session, &text(" Alex "), &limits));
        assert_eq!(prompt, Prompt::Age);
        let (session, _) = expect_advance(step(&session, &text("17"), &limits));
        let (session, prompt) = expect_advance(step(&session, &text("Male"), &limits));
        assert_eq!(prompt, Prompt::Affiliation);
        let (session, _) = expect_advance(step(&session, &text("State University"), &limits));
        let (session, prompt) = expect_advance(step(&session, &text("SKIP"), &limits));
        assert_eq!(prompt, Prompt::Photo);
        assert_eq!(
            session.dialog,
            DialogState::Registration(RegistrationStep::Media)
        );

        match step(&session, &media("photo-1"), &limits) {
            Some(Transition::Complete(Completion::Registration(form))) => {
                assert_eq!(form.name, "Alex");
                assert_eq!(form.age, 17);
                assert_eq!(form.gender, Gender::Male);
                assert_eq!(form.description, None);
                assert_eq!(form.photo, MediaRef::new("photo-1"));
            }
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn regression_age_outside_bounds_keeps_state_and_reprompts() {
        let limits = limits();
        let session = SessionState::in_dialog(DialogState::Registration(RegistrationStep::Age));
        for raw in ["5", "100", "99999999999", "-17", "seventeen", "17.5", ""] {
            match step(&session, &text(raw), &limits) {
                Some(Transition::Reject { prompt, .. }) => assert_eq!(prompt, Prompt::Age),
                other => panic!("input {raw:?} should be rejected, got {other:?}"),
            }
        }
        assert!(matches!(
            step(&session, &text("5"), &limits),
            Some(Transition::Reject {
                error: ValidationError::AgeOutOfRange { min: 16, max: 99 },
                ..
            })
        ));
        let (_, prompt) = expect_advance(step(&session, &text("99"), &limits));
        assert_eq!(prompt, Prompt::Gender);
    }

    #[test]
    fn unit_gender_requires_exact_label() {
        let limits = limits();
        let session = SessionState::in_dialog(DialogState::Registration(RegistrationStep::Gender));
        assert!(matches!(
            step(&session, &text("female"), &limits),
            Some(Transition::Reject {
                error: ValidationError::UnknownGender,
                ..
            })
        ));
        expect_advance(step(&session, &text("Female"), &limits));
    }

    #[test]
    fn unit_description_cap_and_media_requirement() {
        let limits = limits();
        let session =
            SessionState::in_dialog(DialogState::Registration(RegistrationStep::Description));
        let long = "x".repeat(501);
        assert!(matches!(
            step(&session, &text(&long), &limits),
            Some(Transition::Reject {
                error: ValidationError::TooLong { max: 500, .. },
                ..
            })
        ));

        let session = SessionState::in_dialog(DialogState::Registration(RegistrationStep::Media));
        assert!(matches!(
            step(&session, &text("here you go"), &limits),
            Some(Transition::Reject {
                error: ValidationError::MissingMedia,
                prompt: Prompt::Photo,
            })
        ));
    }

    #[test]
    fn regression_media_step_with_missing_fields_reports_corrupt_session() {
        let limits = limits();
        let session = SessionState::in_dialog(DialogState::Registration(RegistrationStep::Media));
        assert_eq!(
            step(&session, &media("p"), &limits),
            Some(Transition::Corrupt {
                missing: DraftField::Name
            })
        );
    }

    #[test]
    fn functional_support_intake_cancels_only_at_reason_step() {
        let limits = limits();
        let (session, prompt) = begin_support_intake();
        assert_eq!(prompt, Prompt::Reason);
        assert_eq!(
            step(&session, &select(Action::CancelSupport), &limits),
            Some(Transition::Cancelled)
        );
        assert!(matches!(
            step(&session, &text("help"), &limits),
            Some(Transition::Reject {
                error: ValidationError::ExpectedSelection,
                ..
            })
        ));

        let (session, prompt) = expect_advance(step(
            &session,
            &select(Action::SupportReason(ReasonCategory::UserBlock)),
            &limits,
        ));
        assert_eq!(prompt, Prompt::SupportText);
        assert!(matches!(
            step(&session, &select(Action::CancelSupport), &limits),
            Some(Transition::Reject { .. })
        ));
        assert!(matches!(
            step(&session, &text(&"y".repeat(41)), &limits),
            Some(Transition::Reject {
                error: ValidationError::TooLong { max: 40, .. },
                ..
            })
        ));
        assert_eq!(
            step(&session, &text("someone blocked me"), &limits),
            Some(Transition::Complete(Completion::SupportTicket {
                reason: ReasonCategory::UserBlock,
                body: "someone blocked me".to_string(),
            }))
        );
    }

    #[test]
    fn unit_replacement_dialogs_complete_in_one_step() {
        let limits = limits();
        let photo = SessionState::in_dialog(DialogState::AwaitingReplacementPhoto);
        assert_eq!(
            step(&photo, &media("new"), &limits),
            Some(Transition::Complete(Completion::ReplacePhoto(MediaRef::new(
                "new"
            ))))
        );
        let description = SessionState::in_dialog(DialogState::AwaitingReplacementDescription);
        assert_eq!(
            step(&description, &text("skip"), &limits),
            Some(Transition::Complete(Completion::ReplaceDescription(None)))
        );
        assert_eq!(step(&SessionState::default(), &text("hi"), &limits), None);
    }

    #[test]
    fn regression_dialog_limits_from_config_compare_by_value() {
        fn assert_total_eq<T: Eq>(_: &T) {}

        let config = crate::BotConfig::from_toml_str(
            "[profile]\nmin_age = 18\n[support]\nfallback_admin = 1\nbody_max_chars = 40\n",
        )
        .expect("config");
        let from_config = DialogLimits {
            profile: config.profile.clone(),
            support_body_max_chars: config.support.body_max_chars,
        };
        assert_total_eq(&from_config);
        assert_ne!(from_config, limits());
        assert_eq!(
            from_config,
            DialogLimits {
                profile: ProfileLimits {
                    min_age: 18,
                    ..ProfileLimits::default()
                },
                support_body_max_chars: 40,
            }
        );
    }
}
