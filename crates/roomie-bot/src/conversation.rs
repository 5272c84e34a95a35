//! Per-actor conversation engine.
//!
//! [`Conversation::handle`] takes one inbound event, consults the actor's
//! session and the record store, and returns the intents to deliver. The
//! session is written back only when handling succeeds; a failed event leaves
//! the previous session in place.

use std::sync::Arc;
use std::time::Duration;

use roomie_store::RecordStore;
use roomie_types::{ActorId, MediaRef, Profile, ProfileUpdate, ReasonCategory, TicketId};

use crate::bot_config::{BotConfig, ConfigError};
use crate::dialog_machine::{
    begin_registration, begin_support_intake, step, Completion, DialogLimits, DialogState,
    Prompt, Transition,
};
use crate::errors::{CoreError, CoreResult};
use crate::events::{Action, EventKind, InboundEvent};
use crate::gateway::{MessageRef, MessagingGateway};
use crate::intents::{profile_card, ticket_card, Content, Intent, Keyboard};
use crate::matching_engine::{Advance, BrowseMode, BrowseSession, MatchingEngine};
use crate::session_store::{DraftField, HandleBook, SessionState, SessionStore};
use crate::ticket_routing::TicketRouter;

const LIKED_YOU_NOTE: &str = "This person liked you.";

type Outcome = (SessionState, Vec<Intent>);

pub struct Conversation {
    store: Arc<dyn RecordStore>,
    gateway: Arc<dyn MessagingGateway>,
    sessions: SessionStore,
    handles: HandleBook,
    matching: MatchingEngine,
    tickets: TicketRouter,
    limits: DialogLimits,
    delivery_timeout: Duration,
    page_size: usize,
}

impl Conversation {
    pub fn new(
        config: &BotConfig,
        store: Arc<dyn RecordStore>,
        gateway: Arc<dyn MessagingGateway>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let roles = config.admin_roles()?;
        Ok(Self {
            matching: MatchingEngine::new(store.clone(), config.matching.preference),
            tickets: TicketRouter::new(store.clone(), roles),
            store,
            gateway,
            sessions: SessionStore::new(),
            handles: HandleBook::new(),
            limits: DialogLimits {
                profile: config.profile.clone(),
                support_body_max_chars: config.support.body_max_chars,
            },
            delivery_timeout: config.runtime.delivery_timeout(),
            page_size: config.support.page_size,
        })
    }

    pub fn tickets(&self) -> &TicketRouter {
        &self.tickets
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Handles one event. Validation, state, not-found and permission failures become
    /// replies; store and delivery failures are returned to the caller.
    #[tracing::instrument(skip(self, event), fields(actor_id = %event.actor, kind = event.kind_name()))]
    pub async fn handle(&self, event: InboundEvent) -> CoreResult<Vec<Intent>> {
        if let Some(handle) = event.handle.as_deref() {
            self.handles.remember(event.actor, handle).await;
        }
        let session = self.sessions.load(event.actor).await;
        let previous = session.dialog;

        match self.dispatch(&event, session).await {
            Ok((next, intents)) => {
                if next.dialog != previous {
                    tracing::debug!(from = previous.name(), to = next.dialog.name(), "dialog transition");
                }
                self.sessions.save(event.actor, next).await;
                Ok(intents)
            }
            Err(error) if error.is_handled_in_conversation() => {
                tracing::debug!(error = %error, dialog = previous.name(), "event rejected");
                Ok(vec![Intent::reply(error.user_message())])
            }
            Err(error) => {
                tracing::warn!(error = %error, dialog = previous.name(), "event failed");
                Err(error)
            }
        }
    }

    async fn dispatch(&self, event: &InboundEvent, session: SessionState) -> CoreResult<Outcome> {
        let actor = event.actor;

        // Slash commands reset whatever dialog is in progress.
        if let EventKind::Text(text) = &event.kind {
            if let Some(action) = Action::from_command(text) {
                return self.run_action(event, SessionState::default(), action).await;
            }
        }

        if session.dialog.is_form() {
            if let Some(transition) = step(&session, &event.kind, &self.limits) {
                return self.apply_transition(event, session, transition).await;
            }
        }

        match &event.kind {
            EventKind::Selection { payload, .. } => match Action::parse(payload) {
                Some(action) => self.run_action(event, session, action).await,
                None => {
                    tracing::debug!(payload = %payload, "unknown selection payload");
                    Err(CoreError::State(format!("unknown selection {payload}")))
                }
            },
            EventKind::Text(text) => self.free_text(actor, session, text).await,
            EventKind::Media { media, caption } => {
                self.free_media(actor, session, media, caption.as_deref()).await
            }
        }
    }

    async fn apply_transition(
        &self,
        event: &InboundEvent,
        session: SessionState,
        transition: Transition,
    ) -> CoreResult<Outcome> {
        match transition {
            Transition::Advance { next, prompt } => Ok((next, vec![prompt.intent(&self.limits)])),
            Transition::Reject { error, prompt } => {
                tracing::debug!(error = %error, "input rejected");
                Ok((session, vec![prompt.retry_intent(&error, &self.limits)]))
            }
            Transition::Cancelled => Ok((
                SessionState::default(),
                vec![Intent::reply_with("Request cancelled.", Keyboard::MainMenu)],
            )),
            Transition::Corrupt { missing } => {
                tracing::warn!(missing = ?missing, dialog = session.dialog.name(), "session missing draft field; restarting dialog");
                let (next, prompt) = match session.dialog {
                    DialogState::AwaitingSupportText => begin_support_intake(),
                    _ => begin_registration(),
                };
                Ok((
                    next,
                    vec![
                        Intent::reply("Sorry, we lost track of your answers. Let's start over."),
                        prompt.intent(&self.limits),
                    ],
                ))
            }
            Transition::Complete(completion) => self.complete(event, completion).await,
        }
    }

    async fn complete(&self, event: &InboundEvent, completion: Completion) -> CoreResult<Outcome> {
        let actor = event.actor;
        let done = SessionState::default();
        match completion {
            Completion::Registration(form) => {
                let profile = form.into_new_profile(actor);
                if !self.store.create_profile(profile).await? {
                    tracing::info!(actor_id = %actor, "registration ignored for existing profile");
                    return Ok((
                        done,
                        vec![Intent::reply_with(
                            "You are already registered.",
                            Keyboard::MainMenu,
                        )],
                    ));
                }
                tracing::info!(actor_id = %actor, "profile registered");
                Ok((
                    done,
                    vec![Intent::reply_with(
                        "Registration complete! Use the menu to start browsing.",
                        Keyboard::MainMenu,
                    )],
                ))
            }
            Completion::ReplacePhoto(photo) => {
                self.update_profile(actor, ProfileUpdate::Photo(photo)).await
            }
            Completion::ReplaceDescription(description) => {
                self.update_profile(actor, ProfileUpdate::Description(description))
                    .await
            }
            Completion::SupportTicket { reason, body } => {
                let handle = match event.handle.clone() {
                    Some(handle) => Some(handle),
                    None => self.handles.lookup(actor).await,
                };
                let handle = handle.map_or_else(|| format!("id{actor}"), |handle| format!("@{handle}"));
                let opened = self.tickets.open_ticket(actor, handle, reason, body).await?;
                Ok((done, opened.intents))
            }
        }
    }

    async fn update_profile(&self, actor: ActorId, update: ProfileUpdate) -> CoreResult<Outcome> {
        let field = update.field_name();
        if !self.store.update_profile(actor, update).await? {
            return Err(CoreError::NotFound(format!("profile {actor}")));
        }
        tracing::info!(actor_id = %actor, field, "profile updated");
        Ok((
            SessionState::default(),
            vec![Intent::reply_with(
                format!("Your {field} has been updated."),
                Keyboard::MainMenu,
            )],
        ))
    }

    async fn free_text(&self, actor: ActorId, session: SessionState, text: &str) -> CoreResult<Outcome> {
        match session.dialog {
            DialogState::AwaitingTicketAnswer(id) => {
                let text = text.trim();
                if text.is_empty() {
                    return Ok((session, vec![Intent::reply("Type the answer text.")]));
                }
                self.tickets.authorize(actor, id).await?;
                let mut intents = self
                    .tickets
                    .respond(self.gateway.as_ref(), id, text, self.delivery_timeout)
                    .await?;
                tracing::info!(ticket_id = %id, admin = %actor, "support reply sent");
                intents.insert(0, Intent::reply(format!("Answer to request #{id} sent.")));
                Ok((SessionState::default(), intents))
            }
            DialogState::ComposingBroadcast => {
                let mut next = session;
                next.fields.insert(DraftField::BroadcastText, text.to_string());
                next.fields.remove(&DraftField::BroadcastMedia);
                next.dialog = DialogState::ConfirmingBroadcast;
                Ok((next, vec![broadcast_preview(text, None)]))
            }
            DialogState::Browsing => Ok((
                session,
                vec![Intent::reply_with("Use the buttons to browse.", Keyboard::Browse)],
            )),
            _ => self.idle_hint(actor, session).await,
        }
    }

    async fn free_media(
        &self,
        actor: ActorId,
        session: SessionState,
        media: &MediaRef,
        caption: Option<&str>,
    ) -> CoreResult<Outcome> {
        match session.dialog {
            DialogState::ComposingBroadcast => {
                let caption = caption.unwrap_or_default();
                let mut next = session;
                next.fields
                    .insert(DraftField::BroadcastMedia, media.as_str().to_string());
                next.fields
                    .insert(DraftField::BroadcastText, caption.to_string());
                next.dialog = DialogState::ConfirmingBroadcast;
                Ok((next, vec![broadcast_preview(caption, Some(media))]))
            }
            DialogState::AwaitingTicketAnswer(_) => Err(crate::errors::ValidationError::ExpectedText.into()),
            _ => self.idle_hint(actor, session).await,
        }
    }

    async fn idle_hint(&self, actor: ActorId, session: SessionState) -> CoreResult<Outcome> {
        if self.store.profile_exists(actor).await? {
            Ok((
                session,
                vec![Intent::reply_with("Choose an option from the menu.", Keyboard::MainMenu)],
            ))
        } else {
            Ok((session, vec![Intent::reply("Send /start to register.")]))
        }
    }

    async fn run_action(&self, event: &InboundEvent, session: SessionState, action: Action) -> CoreResult<Outcome> {
        let actor = event.actor;
        let roles = self.tickets.roles();
        if action.requires_admin() && !roles.is_admin(actor) {
            return Err(CoreError::Forbidden(actor));
        }
        if action.requires_fallback_admin() && !roles.is_fallback(actor) {
            return Err(CoreError::Forbidden(actor));
        }
        let origin = match &event.kind {
            EventKind::Selection { origin, .. } => origin.clone(),
            _ => None,
        };

        // Browsing and admin confirmation states hold only until another action arrives.
        let (session, idle) = match (session.dialog, action) {
            (DialogState::Browsing, Action::Like | Action::Skip | Action::StopBrowsing)
            | (DialogState::ConfirmingTicketClear, Action::ConfirmClearTickets | Action::CancelClearTickets)
            | (DialogState::ComposingBroadcast | DialogState::ConfirmingBroadcast, Action::CancelBroadcast)
            | (DialogState::ConfirmingBroadcast, Action::ConfirmBroadcast) => (session, false),
            _ => (SessionState::default(), true),
        };

        match action {
            Action::Start => self.start(actor).await,
            Action::BackToMenu => Ok((
                SessionState::default(),
                vec![Intent::reply_with("Main menu.", Keyboard::MainMenu)],
            )),
            Action::ShowProfile => {
                let profile = self.require_profile(actor).await?;
                Ok((
                    SessionState::default(),
                    vec![Intent::Reply {
                        content: profile_card(&profile, None),
                        keyboard: Some(Keyboard::MainMenu),
                    }],
                ))
            }
            Action::OpenEditMenu => {
                self.require_profile(actor).await?;
                Ok((
                    SessionState::default(),
                    vec![Intent::reply_with("What would you like to change?", Keyboard::EditMenu)],
                ))
            }
            Action::EditPhoto => {
                self.require_profile(actor).await?;
                Ok(self.enter(DialogState::AwaitingReplacementPhoto, Prompt::ReplacementPhoto))
            }
            Action::EditDescription => {
                self.require_profile(actor).await?;
                Ok(self.enter(
                    DialogState::AwaitingReplacementDescription,
                    Prompt::ReplacementDescription,
                ))
            }
            Action::ReRegister => {
                let removed = self.store.delete_profile(actor).await?;
                tracing::info!(actor_id = %actor, removed, "profile deleted for re-registration");
                let (next, prompt) = begin_registration();
                Ok((
                    next,
                    vec![
                        Intent::reply("Your old profile was removed. Let's register again."),
                        prompt.intent(&self.limits),
                    ],
                ))
            }
            Action::Search => {
                let profile = self.require_profile(actor).await?;
                let browse = self.matching.start_search(&profile).await?;
                Ok(self.show_next(browse, Vec::new()))
            }
            Action::ViewLikers => {
                self.require_profile(actor).await?;
                let browse = self.matching.start_likers(actor).await?;
                Ok(self.show_next(browse, Vec::new()))
            }
            Action::Like => {
                let browse = browse_of(session)?;
                let requester = self.require_profile(actor).await?;
                let outcome = self.matching.like(actor, &browse).await?;
                let requester_handle = self.handles.lookup(actor).await;
                let candidate_handle = self.handles.lookup(outcome.candidate.actor_id).await;
                let intents = outcome.intents(
                    &requester,
                    requester_handle.as_deref(),
                    candidate_handle.as_deref(),
                );
                Ok(self.show_next(browse, intents))
            }
            Action::Skip => {
                let browse = browse_of(session)?;
                browse.current()?;
                Ok(self.show_next(browse, Vec::new()))
            }
            Action::StopBrowsing => {
                browse_of(session)?;
                Ok((
                    SessionState::default(),
                    vec![Intent::reply_with("Browsing stopped.", Keyboard::MainMenu)],
                ))
            }
            Action::OpenSupport => {
                let (next, prompt) = begin_support_intake();
                Ok((next, vec![prompt.intent(&self.limits)]))
            }
            Action::SupportReason(_) | Action::CancelSupport => Err(CoreError::State(
                "support reason selected outside the support dialog".to_string(),
            )),
            Action::AdminPanel | Action::FilterBack => Ok((
                SessionState::default(),
                vec![Intent::reply_with("Admin panel.", Keyboard::AdminMenu)],
            )),
            Action::AdminTickets => Ok((
                SessionState::default(),
                vec![Intent::reply_with("Which requests do you want to see?", Keyboard::TicketFilters)],
            )),
            Action::FilterTickets { reason, page } => self.list_tickets(actor, reason, page).await,
            Action::AnswerTicket(id) => {
                self.tickets.authorize(actor, id).await?;
                Ok((
                    SessionState::in_dialog(DialogState::AwaitingTicketAnswer(id)),
                    vec![Intent::reply(format!("Type your answer to request #{id}."))],
                ))
            }
            Action::ProcessTicket(id) => {
                self.tickets.authorize(actor, id).await?;
                let mut intents = self.tickets.mark_processed(id).await?;
                intents.push(self.refreshed_card(actor, id, origin).await?);
                Ok((SessionState::default(), intents))
            }
            Action::DeferTicket(id) => {
                self.tickets.authorize(actor, id).await?;
                self.tickets.mark_deferred(id).await?;
                let intent = self.refreshed_card(actor, id, origin).await?;
                Ok((SessionState::default(), vec![intent]))
            }
            Action::DeleteTicket(id) => {
                self.tickets.authorize(actor, id).await?;
                self.tickets.delete(id).await?;
                let mut intents = Vec::new();
                if let Some(message) = origin {
                    intents.push(Intent::DeleteMessage { message });
                }
                intents.push(Intent::reply(format!("Request #{id} deleted.")));
                Ok((SessionState::default(), intents))
            }
            Action::ReassignTicket(id, admin) => {
                let mut intents = self.tickets.reassign(id, admin).await?;
                intents.push(Intent::reply(format!("Request #{id} assigned to {admin}.")));
                Ok((SessionState::default(), intents))
            }
            Action::ClearTickets => Ok((
                SessionState::in_dialog(DialogState::ConfirmingTicketClear),
                vec![Intent::reply_with(
                    "Delete ALL support requests? This cannot be undone.",
                    Keyboard::ConfirmClearTickets,
                )],
            )),
            Action::ConfirmClearTickets => {
                if idle {
                    return Err(CoreError::State("no pending clear request".to_string()));
                }
                let removed = self.tickets.clear_all().await?;
                Ok((
                    SessionState::default(),
                    vec![Intent::reply_with(
                        format!("Deleted {removed} support request(s)."),
                        Keyboard::AdminMenu,
                    )],
                ))
            }
            Action::CancelClearTickets => {
                if idle {
                    return Err(CoreError::State("no pending clear request".to_string()));
                }
                Ok((
                    SessionState::default(),
                    vec![Intent::reply_with("Clearing cancelled.", Keyboard::AdminMenu)],
                ))
            }
            Action::StartBroadcast => Ok((
                SessionState::in_dialog(DialogState::ComposingBroadcast),
                vec![Intent::reply_with(
                    "Send the message to broadcast (text or photo with caption).",
                    Keyboard::CancelBroadcast,
                )],
            )),
            Action::ConfirmBroadcast => {
                if idle {
                    return Err(CoreError::State("no broadcast to confirm".to_string()));
                }
                let content = broadcast_content(&session)?;
                let recipients = self.store.list_all_profile_ids().await?;
                tracing::info!(admin = %actor, recipients = recipients.len(), "broadcast confirmed");
                Ok((
                    SessionState::default(),
                    vec![
                        Intent::reply(format!("Broadcasting to {} participant(s)...", recipients.len())),
                        Intent::Broadcast { recipients, content },
                    ],
                ))
            }
            Action::CancelBroadcast => {
                if idle {
                    return Err(CoreError::State("no broadcast in progress".to_string()));
                }
                Ok((
                    SessionState::default(),
                    vec![Intent::reply_with("Broadcast cancelled.", Keyboard::AdminMenu)],
                ))
            }
            Action::PurgeProfiles => {
                let removed = self.store.delete_all_profiles().await?;
                tracing::warn!(admin = %actor, removed, "all profiles purged");
                Ok((
                    SessionState::default(),
                    vec![Intent::reply(format!("Deleted {removed} profile(s)."))],
                ))
            }
        }
    }

    async fn start(&self, actor: ActorId) -> CoreResult<Outcome> {
        if self.store.profile_exists(actor).await? {
            let mut intents = vec![Intent::reply_with("Welcome back!", Keyboard::MainMenu)];
            if self.tickets.roles().is_admin(actor) {
                intents.push(Intent::reply_with("Administrator tools:", Keyboard::AdminMenu));
            }
            return Ok((SessionState::default(), intents));
        }
        let (next, prompt) = begin_registration();
        Ok((
            next,
            vec![
                Intent::reply("Welcome! Let's create your profile."),
                prompt.intent(&self.limits),
            ],
        ))
    }

    fn enter(&self, dialog: DialogState, prompt: Prompt) -> Outcome {
        (SessionState::in_dialog(dialog), vec![prompt.intent(&self.limits)])
    }

    async fn require_profile(&self, actor: ActorId) -> CoreResult<Profile> {
        self.store
            .get_profile(actor)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("profile {actor}")))
    }

    /// Shows the next card, or ends browsing when the snapshot is exhausted.
    fn show_next(&self, mut browse: BrowseSession, mut intents: Vec<Intent>) -> Outcome {
        match browse.advance() {
            Advance::Candidate(candidate) => {
                let note = (browse.mode == BrowseMode::Likers).then_some(LIKED_YOU_NOTE);
                intents.push(Intent::Reply {
                    content: profile_card(&candidate, note),
                    keyboard: Some(Keyboard::Browse),
                });
                (SessionState::browsing(browse), intents)
            }
            Advance::Exhausted => {
                let text = match (browse.mode, browse.is_empty()) {
                    (BrowseMode::Search, true) => "No profiles to show right now.",
                    (BrowseMode::Likers, true) => "Nobody has liked you yet.",
                    (_, false) => "That's everyone for now.",
                };
                intents.push(Intent::reply_with(text, Keyboard::MainMenu));
                (SessionState::default(), intents)
            }
        }
    }

    async fn list_tickets(
        &self,
        admin: ActorId,
        reason: Option<ReasonCategory>,
        page: usize,
    ) -> CoreResult<Outcome> {
        let tickets = self
            .tickets
            .list_for_admin(admin, reason.map(|reason| vec![reason]), false)
            .await?;
        let start = page.saturating_mul(self.page_size);
        if tickets.is_empty() || start >= tickets.len() {
            return Ok((
                SessionState::default(),
                vec![Intent::reply_with("No active requests.", Keyboard::TicketFilters)],
            ));
        }

        let mut intents: Vec<Intent> = tickets
            .iter()
            .skip(start)
            .take(self.page_size)
            .map(|ticket| Intent::Reply {
                content: ticket_card(ticket),
                keyboard: Some(self.tickets.actions_keyboard(admin, ticket.id)),
            })
            .collect();
        if start + self.page_size < tickets.len() {
            intents.push(Intent::reply_with(
                format!("Showing {} of {} requests.", start + intents.len(), tickets.len()),
                Keyboard::NextTicketPage {
                    reason,
                    page: page + 1,
                },
            ));
        }
        Ok((SessionState::default(), intents))
    }

    /// Updated ticket card, edited in place when the action came from a ticket message.
    async fn refreshed_card(
        &self,
        admin: ActorId,
        id: TicketId,
        origin: Option<MessageRef>,
    ) -> CoreResult<Intent> {
        let ticket = self.tickets.get(id).await?;
        let content = ticket_card(&ticket);
        let keyboard = Some(self.tickets.actions_keyboard(admin, id));
        Ok(match origin {
            Some(message) => Intent::EditMessage {
                message,
                content,
                keyboard,
            },
            None => Intent::Reply { content, keyboard },
        })
    }
}

fn browse_of(session: SessionState) -> CoreResult<BrowseSession> {
    match (session.dialog, session.browse) {
        (DialogState::Browsing, Some(browse)) => Ok(browse),
        _ => Err(CoreError::State("no active browse session".to_string())),
    }
}

fn broadcast_preview(text: &str, media: Option<&MediaRef>) -> Intent {
    let preview = match media {
        Some(media) => Content::Media {
            media: media.clone(),
            caption: text.to_string(),
        },
        None => Content::text(text),
    };
    Intent::Reply {
        content: preview,
        keyboard: Some(Keyboard::ConfirmBroadcast),
    }
}

fn broadcast_content(session: &SessionState) -> CoreResult<Content> {
    let text = session.field(DraftField::BroadcastText).unwrap_or_default();
    match session.field(DraftField::BroadcastMedia) {
        Some(media) => Ok(Content::Media {
            media: MediaRef::new(media),
            caption: text.to_string(),
        }),
        None if !text.is_empty() => Ok(Content::text(text)),
        None => Err(CoreError::State("broadcast has no content".to_string())),
    }
}
