//! Inbound events and the selection payload vocabulary.

use roomie_types::{ActorId, MediaRef, ReasonCategory, TicketId};

use crate::gateway::MessageRef;

/// One inbound update from a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub actor: ActorId,
    /// Public handle of the actor, when the transport exposes one. Stored without a leading `@`.
    pub handle: Option<String>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Text(String),
    Media {
        media: MediaRef,
        caption: Option<String>,
    },
    /// Button press. `origin` is the message that carried the keyboard.
    Selection {
        payload: String,
        origin: Option<MessageRef>,
    },
}

impl InboundEvent {
    pub fn text(actor: ActorId, text: impl Into<String>) -> Self {
        Self {
            actor,
            handle: None,
            kind: EventKind::Text(text.into()),
        }
    }

    pub fn media(actor: ActorId, media: impl Into<String>) -> Self {
        Self {
            actor,
            handle: None,
            kind: EventKind::Media {
                media: MediaRef::new(media),
                caption: None,
            },
        }
    }

    pub fn selection(actor: ActorId, action: &Action) -> Self {
        Self {
            actor,
            handle: None,
            kind: EventKind::Selection {
                payload: action.payload(),
                origin: None,
            },
        }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        let handle = handle.into();
        self.handle = Some(handle.trim_start_matches('@').to_string());
        self
    }

    pub fn with_origin(mut self, message: MessageRef) -> Self {
        if let EventKind::Selection { origin, .. } = &mut self.kind {
            *origin = Some(message);
        }
        self
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            EventKind::Text(_) => "text",
            EventKind::Media { .. } => "media",
            EventKind::Selection { .. } => "selection",
        }
    }
}

/// Every action a participant can trigger through a command or a button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    ShowProfile,
    OpenEditMenu,
    EditPhoto,
    EditDescription,
    /// Destructive: deletes the stored profile before registering again.
    ReRegister,
    BackToMenu,
    Search,
    ViewLikers,
    Like,
    Skip,
    StopBrowsing,
    OpenSupport,
    SupportReason(ReasonCategory),
    CancelSupport,
    AdminPanel,
    AdminTickets,
    /// `reason = None` lists every active ticket visible to the admin.
    FilterTickets {
        reason: Option<ReasonCategory>,
        page: usize,
    },
    FilterBack,
    AnswerTicket(TicketId),
    ProcessTicket(TicketId),
    DeferTicket(TicketId),
    DeleteTicket(TicketId),
    ReassignTicket(TicketId, ActorId),
    ClearTickets,
    ConfirmClearTickets,
    CancelClearTickets,
    StartBroadcast,
    ConfirmBroadcast,
    CancelBroadcast,
    PurgeProfiles,
}

const REASON_PREFIX: &str = "reason_";
const FILTER_ALL: &str = "all_active";

impl Action {
    pub fn payload(&self) -> String {
        match self {
            Self::Start => "start".to_string(),
            Self::ShowProfile => "my_profile".to_string(),
            Self::OpenEditMenu => "edit_profile".to_string(),
            Self::EditPhoto => "edit_photo".to_string(),
            Self::EditDescription => "edit_description".to_string(),
            Self::ReRegister => "re_register".to_string(),
            Self::BackToMenu => "back_to_menu".to_string(),
            Self::Search => "search".to_string(),
            Self::ViewLikers => "view_likers".to_string(),
            Self::Like => "like".to_string(),
            Self::Skip => "dislike".to_string(),
            Self::StopBrowsing => "stop_browsing".to_string(),
            Self::OpenSupport => "support".to_string(),
            Self::SupportReason(reason) => format!("{REASON_PREFIX}{}", reason.as_str()),
            Self::CancelSupport => "reason_cancel".to_string(),
            Self::AdminPanel => "admin_panel".to_string(),
            Self::AdminTickets => "admin_tickets".to_string(),
            Self::FilterTickets { reason, page } => format!(
                "filter:{}:{page}",
                reason.map_or(FILTER_ALL, ReasonCategory::as_str)
            ),
            Self::FilterBack => "filter_back".to_string(),
            Self::AnswerTicket(id) => format!("answer:{id}"),
            Self::ProcessTicket(id) => format!("process:{id}"),
            Self::DeferTicket(id) => format!("defer:{id}"),
            Self::DeleteTicket(id) => format!("delete:{id}"),
            Self::ReassignTicket(id, admin) => format!("reassign:{id}:{admin}"),
            Self::ClearTickets => "clear_tickets".to_string(),
            Self::ConfirmClearTickets => "clear_tickets_confirm".to_string(),
            Self::CancelClearTickets => "clear_tickets_cancel".to_string(),
            Self::StartBroadcast => "broadcast".to_string(),
            Self::ConfirmBroadcast => "broadcast_confirm".to_string(),
            Self::CancelBroadcast => "broadcast_cancel".to_string(),
            Self::PurgeProfiles => "purge_profiles".to_string(),
        }
    }

    /// Inverse of [`Action::payload`]. Returns `None` for unknown or malformed payloads.
    pub fn parse(payload: &str) -> Option<Self> {
        let simple = match payload {
            "start" => Some(Self::Start),
            "my_profile" => Some(Self::ShowProfile),
            "edit_profile" => Some(Self::OpenEditMenu),
            "edit_photo" => Some(Self::EditPhoto),
            "edit_description" => Some(Self::EditDescription),
            "re_register" => Some(Self::ReRegister),
            "back_to_menu" => Some(Self::BackToMenu),
            "search" => Some(Self::Search),
            "view_likers" => Some(Self::ViewLikers),
            "like" => Some(Self::Like),
            "dislike" => Some(Self::Skip),
            "stop_browsing" => Some(Self::StopBrowsing),
            "support" => Some(Self::OpenSupport),
            "reason_cancel" => Some(Self::CancelSupport),
            "admin_panel" => Some(Self::AdminPanel),
            "admin_tickets" => Some(Self::AdminTickets),
            "filter_back" => Some(Self::FilterBack),
            "clear_tickets" => Some(Self::ClearTickets),
            "clear_tickets_confirm" => Some(Self::ConfirmClearTickets),
            "clear_tickets_cancel" => Some(Self::CancelClearTickets),
            "broadcast" => Some(Self::StartBroadcast),
            "broadcast_confirm" => Some(Self::ConfirmBroadcast),
            "broadcast_cancel" => Some(Self::CancelBroadcast),
            "purge_profiles" => Some(Self::PurgeProfiles),
            _ => None,
        };
        if simple.is_some() {
            return simple;
        }

        if let Some(raw) = payload.strip_prefix(REASON_PREFIX) {
            return ReasonCategory::parse(raw).ok().map(Self::SupportReason);
        }

        let mut parts = payload.split(':');
        let verb = parts.next()?;
        let first = parts.next()?;
        let second = parts.next();
        if parts.next().is_some() {
            return None;
        }

        match (verb, second) {
            ("filter", Some(page)) => {
                let reason = if first == FILTER_ALL {
                    None
                } else {
                    Some(ReasonCategory::parse(first).ok()?)
                };
                Some(Self::FilterTickets {
                    reason,
                    page: page.parse().ok()?,
                })
            }
            ("reassign", Some(admin)) => Some(Self::ReassignTicket(
                TicketId(first.parse().ok()?),
                ActorId(admin.parse().ok()?),
            )),
            (verb, None) => {
                let id = TicketId(first.parse().ok()?);
                match verb {
                    "answer" => Some(Self::AnswerTicket(id)),
                    "process" => Some(Self::ProcessTicket(id)),
                    "defer" => Some(Self::DeferTicket(id)),
                    "delete" => Some(Self::DeleteTicket(id)),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Maps a slash command to its action. Arguments after the command are ignored.
    pub fn from_command(text: &str) -> Option<Self> {
        let command = text.trim().split_whitespace().next()?;
        match command {
            "/start" => Some(Self::Start),
            "/support" => Some(Self::OpenSupport),
            "/admin" => Some(Self::AdminPanel),
            "/clear_db" => Some(Self::PurgeProfiles),
            _ => None,
        }
    }

    /// Actions that only administrators may trigger.
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            Self::AdminPanel
                | Self::AdminTickets
                | Self::FilterTickets { .. }
                | Self::FilterBack
                | Self::AnswerTicket(_)
                | Self::ProcessTicket(_)
                | Self::DeferTicket(_)
                | Self::DeleteTicket(_)
                | Self::ReassignTicket(_, _)
                | Self::ClearTickets
                | Self::ConfirmClearTickets
                | Self::CancelClearTickets
                | Self::StartBroadcast
                | Self::ConfirmBroadcast
                | Self::CancelBroadcast
                | Self::PurgeProfiles
        )
    }

    /// Actions restricted to the fallback administrator.
    pub fn requires_fallback_admin(&self) -> bool {
        matches!(
            self,
            Self::ReassignTicket(_, _)
                | Self::ClearTickets
                | Self::ConfirmClearTickets
                | Self::StartBroadcast
                | Self::ConfirmBroadcast
                | Self::PurgeProfiles
        )
    }
}
