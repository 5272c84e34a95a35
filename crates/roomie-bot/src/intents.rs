//! Outbound intents produced by the core and executed by the runtime.

use roomie_types::{ActorId, MediaRef, Profile, ReasonCategory, SupportTicket, TicketId};

use crate::events::Action;
use crate::gateway::MessageRef;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Media { media: MediaRef, caption: String },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Text body, or the caption for media content.
    pub fn body(&self) -> &str {
        match self {
            Self::Text(text) => text,
            Self::Media { caption, .. } => caption,
        }
    }
}

/// One keyboard button. Without a payload the button sends its label back as plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub payload: Option<String>,
}

impl Button {
    fn action(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            payload: Some(action.payload()),
        }
    }

    fn reply(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            payload: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    /// Removes any previously shown reply keyboard.
    Remove,
    MainMenu,
    AdminMenu,
    EditMenu,
    GenderChoice,
    /// Single button sending the configured skip token.
    SkipDescription(String),
    Browse,
    ViewLikers,
    SupportReasons,
    TicketFilters,
    TicketActions {
        ticket: TicketId,
        reassign_to: Vec<ActorId>,
    },
    NextTicketPage {
        reason: Option<ReasonCategory>,
        page: usize,
    },
    ConfirmClearTickets,
    /// Shown while the broadcast content is still being composed.
    CancelBroadcast,
    ConfirmBroadcast,
}

impl Keyboard {
    pub fn rows(&self) -> Vec<Vec<Button>> {
        match self {
            Self::Remove => Vec::new(),
            Self::MainMenu => vec![
                vec![
                    Button::action("Search", Action::Search),
                    Button::action("Who liked me", Action::ViewLikers),
                ],
                vec![
                    Button::action("My profile", Action::ShowProfile),
                    Button::action("Edit profile", Action::OpenEditMenu),
                ],
                vec![Button::action("Support", Action::OpenSupport)],
            ],
            Self::AdminMenu => vec![
                vec![Button::action("Support requests", Action::AdminTickets)],
                vec![
                    Button::action("Clear requests", Action::ClearTickets),
                    Button::action("Broadcast", Action::StartBroadcast),
                ],
                vec![Button::action("Main menu", Action::BackToMenu)],
            ],
            Self::EditMenu => vec![
                vec![
                    Button::action("Change photo", Action::EditPhoto),
                    Button::action("Change description", Action::EditDescription),
                ],
                vec![Button::action("Register again", Action::ReRegister)],
                vec![Button::action("Back", Action::BackToMenu)],
            ],
            Self::GenderChoice => vec![roomie_types::Gender::ALL
                .into_iter()
                .map(|gender| Button::reply(gender.label()))
                .collect()],
            Self::SkipDescription(token) => vec![vec![Button::reply(token.clone())]],
            Self::Browse => vec![
                vec![
                    Button::action("Like", Action::Like),
                    Button::action("Skip", Action::Skip),
                ],
                vec![Button::action("Stop", Action::StopBrowsing)],
            ],
            Self::ViewLikers => vec![vec![Button::action("Who liked me", Action::ViewLikers)]],
            Self::SupportReasons => {
                let mut rows: Vec<Vec<Button>> = ReasonCategory::ALL
                    .into_iter()
                    .map(|reason| vec![Button::action(reason.label(), Action::SupportReason(reason))])
                    .collect();
                rows.push(vec![Button::action("Cancel", Action::CancelSupport)]);
                rows
            }
            Self::TicketFilters => {
                let mut rows = vec![vec![Button::action(
                    "All active",
                    Action::FilterTickets {
                        reason: None,
                        page: 0,
                    },
                )]];
                rows.extend(ReasonCategory::ALL.into_iter().map(|reason| {
                    vec![Button::action(
                        reason.label(),
                        Action::FilterTickets {
                            reason: Some(reason),
                            page: 0,
                        },
                    )]
                }));
                rows.push(vec![Button::action("Back", Action::FilterBack)]);
                rows
            }
            Self::TicketActions {
                ticket,
                reassign_to,
            } => {
                let mut rows = vec![
                    vec![
                        Button::action("Answer", Action::AnswerTicket(*ticket)),
                        Button::action("Processed", Action::ProcessTicket(*ticket)),
                    ],
                    vec![
                        Button::action("Defer", Action::DeferTicket(*ticket)),
                        Button::action("Delete", Action::DeleteTicket(*ticket)),
                    ],
                ];
                if !reassign_to.is_empty() {
                    rows.push(
                        reassign_to
                            .iter()
                            .map(|admin| {
                                Button::action(
                                    format!("Assign to {admin}"),
                                    Action::ReassignTicket(*ticket, *admin),
                                )
                            })
                            .collect(),
                    );
                }
                rows
            }
            Self::NextTicketPage { reason, page } => vec![vec![Button::action(
                "More",
                Action::FilterTickets {
                    reason: *reason,
                    page: *page,
                },
            )]],
            Self::ConfirmClearTickets => vec![vec![
                Button::action("Confirm", Action::ConfirmClearTickets),
                Button::action("Cancel", Action::CancelClearTickets),
            ]],
            Self::CancelBroadcast => vec![vec![Button::action(
                "Cancel",
                Action::CancelBroadcast,
            )]],
            Self::ConfirmBroadcast => vec![vec![
                Button::action("Send", Action::ConfirmBroadcast),
                Button::action("Cancel", Action::CancelBroadcast),
            ]],
        }
    }
}

/// A decision to deliver something. Replies, edits and deletes address the acting participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Reply {
        content: Content,
        keyboard: Option<Keyboard>,
    },
    NotifyUser {
        recipient: ActorId,
        content: Content,
        keyboard: Option<Keyboard>,
    },
    NotifyAdmin {
        admin: ActorId,
        content: Content,
        keyboard: Option<Keyboard>,
    },
    EditMessage {
        message: MessageRef,
        content: Content,
        keyboard: Option<Keyboard>,
    },
    DeleteMessage {
        message: MessageRef,
    },
    /// Throttled fan-out; the runtime reports aggregate results back to the actor.
    Broadcast {
        recipients: Vec<ActorId>,
        content: Content,
    },
}

impl Intent {
    pub fn reply(text: impl Into<String>) -> Self {
        Self::Reply {
            content: Content::text(text),
            keyboard: None,
        }
    }

    pub fn reply_with(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self::Reply {
            content: Content::text(text),
            keyboard: Some(keyboard),
        }
    }

    /// Recipient for intents that are not addressed to the acting participant.
    pub fn external_recipient(&self) -> Option<ActorId> {
        match self {
            Self::NotifyUser { recipient, .. } => Some(*recipient),
            Self::NotifyAdmin { admin, .. } => Some(*admin),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Reply { .. } => "reply",
            Self::NotifyUser { .. } => "notify_user",
            Self::NotifyAdmin { .. } => "notify_admin",
            Self::EditMessage { .. } => "edit_message",
            Self::DeleteMessage { .. } => "delete_message",
            Self::Broadcast { .. } => "broadcast",
        }
    }
}

pub fn profile_card(profile: &Profile, note: Option<&str>) -> Content {
    let mut caption = format!(
        "{}, {}\n{}",
        profile.name, profile.age, profile.affiliation
    );
    if let Some(description) = profile.description.as_deref() {
        caption.push_str("\n\n");
        caption.push_str(description);
    }
    if let Some(note) = note {
        caption.push_str("\n\n");
        caption.push_str(note);
    }
    Content::Media {
        media: profile.photo.clone(),
        caption,
    }
}

pub fn match_card(counterpart: &Profile, handle: Option<&str>) -> Content {
    let contact = handle.map_or_else(
        || "Contact: handle not set".to_string(),
        |handle| format!("Contact: @{handle}"),
    );
    profile_card(
        counterpart,
        Some(&format!("It's a match with {}!\n{contact}", counterpart.name)),
    )
}

pub fn ticket_card(ticket: &SupportTicket) -> Content {
    let assigned = ticket
        .assigned_admin
        .map_or_else(|| "unassigned".to_string(), |admin| admin.to_string());
    Content::Text(format!(
        "Request #{} [{}] ({})\nFrom: {} ({})\nAssigned to: {}\nCreated: {}\n\n{}",
        ticket.id,
        ticket.reason.label(),
        ticket.status.label(),
        ticket.requester_handle,
        ticket.requester,
        assigned,
        ticket.created_at.format("%Y-%m-%d %H:%M UTC"),
        ticket.body
    ))
}
