//! Support ticket routing, visibility policy and lifecycle.
//!
//! Ownership is decided once at creation from the [`AdminRoleMap`]. Only a
//! specialized owner is paged; tickets that fall through to the fallback
//! administrator are discoverable through listing alone.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use roomie_store::RecordStore;
use roomie_types::{
    ActorId, NewTicket, ReasonCategory, SupportTicket, TicketId, TicketQuery, TicketStatus,
};

use crate::bot_config::AdminRoleMap;
use crate::errors::{CoreError, CoreResult};
use crate::gateway::{send_with_timeout, MessagingGateway};
use crate::intents::{ticket_card, Content, Intent, Keyboard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingDecision {
    pub admin: ActorId,
    /// True when `admin` owns the reason, false when the ticket fell through to the fallback.
    pub specialized: bool,
}

impl AdminRoleMap {
    pub fn route(&self, reason: ReasonCategory) -> RoutingDecision {
        match self.owner_of(reason) {
            Some(admin) => RoutingDecision {
                admin,
                specialized: true,
            },
            None => RoutingDecision {
                admin: self.fallback(),
                specialized: false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedTicket {
    pub id: TicketId,
    pub decision: RoutingDecision,
    pub intents: Vec<Intent>,
}

pub struct TicketRouter {
    store: Arc<dyn RecordStore>,
    roles: AdminRoleMap,
}

impl TicketRouter {
    pub fn new(store: Arc<dyn RecordStore>, roles: AdminRoleMap) -> Self {
        Self { store, roles }
    }

    pub fn roles(&self) -> &AdminRoleMap {
        &self.roles
    }

    pub async fn open_ticket(
        &self,
        requester: ActorId,
        requester_handle: String,
        reason: ReasonCategory,
        body: String,
    ) -> CoreResult<OpenedTicket> {
        let decision = self.roles.route(reason);
        let ticket = NewTicket {
            requester,
            requester_handle,
            body,
            reason,
            assigned_admin: Some(decision.admin),
        };
        let created_at = Utc::now();
        let id = self.store.create_ticket(ticket.clone()).await?;
        tracing::info!(
            ticket_id = %id,
            requester = %requester,
            reason = reason.as_str(),
            assigned_admin = %decision.admin,
            specialized = decision.specialized,
            "support ticket routed"
        );

        let mut intents = vec![Intent::reply_with(
            format!("Your request #{id} has been received. We will get back to you soon."),
            Keyboard::MainMenu,
        )];
        // The card is rendered from the submitted fields; nothing is read back after the write.
        if decision.specialized {
            intents.push(Intent::NotifyAdmin {
                admin: decision.admin,
                content: ticket_card(&ticket.into_ticket(id, created_at)),
                keyboard: Some(self.actions_keyboard(decision.admin, id)),
            });
        }
        Ok(OpenedTicket {
            id,
            decision,
            intents,
        })
    }

    pub async fn get(&self, id: TicketId) -> CoreResult<SupportTicket> {
        self.store
            .get_ticket(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("ticket {id}")))
    }

    /// Loads a ticket the admin may act on. The fallback admin may act on every ticket.
    pub async fn authorize(&self, admin: ActorId, id: TicketId) -> CoreResult<SupportTicket> {
        if !self.roles.is_admin(admin) {
            return Err(CoreError::Forbidden(admin));
        }
        let ticket = self.get(id).await?;
        if self.roles.is_fallback(admin) || ticket.assigned_admin == Some(admin) {
            Ok(ticket)
        } else {
            Err(CoreError::Forbidden(admin))
        }
    }

    pub async fn list_for_admin(
        &self,
        admin: ActorId,
        reasons: Option<Vec<ReasonCategory>>,
        include_processed: bool,
    ) -> CoreResult<Vec<SupportTicket>> {
        let assigned_admin = if self.roles.is_fallback(admin) {
            None
        } else if self.roles.is_admin(admin) {
            Some(admin)
        } else {
            return Err(CoreError::Forbidden(admin));
        };
        let query = TicketQuery {
            assigned_admin,
            reasons,
            statuses: (!include_processed).then(|| TicketStatus::ACTIVE.to_vec()),
        };
        Ok(self.store.list_tickets(&query).await?)
    }

    /// Open|Deferred → Processed and notify the requester. Already processed tickets are left alone.
    pub async fn mark_processed(&self, id: TicketId) -> CoreResult<Vec<Intent>> {
        let ticket = self.get(id).await?;
        if ticket.status == TicketStatus::Processed {
            return Ok(Vec::new());
        }
        self.transition(&ticket, TicketStatus::Processed).await?;
        Ok(vec![Intent::NotifyUser {
            recipient: ticket.requester,
            content: Content::text(format!("Your support request #{id} has been resolved.")),
            keyboard: None,
        }])
    }

    pub async fn mark_deferred(&self, id: TicketId) -> CoreResult<()> {
        let ticket = self.get(id).await?;
        if ticket.status == TicketStatus::Deferred {
            return Ok(());
        }
        self.transition(&ticket, TicketStatus::Deferred).await
    }

    /// Delivers `text` to the requester, then marks the ticket processed.
    ///
    /// A failed delivery leaves the ticket status untouched.
    pub async fn respond(
        &self,
        gateway: &dyn MessagingGateway,
        id: TicketId,
        text: &str,
        timeout: Duration,
    ) -> CoreResult<Vec<Intent>> {
        let ticket = self.get(id).await?;
        let reply = Content::text(format!("Support reply to your request #{id}:\n\n{text}"));
        if let Err(error) = send_with_timeout(gateway, ticket.requester, &reply, None, timeout).await {
            tracing::warn!(
                ticket_id = %id,
                requester = %ticket.requester,
                error = %error,
                "support reply delivery failed; ticket left unchanged"
            );
            return Err(error.into());
        }
        self.mark_processed(id).await
    }

    pub async fn delete(&self, id: TicketId) -> CoreResult<()> {
        if !self.store.delete_ticket(id).await? {
            return Err(CoreError::NotFound(format!("ticket {id}")));
        }
        tracing::info!(ticket_id = %id, "support ticket deleted");
        Ok(())
    }

    /// Overwrites the stored assignment and pages the new owner.
    pub async fn reassign(&self, id: TicketId, admin: ActorId) -> CoreResult<Vec<Intent>> {
        if !self.roles.is_admin(admin) {
            return Err(CoreError::NotFound(format!("administrator {admin}")));
        }
        if !self.store.set_ticket_assignee(id, admin).await? {
            return Err(CoreError::NotFound(format!("ticket {id}")));
        }
        tracing::info!(ticket_id = %id, assigned_admin = %admin, "support ticket reassigned");
        let ticket = self.get(id).await?;
        Ok(vec![Intent::NotifyAdmin {
            admin,
            content: ticket_card(&ticket),
            keyboard: Some(self.actions_keyboard(admin, id)),
        }])
    }

    pub async fn clear_all(&self) -> CoreResult<u64> {
        let removed = self.store.delete_all_tickets().await?;
        tracing::warn!(removed, "all support tickets cleared");
        Ok(removed)
    }

    /// Action keyboard for one ticket as seen by `viewer`. Only the fallback admin may reassign.
    pub fn actions_keyboard(&self, viewer: ActorId, ticket: TicketId) -> Keyboard {
        let reassign_to = if self.roles.is_fallback(viewer) {
            self.roles
                .admin_ids()
                .into_iter()
                .filter(|admin| *admin != viewer)
                .collect()
        } else {
            Vec::new()
        };
        Keyboard::TicketActions {
            ticket,
            reassign_to,
        }
    }

    async fn transition(&self, ticket: &SupportTicket, next: TicketStatus) -> CoreResult<()> {
        ticket.status.ensure_transition(next)?;
        if !self.store.set_ticket_status(ticket.id, next).await? {
            return Err(CoreError::NotFound(format!("ticket {}", ticket.id)));
        }
        tracing::info!(
            ticket_id = %ticket.id,
            from = ticket.status.label(),
            to = next.label(),
            "support ticket status changed"
        );
        Ok(())
    }
}
