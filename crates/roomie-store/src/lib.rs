//! Record store abstractions and in-memory backend.
//!
//! The store is the only shared mutable resource of the bot. Uniqueness of
//! profiles (per actor) and like edges (per ordered pair) is enforced here, and
//! duplicate writes are reported as `Ok(false)` rather than errors so callers can
//! treat them as idempotent no-ops.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::sync::RwLock;

mod sqlite;

pub use roomie_types::{
    ActorId, CandidateFilter, LikeEdge, NewProfile, NewTicket, Profile, ProfileUpdate,
    SupportTicket, TicketId, TicketQuery, TicketStatus,
};
pub use sqlite::SqliteRecordStore;

/// Result type for record store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),
    #[error("invalid persisted value for '{field}': {value}")]
    InvalidPersistedValue { field: &'static str, value: String },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Chrono(#[from] chrono::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Async store contract consumed by the conversation, matching and ticket engines.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn profile_exists(&self, actor: ActorId) -> StoreResult<bool>;
    async fn get_profile(&self, actor: ActorId) -> StoreResult<Option<Profile>>;
    /// Returns `false` when a profile already exists for the actor.
    async fn create_profile(&self, profile: NewProfile) -> StoreResult<bool>;
    /// Returns `false` when no profile exists for the actor.
    async fn update_profile(&self, actor: ActorId, update: ProfileUpdate) -> StoreResult<bool>;
    /// Deletes the profile and every like edge touching it.
    async fn delete_profile(&self, actor: ActorId) -> StoreResult<bool>;
    /// Purges all profiles and like edges, returning the number of profiles removed.
    async fn delete_all_profiles(&self) -> StoreResult<u64>;
    /// Profiles in creation order matching `filter`, excluding the requester and
    /// anyone the requester already liked.
    async fn list_candidates(&self, filter: CandidateFilter) -> StoreResult<Vec<Profile>>;
    async fn list_all_profile_ids(&self) -> StoreResult<Vec<ActorId>>;

    /// Returns `false` when the edge already exists.
    async fn create_like(&self, edge: LikeEdge) -> StoreResult<bool>;
    async fn has_mutual_like(&self, left: ActorId, right: ActorId) -> StoreResult<bool>;
    async fn count_likes_received(&self, actor: ActorId) -> StoreResult<u64>;
    /// Registered profiles that liked `actor`, in the order the likes were recorded.
    async fn list_likers(&self, actor: ActorId) -> StoreResult<Vec<Profile>>;

    async fn create_ticket(&self, ticket: NewTicket) -> StoreResult<TicketId>;
    async fn get_ticket(&self, id: TicketId) -> StoreResult<Option<SupportTicket>>;
    async fn list_tickets(&self, query: &TicketQuery) -> StoreResult<Vec<SupportTicket>>;
    async fn set_ticket_status(&self, id: TicketId, status: TicketStatus) -> StoreResult<bool>;
    async fn set_ticket_assignee(&self, id: TicketId, admin: ActorId) -> StoreResult<bool>;
    async fn delete_ticket(&self, id: TicketId) -> StoreResult<bool>;
    /// Removes every ticket, returning how many were deleted.
    async fn delete_all_tickets(&self) -> StoreResult<u64>;
}

/// In-memory implementation for tests and local experimentation.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    inner: RwLock<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    next_profile_seq: u64,
    profiles: HashMap<ActorId, (u64, Profile)>,
    likes: Vec<LikeEdge>,
    like_index: HashSet<LikeEdge>,
    next_ticket_id: i64,
    tickets: HashMap<TicketId, SupportTicket>,
}

impl StoreInner {
    fn profiles_in_creation_order(&self) -> Vec<&Profile> {
        let mut profiles: Vec<&(u64, Profile)> = self.profiles.values().collect();
        profiles.sort_by_key(|(seq, _)| *seq);
        profiles.into_iter().map(|(_, profile)| profile).collect()
    }
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn profile_exists(&self, actor: ActorId) -> StoreResult<bool> {
        Ok(self.inner.read().await.profiles.contains_key(&actor))
    }

    async fn get_profile(&self, actor: ActorId) -> StoreResult<Option<Profile>> {
        let inner = self.inner.read().await;
        Ok(inner
            .profiles
            .get(&actor)
            .map(|(_, profile)| profile.clone()))
    }

    async fn create_profile(&self, profile: NewProfile) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        if inner.profiles.contains_key(&profile.actor_id) {
            tracing::warn!(actor_id = %profile.actor_id, "profile already exists");
            return Ok(false);
        }
        inner.next_profile_seq += 1;
        let seq = inner.next_profile_seq;
        let actor = profile.actor_id;
        inner
            .profiles
            .insert(actor, (seq, profile.into_profile(Utc::now())));
        Ok(true)
    }

    async fn update_profile(&self, actor: ActorId, update: ProfileUpdate) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let Some((_, profile)) = inner.profiles.get_mut(&actor) else {
            return Ok(false);
        };
        update.apply(profile);
        Ok(true)
    }

    async fn delete_profile(&self, actor: ActorId) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        if inner.profiles.remove(&actor).is_none() {
            return Ok(false);
        }
        inner
            .likes
            .retain(|edge| edge.from != actor && edge.to != actor);
        inner
            .like_index
            .retain(|edge| edge.from != actor && edge.to != actor);
        Ok(true)
    }

    async fn delete_all_profiles(&self) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        let removed = inner.profiles.len() as u64;
        inner.profiles.clear();
        inner.likes.clear();
        inner.like_index.clear();
        Ok(removed)
    }

    async fn list_candidates(&self, filter: CandidateFilter) -> StoreResult<Vec<Profile>> {
        let inner = self.inner.read().await;
        Ok(inner
            .profiles_in_creation_order()
            .into_iter()
            .filter(|profile| profile.actor_id != filter.requester)
            .filter(|profile| filter.gender.matches(profile.gender))
            .filter(|profile| {
                !inner.like_index.contains(&LikeEdge {
                    from: filter.requester,
                    to: profile.actor_id,
                })
            })
            .cloned()
            .collect())
    }

    async fn list_all_profile_ids(&self) -> StoreResult<Vec<ActorId>> {
        let inner = self.inner.read().await;
        Ok(inner
            .profiles_in_creation_order()
            .into_iter()
            .map(|profile| profile.actor_id)
            .collect())
    }

    async fn create_like(&self, edge: LikeEdge) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        if !inner.like_index.insert(edge) {
            tracing::warn!(from = %edge.from, to = %edge.to, "like already exists");
            return Ok(false);
        }
        inner.likes.push(edge);
        Ok(true)
    }

    async fn has_mutual_like(&self, left: ActorId, right: ActorId) -> StoreResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner.like_index.contains(&LikeEdge {
            from: left,
            to: right,
        }) && inner.like_index.contains(&LikeEdge {
            from: right,
            to: left,
        }))
    }

    async fn count_likes_received(&self, actor: ActorId) -> StoreResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner.likes.iter().filter(|edge| edge.to == actor).count() as u64)
    }

    async fn list_likers(&self, actor: ActorId) -> StoreResult<Vec<Profile>> {
        let inner = self.inner.read().await;
        Ok(inner
            .likes
            .iter()
            .filter(|edge| edge.to == actor)
            .filter_map(|edge| inner.profiles.get(&edge.from))
            .map(|(_, profile)| profile.clone())
            .collect())
    }

    async fn create_ticket(&self, ticket: NewTicket) -> StoreResult<TicketId> {
        let mut inner = self.inner.write().await;
        inner.next_ticket_id += 1;
        let id = TicketId(inner.next_ticket_id);
        inner
            .tickets
            .insert(id, ticket.into_ticket(id, Utc::now()));
        Ok(id)
    }

    async fn get_ticket(&self, id: TicketId) -> StoreResult<Option<SupportTicket>> {
        Ok(self.inner.read().await.tickets.get(&id).cloned())
    }

    async fn list_tickets(&self, query: &TicketQuery) -> StoreResult<Vec<SupportTicket>> {
        let inner = self.inner.read().await;
        let mut tickets: Vec<SupportTicket> = inner
            .tickets
            .values()
            .filter(|ticket| query.matches(ticket))
            .cloned()
            .collect();
        tickets.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then(right.id.cmp(&left.id))
        });
        Ok(tickets)
    }

    async fn set_ticket_status(&self, id: TicketId, status: TicketStatus) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let Some(ticket) = inner.tickets.get_mut(&id) else {
            return Ok(false);
        };
        ticket.status = status;
        Ok(true)
    }

    async fn set_ticket_assignee(&self, id: TicketId, admin: ActorId) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let Some(ticket) = inner.tickets.get_mut(&id) else {
            return Ok(false);
        };
        ticket.assigned_admin = Some(admin);
        Ok(true)
    }

    async fn delete_ticket(&self, id: TicketId) -> StoreResult<bool> {
        Ok(self.inner.write().await.tickets.remove(&id).is_some())
    }

    async fn delete_all_tickets(&self) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        let removed = inner.tickets.len() as u64;
        inner.tickets.clear();
        Ok(removed)
    }
}
