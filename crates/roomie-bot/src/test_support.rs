use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use roomie_store::{InMemoryRecordStore, RecordStore, StoreError, StoreResult};
use roomie_types::{
    ActorId, CandidateFilter, Gender, LikeEdge, MediaRef, NewProfile, NewTicket, Profile,
    ProfileUpdate, SupportTicket, TicketId, TicketQuery, TicketStatus,
};
use tokio::sync::Mutex;

use crate::bot_config::BotConfig;
use crate::gateway::{DeliveryError, MessageRef, MessagingGateway};
use crate::intents::{Content, Keyboard};

pub(crate) fn test_config() -> BotConfig {
    BotConfig::from_toml_str(
        r#"
[support]
fallback_admin = 100
page_size = 2

[[support.admins]]
id = 200
reasons = ["user_block", "profile_error"]

[[support.admins]]
id = 300
reasons = ["technical_problem"]
"#,
    )
    .expect("test config")
}

pub(crate) fn new_profile(id: i64, gender: Gender) -> NewProfile {
    NewProfile {
        actor_id: ActorId(id),
        name: format!("user{id}"),
        age: 20,
        gender,
        affiliation: "State University".to_string(),
        description: Some(format!("about user{id}")),
        photo: MediaRef::new(format!("photo-{id}")),
    }
}

pub(crate) fn profile(id: i64, gender: Gender) -> Profile {
    new_profile(id, gender).into_profile(Utc::now())
}

pub(crate) async fn register(store: &dyn RecordStore, id: i64, gender: Gender) -> Profile {
    assert!(store
        .create_profile(new_profile(id, gender))
        .await
        .expect("create profile"));
    store
        .get_profile(ActorId(id))
        .await
        .expect("load profile")
        .expect("profile exists")
}

/// Store with actors 1 and 4 (male) and 2 and 3 (female), registered in that order.
pub(crate) async fn seeded_store() -> Arc<dyn RecordStore> {
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    for (id, gender) in [
        (1, Gender::Male),
        (2, Gender::Female),
        (3, Gender::Female),
        (4, Gender::Male),
    ] {
        register(store.as_ref(), id, gender).await;
    }
    store
}

/// Gateway double that records sends and fails for selected recipients.
#[derive(Default)]
pub(crate) struct ScriptedGateway {
    failing: Mutex<HashSet<ActorId>>,
    sent: Mutex<Vec<(ActorId, Content)>>,
}

impl ScriptedGateway {
    pub(crate) async fn fail_for(&self, actor: ActorId) {
        self.failing.lock().await.insert(actor);
    }

    pub(crate) async fn heal(&self, actor: ActorId) {
        self.failing.lock().await.remove(&actor);
    }

    pub(crate) async fn sent(&self) -> Vec<(ActorId, Content)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl MessagingGateway for ScriptedGateway {
    async fn send_content(
        &self,
        recipient: ActorId,
        content: &Content,
        _keyboard: Option<&Keyboard>,
    ) -> Result<MessageRef, DeliveryError> {
        if self.failing.lock().await.contains(&recipient) {
            return Err(DeliveryError::Unreachable(recipient));
        }
        let mut sent = self.sent.lock().await;
        sent.push((recipient, content.clone()));
        Ok(MessageRef::new(format!("m{}", sent.len())))
    }

    async fn edit_content(
        &self,
        recipient: ActorId,
        _message: &MessageRef,
        _content: &Content,
        _keyboard: Option<&Keyboard>,
    ) -> Result<(), DeliveryError> {
        if self.failing.lock().await.contains(&recipient) {
            return Err(DeliveryError::Unreachable(recipient));
        }
        Ok(())
    }

    async fn delete_content(
        &self,
        recipient: ActorId,
        _message: &MessageRef,
    ) -> Result<(), DeliveryError> {
        if self.failing.lock().await.contains(&recipient) {
            return Err(DeliveryError::Unreachable(recipient));
        }
        Ok(())
    }
}

/// In-memory store whose read-after-write lookups (like counts, mutual checks and
/// single-ticket reads) fail while `fail_reads` is set. Writes always succeed.
#[derive(Default)]
pub(crate) struct FlakyReadStore {
    inner: InMemoryRecordStore,
    fail_reads: AtomicBool,
}

impl FlakyReadStore {
    pub(crate) fn set_failing(&self, failing: bool) {
        self.fail_reads.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("read replica offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FlakyReadStore {
    async fn profile_exists(&self, actor: ActorId) -> StoreResult<bool> {
        self.inner.profile_exists(actor).await
    }

    async fn get_profile(&self, actor: ActorId) -> StoreResult<Option<Profile>> {
        self.inner.get_profile(actor).await
    }

    async fn create_profile(&self, profile: NewProfile) -> StoreResult<bool> {
        self.inner.create_profile(profile).await
    }

    async fn update_profile(&self, actor: ActorId, update: ProfileUpdate) -> StoreResult<bool> {
        self.inner.update_profile(actor, update).await
    }

    async fn delete_profile(&self, actor: ActorId) -> StoreResult<bool> {
        self.inner.delete_profile(actor).await
    }

    async fn delete_all_profiles(&self) -> StoreResult<u64> {
        self.inner.delete_all_profiles().await
    }

    async fn list_candidates(&self, filter: CandidateFilter) -> StoreResult<Vec<Profile>> {
        self.inner.list_candidates(filter).await
    }

    async fn list_all_profile_ids(&self) -> StoreResult<Vec<ActorId>> {
        self.inner.list_all_profile_ids().await
    }

    async fn create_like(&self, edge: LikeEdge) -> StoreResult<bool> {
        self.inner.create_like(edge).await
    }

    async fn has_mutual_like(&self, left: ActorId, right: ActorId) -> StoreResult<bool> {
        self.check()?;
        self.inner.has_mutual_like(left, right).await
    }

    async fn count_likes_received(&self, actor: ActorId) -> StoreResult<u64> {
        self.check()?;
        self.inner.count_likes_received(actor).await
    }

    async fn list_likers(&self, actor: ActorId) -> StoreResult<Vec<Profile>> {
        self.inner.list_likers(actor).await
    }

    async fn create_ticket(&self, ticket: NewTicket) -> StoreResult<TicketId> {
        self.inner.create_ticket(ticket).await
    }

    async fn get_ticket(&self, id: TicketId) -> StoreResult<Option<SupportTicket>> {
        self.check()?;
        self.inner.get_ticket(id).await
    }

    async fn list_tickets(&self, query: &TicketQuery) -> StoreResult<Vec<SupportTicket>> {
        self.inner.list_tickets(query).await
    }

    async fn set_ticket_status(&self, id: TicketId, status: TicketStatus) -> StoreResult<bool> {
        self.inner.set_ticket_status(id, status).await
    }

    async fn set_ticket_assignee(&self, id: TicketId, admin: ActorId) -> StoreResult<bool> {
        self.inner.set_ticket_assignee(id, admin).await
    }

    async fn delete_ticket(&self, id: TicketId) -> StoreResult<bool> {
        self.inner.delete_ticket(id).await
    }

    async fn delete_all_tickets(&self) -> StoreResult<u64> {
        self.inner.delete_all_tickets().await
    }
}
