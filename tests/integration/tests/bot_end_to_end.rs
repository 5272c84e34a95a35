use std::sync::Arc;

use roomie_bot::{
    Action, BotConfig, Content, Conversation, DialogState, InboundEvent, RegistrationStep,
};
use roomie_runtime::{BotRuntime, GatewayCall, IntentExecutor, RecordingGateway};
use roomie_store::{RecordStore, SqliteRecordStore};
use roomie_types::{
    ActorId, Gender, MediaRef, NewProfile, ReasonCategory, TicketId, TicketQuery, TicketStatus,
};
use tempfile::TempDir;

const FALLBACK: ActorId = ActorId(100);
const BLOCK_ADMIN: ActorId = ActorId(200);
const TECH_ADMIN: ActorId = ActorId(300);

const CONFIG: &str = r#"
[support]
fallback_admin = 100
page_size = 50

[[support.admins]]
id = 200
reasons = ["user_block"]

[[support.admins]]
id = 300
reasons = ["technical_problem"]

[runtime]
broadcast_interval_ms = 1
delivery_timeout_ms = 1000
immediate_retry_attempts = 0
"#;

struct Harness {
    _dir: TempDir,
    store: Arc<dyn RecordStore>,
    gateway: Arc<RecordingGateway>,
    runtime: BotRuntime,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let store: Arc<dyn RecordStore> = Arc::new(
            SqliteRecordStore::new(dir.path().join("roomie.sqlite")).expect("sqlite store"),
        );
        let gateway = Arc::new(RecordingGateway::new());
        let config = BotConfig::from_toml_str(CONFIG).expect("config");
        let conversation = Arc::new(
            Conversation::new(&config, store.clone(), gateway.clone()).expect("conversation"),
        );
        let executor = Arc::new(IntentExecutor::new(gateway.clone(), &config.runtime));
        let runtime = BotRuntime::new(conversation, executor, config.runtime.handle_timeout());
        Self {
            _dir: dir,
            store,
            gateway,
            runtime,
        }
    }

    async fn text(&self, actor: ActorId, text: &str) {
        self.runtime.process(InboundEvent::text(actor, text)).await;
    }

    async fn press(&self, actor: ActorId, action: Action) {
        self.runtime
            .process(InboundEvent::selection(actor, &action))
            .await;
    }

    async fn photo(&self, actor: ActorId, media: &str) {
        self.runtime
            .process(InboundEvent::media(actor, media))
            .await;
    }

    async fn dialog(&self, actor: ActorId) -> DialogState {
        self.runtime
            .conversation()
            .sessions()
            .load(actor)
            .await
            .dialog
    }

    async fn bodies(&self, actor: ActorId) -> Vec<String> {
        self.gateway
            .sent_to(actor)
            .await
            .iter()
            .map(|content| content.body().to_string())
            .collect()
    }

    async fn register(&self, id: i64, gender: Gender) {
        let created = self
            .store
            .create_profile(NewProfile {
                actor_id: ActorId(id),
                name: format!("resident{id}"),
                age: 21,
                gender,
                affiliation: "North Campus".to_string(),
                description: None,
                photo: MediaRef::new(format!("photo-{id}")),
            })
            .await
            .expect("create profile");
        assert!(created);
    }

    async fn open_ticket(&self, actor: ActorId, reason: ReasonCategory, body: &str) {
        self.press(actor, Action::OpenSupport).await;
        self.press(actor, Action::SupportReason(reason)).await;
        self.text(actor, body).await;
    }
}

#[tokio::test]
async fn integration_age_seventeen_is_accepted_and_five_is_rejected() {
    let harness = Harness::new();
    let actor = ActorId(7);
    harness.text(actor, "/start").await;
    harness.text(actor, "Mira").await;

    harness.text(actor, "5").await;
    assert_eq!(
        harness.dialog(actor).await,
        DialogState::Registration(RegistrationStep::Age)
    );
    let bodies = harness.bodies(actor).await;
    let prompt = bodies[bodies.len() - 2].clone();
    let retry = bodies[bodies.len() - 1].clone();
    assert_eq!(prompt, "How old are you? (16-99)");
    assert!(retry.ends_with(&prompt));

    harness.text(actor, "17").await;
    assert_eq!(
        harness.dialog(actor).await,
        DialogState::Registration(RegistrationStep::Gender)
    );
    harness.text(actor, "Female").await;
    harness.text(actor, "North Campus").await;
    harness.text(actor, "Early riser, no pets").await;
    harness.photo(actor, "photo-7").await;

    let profile = harness
        .store
        .get_profile(actor)
        .await
        .expect("load")
        .expect("profile committed");
    assert_eq!(profile.age, 17);
    assert_eq!(profile.description.as_deref(), Some("Early riser, no pets"));
    assert_eq!(harness.dialog(actor).await, DialogState::Idle);
}

#[tokio::test]
async fn integration_completing_registration_twice_leaves_store_unchanged() {
    let harness = Harness::new();
    let actor = ActorId(8);
    for step in ["/start", "Noor", "24", "Male", "South Campus", "skip"] {
        harness.text(actor, step).await;
    }
    harness.register(8, Gender::Female).await;
    harness.photo(actor, "late-photo").await;

    let profile = harness
        .store
        .get_profile(actor)
        .await
        .expect("load")
        .expect("profile");
    assert_eq!(profile.name, "resident8");
    assert_eq!(profile.photo, MediaRef::new("photo-8"));
    assert_eq!(
        harness.bodies(actor).await.last().map(String::as_str),
        Some("You are already registered.")
    );
}

#[tokio::test]
async fn integration_mutual_match_notifies_each_side_exactly_once() {
    let harness = Harness::new();
    let (a, b) = (ActorId(1), ActorId(2));
    harness.register(1, Gender::Male).await;
    harness.register(2, Gender::Female).await;
    harness
        .runtime
        .process(InboundEvent::text(a, "hello").with_handle("@alpha"))
        .await;

    harness.press(a, Action::Search).await;
    harness.press(a, Action::Like).await;
    let b_after_first = harness.bodies(b).await;
    assert_eq!(b_after_first.len(), 1);
    assert!(b_after_first[0].contains("1 like(s)"));

    harness.press(b, Action::ViewLikers).await;
    harness.press(b, Action::Like).await;

    let match_notes = |bodies: &[String]| {
        bodies
            .iter()
            .filter(|body| body.contains("It's a match"))
            .count()
    };
    assert_eq!(match_notes(&harness.bodies(a).await), 1);
    assert_eq!(match_notes(&harness.bodies(b).await), 1);
    assert!(harness
        .bodies(b)
        .await
        .iter()
        .any(|body| body.contains("@alpha")));

    // A repeated like hits the stored edge and fires nothing new.
    harness.press(b, Action::ViewLikers).await;
    harness.press(b, Action::Like).await;
    assert_eq!(match_notes(&harness.bodies(a).await), 1);
    assert_eq!(match_notes(&harness.bodies(b).await), 1);
    assert_eq!(harness.store.count_likes_received(a).await.expect("count"), 1);
}

#[tokio::test]
async fn integration_browse_exhausts_after_every_candidate() {
    let harness = Harness::new();
    let viewer = ActorId(10);
    harness.register(10, Gender::Female).await;
    for id in 11..=13 {
        harness.register(id, Gender::Male).await;
    }

    harness.press(viewer, Action::Search).await;
    harness.press(viewer, Action::Skip).await;
    harness.press(viewer, Action::Skip).await;
    assert_eq!(harness.dialog(viewer).await, DialogState::Browsing);
    harness.press(viewer, Action::Skip).await;
    assert_eq!(harness.dialog(viewer).await, DialogState::Idle);

    let bodies = harness.bodies(viewer).await;
    let shown: Vec<&String> = bodies
        .iter()
        .filter(|body| body.starts_with("resident"))
        .collect();
    assert_eq!(shown.len(), 3);
    assert!(shown[0].starts_with("resident11"));
    assert_eq!(bodies.last().map(String::as_str), Some("That's everyone for now."));

    // Skipping again after exhaustion is an out-of-sequence action, not a crash.
    harness.press(viewer, Action::Skip).await;
    assert_eq!(harness.dialog(viewer).await, DialogState::Idle);
}

#[tokio::test]
async fn integration_routing_pages_specialized_owner_only() {
    let harness = Harness::new();
    harness
        .open_ticket(ActorId(5), ReasonCategory::UserBlock, "blocked by resident9")
        .await;
    let paged = harness.bodies(BLOCK_ADMIN).await;
    assert_eq!(paged.len(), 1);
    assert!(paged[0].contains("blocked by resident9"));

    harness
        .open_ticket(ActorId(6), ReasonCategory::SuggestionsIdeas, "add a laundry rota")
        .await;
    assert!(harness.bodies(FALLBACK).await.is_empty());

    let tickets = harness
        .store
        .list_tickets(&TicketQuery::default())
        .await
        .expect("list");
    assert_eq!(tickets.len(), 2);
    assert_eq!(tickets[0].assigned_admin, Some(FALLBACK));
    assert_eq!(tickets[1].assigned_admin, Some(BLOCK_ADMIN));
    assert!(harness
        .bodies(ActorId(6))
        .await
        .last()
        .is_some_and(|body| body.contains("#2")));
}

#[tokio::test]
async fn integration_fallback_sees_everything_newest_first() {
    let harness = Harness::new();
    harness
        .open_ticket(ActorId(1), ReasonCategory::TechnicalProblem, "first")
        .await;
    harness
        .open_ticket(ActorId(2), ReasonCategory::UserBlock, "second")
        .await;
    harness
        .open_ticket(ActorId(3), ReasonCategory::GeneralQuestion, "third")
        .await;

    let router = harness.runtime.conversation().tickets();
    let all: Vec<String> = router
        .list_for_admin(FALLBACK, None, false)
        .await
        .expect("fallback list")
        .into_iter()
        .map(|ticket| ticket.body)
        .collect();
    assert_eq!(all, vec!["third", "second", "first"]);

    let tech = router
        .list_for_admin(TECH_ADMIN, None, false)
        .await
        .expect("tech list");
    assert_eq!(tech.len(), 1);
    assert_eq!(tech[0].body, "first");

    harness
        .press(
            FALLBACK,
            Action::FilterTickets {
                reason: None,
                page: 0,
            },
        )
        .await;
    let cards = harness.bodies(FALLBACK).await;
    assert_eq!(cards.len(), 3);
    assert!(cards[0].ends_with("third"));
}

#[tokio::test]
async fn integration_answer_with_failed_delivery_keeps_ticket_open() {
    let harness = Harness::new();
    let requester = ActorId(4);
    harness
        .open_ticket(requester, ReasonCategory::TechnicalProblem, "wifi is down")
        .await;
    harness.press(TECH_ADMIN, Action::AnswerTicket(TicketId(1))).await;

    harness.gateway.fail_for(requester).await;
    harness.text(TECH_ADMIN, "hello").await;
    let ticket = harness
        .store
        .get_ticket(TicketId(1))
        .await
        .expect("load")
        .expect("ticket");
    assert_eq!(ticket.status, TicketStatus::Open);
    assert_eq!(
        harness.dialog(TECH_ADMIN).await,
        DialogState::AwaitingTicketAnswer(TicketId(1))
    );
    assert!(harness
        .bodies(TECH_ADMIN)
        .await
        .last()
        .is_some_and(|body| body.contains("could not be delivered")));

    harness.gateway.heal(requester).await;
    harness.text(TECH_ADMIN, "hello").await;
    let ticket = harness
        .store
        .get_ticket(TicketId(1))
        .await
        .expect("load")
        .expect("ticket");
    assert_eq!(ticket.status, TicketStatus::Processed);
    let delivered = harness.bodies(requester).await;
    assert!(delivered.iter().any(|body| body.ends_with("hello")));
    assert!(delivered
        .iter()
        .any(|body| body.contains("has been resolved")));
}

#[tokio::test]
async fn integration_clear_all_empties_every_listing() {
    let harness = Harness::new();
    for (actor, reason) in [
        (1, ReasonCategory::TechnicalProblem),
        (2, ReasonCategory::ProfileError),
        (3, ReasonCategory::UserBlock),
        (4, ReasonCategory::SuggestionsIdeas),
        (5, ReasonCategory::GeneralQuestion),
    ] {
        harness.open_ticket(ActorId(actor), reason, "details").await;
    }
    harness
        .press(FALLBACK, Action::DeferTicket(TicketId(2)))
        .await;
    harness
        .press(FALLBACK, Action::ProcessTicket(TicketId(3)))
        .await;

    harness.press(FALLBACK, Action::ClearTickets).await;
    harness.press(FALLBACK, Action::ConfirmClearTickets).await;

    let filters = [
        TicketQuery::default(),
        TicketQuery {
            statuses: Some(vec![TicketStatus::Processed]),
            ..TicketQuery::default()
        },
        TicketQuery {
            assigned_admin: Some(BLOCK_ADMIN),
            ..TicketQuery::default()
        },
        TicketQuery {
            reasons: Some(ReasonCategory::ALL.to_vec()),
            statuses: Some(TicketStatus::ACTIVE.to_vec()),
            ..TicketQuery::default()
        },
    ];
    for filter in &filters {
        assert!(harness
            .store
            .list_tickets(filter)
            .await
            .expect("list")
            .is_empty());
    }
}

#[tokio::test]
async fn integration_ticket_actions_edit_and_delete_origin_messages() {
    let harness = Harness::new();
    harness
        .open_ticket(ActorId(9), ReasonCategory::UserBlock, "spam messages")
        .await;
    let card = harness
        .gateway
        .calls()
        .await
        .into_iter()
        .find_map(|call| match call {
            GatewayCall::Send {
                recipient,
                message,
                ..
            } if recipient == BLOCK_ADMIN => Some(message),
            _ => None,
        })
        .expect("admin card");

    harness
        .runtime
        .process(
            InboundEvent::selection(BLOCK_ADMIN, &Action::DeferTicket(TicketId(1)))
                .with_origin(card.clone()),
        )
        .await;
    harness
        .runtime
        .process(
            InboundEvent::selection(BLOCK_ADMIN, &Action::DeleteTicket(TicketId(1)))
                .with_origin(card.clone()),
        )
        .await;

    let calls = harness.gateway.calls().await;
    assert!(calls.iter().any(|call| matches!(
        call,
        GatewayCall::Edit { message, content: Content::Text(body), .. }
            if *message == card && body.contains("(deferred)")
    )));
    assert!(calls.iter().any(|call| matches!(
        call,
        GatewayCall::Delete { message, .. } if *message == card
    )));
    assert!(harness
        .store
        .get_ticket(TicketId(1))
        .await
        .expect("load")
        .is_none());
}

#[tokio::test]
async fn integration_broadcast_reaches_profiles_and_reports_failures() {
    let harness = Harness::new();
    for id in 1..=4 {
        harness.register(id, Gender::Male).await;
    }
    harness.gateway.fail_for(ActorId(3)).await;

    harness.press(FALLBACK, Action::StartBroadcast).await;
    harness.text(FALLBACK, "Fire drill at noon").await;
    harness.press(FALLBACK, Action::ConfirmBroadcast).await;

    for id in [1, 2, 4] {
        assert_eq!(
            harness.bodies(ActorId(id)).await,
            vec!["Fire drill at noon".to_string()]
        );
    }
    assert!(harness
        .bodies(FALLBACK)
        .await
        .last()
        .is_some_and(|body| body.contains("3 delivered, 1 failed")));
}
