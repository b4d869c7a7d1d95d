//! End-to-end scenarios against the in-memory `Store` (SPEC_FULL §8). These
//! exercise `TurnEngine`/`RewindEngine` orchestration, not any real
//! Postgres behavior.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};

use turn_engine::{
	filter_memory_hits_by_visibility, EngineConfig, ResolveTurnInput, ResolveTurnStatus,
	RewindEngine, RewindStatus, SystemClock, TurnEngine,
};
use turn_ports::{
	ActorResolverError, ActorResolverPort, GiveItemRequest, LlmError, LlmPort, LlmTurnOutput,
	MemoryHit, PlayerStateUpdate, StateUpdate, TurnContext,
};
use turn_store::{MemoryStore, NewTimer, Store, StoreError, UnitOfWork};
use turn_types::{ActorId, Campaign, CampaignId, OutboxEventType, TurnId, TurnKind};

fn make_campaign(id: CampaignId, row_version: i64) -> Campaign {
	let now = Utc::now();
	Campaign {
		id,
		namespace: "test".to_string(),
		name: format!("campaign-{id}"),
		name_normalized: format!("campaign-{id}"),
		summary: String::new(),
		state: Map::new(),
		characters: Map::new(),
		last_narration: String::new(),
		memory_visible_max_turn_id: None,
		speed_multiplier: 1.0,
		row_version,
		created_at: now,
		updated_at: now,
	}
}

fn basic_llm_output(narration: &str) -> LlmTurnOutput {
	LlmTurnOutput {
		narration: narration.to_string(),
		state_update: StateUpdate::default(),
		summary_update: None,
		xp_awarded: 0,
		player_state_update: PlayerStateUpdate::default(),
		scene_image_prompt: None,
		timer_instruction: None,
		character_updates: Map::new(),
		give_item: None,
	}
}

/// Returns the same scripted output on every call.
struct ScriptedLlm {
	output: LlmTurnOutput,
}

#[async_trait]
impl LlmPort for ScriptedLlm {
	async fn complete_turn(&self, _context: &TurnContext) -> Result<LlmTurnOutput, LlmError> {
		Ok(self.output.clone())
	}
}

struct NoResolver;

#[async_trait]
impl ActorResolverPort for NoResolver {
	async fn resolve_discord_mention(&self, _mention: &str) -> Result<Option<ActorId>, ActorResolverError> {
		Ok(None)
	}
}

/// Wraps `MemoryStore` and, on the next `begin()` after `arm()` is called,
/// bumps `campaign_id`'s row_version before handing out the transaction —
/// simulating a sidecar writer racing between Phase A and Phase C (§8
/// scenarios (a), (b)).
struct FlakyStore {
	inner: Arc<MemoryStore>,
	campaign_id: CampaignId,
	armed: Arc<AtomicBool>,
	arm_count: Arc<AtomicU32>,
}

impl FlakyStore {
	fn new(inner: Arc<MemoryStore>, campaign_id: CampaignId) -> Self {
		Self {
			inner,
			campaign_id,
			armed: Arc::new(AtomicBool::new(false)),
			arm_count: Arc::new(AtomicU32::new(0)),
		}
	}

	/// A synchronous hook suitable for `before_phase_c_hook`: arms the next
	/// `begin()` to bump the row version, and records that it fired.
	fn hook(&self) -> impl Fn() + Sync {
		let armed = self.armed.clone();
		let arm_count = self.arm_count.clone();
		move || {
			armed.store(true, Ordering::SeqCst);
			arm_count.fetch_add(1, Ordering::SeqCst);
		}
	}

	fn hook_invocations(&self) -> u32 {
		self.arm_count.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl Store for FlakyStore {
	async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
		if self.armed.swap(false, Ordering::SeqCst) {
			self.inner.debug_bump_campaign_row_version(self.campaign_id).await;
		}
		self.inner.begin().await
	}
}

/// (a) A row-version bump between Phase A and Phase C aborts the whole
/// attempt: no retry budget, so the engine returns `conflict` immediately
/// and nothing else is written.
#[tokio::test]
async fn cas_conflict_aborts_all_writes() {
	let memory = Arc::new(MemoryStore::new());
	let campaign_id = CampaignId::new();
	memory.seed_campaign(make_campaign(campaign_id, 1)).await;

	let flaky = Arc::new(FlakyStore::new(memory.clone(), campaign_id));
	let hook = flaky.hook();

	let mut output = basic_llm_output("You look around.");
	output.timer_instruction = Some(turn_ports::TimerInstruction {
		delay_seconds: 60,
		event_text: "something stirs".to_string(),
		interruptible: true,
		interrupt_action: None,
	});
	output.scene_image_prompt = Some("a dim corridor".to_string());

	let llm = Arc::new(ScriptedLlm { output });
	let config = EngineConfig { max_conflict_retries: 0, ..EngineConfig::default() };
	let engine = TurnEngine::new(flaky.clone(), llm, Some(Arc::new(NoResolver)), config);

	let actor_id = ActorId::new();
	let input = ResolveTurnInput::new(campaign_id, actor_id, "look around");
	let result = engine.resolve_turn(input, Some(&hook)).await;

	assert_eq!(result.status, ResolveTurnStatus::Conflict);
	assert_eq!(memory.debug_turns(campaign_id).await.len(), 0);
	assert_eq!(memory.debug_outbox_events(campaign_id).await.len(), 0);

	let mut uow = memory.begin().await.unwrap();
	assert!(uow.find_active_timer(campaign_id).await.unwrap().is_none());
	uow.rollback().await.unwrap();
}

/// (b) With `max_conflict_retries=1` and a hook that always bumps the row
/// version, both attempts fail: the hook fires exactly twice and the final
/// status is `conflict`.
#[tokio::test]
async fn single_retry_then_conflict() {
	let memory = Arc::new(MemoryStore::new());
	let campaign_id = CampaignId::new();
	memory.seed_campaign(make_campaign(campaign_id, 1)).await;

	let flaky = Arc::new(FlakyStore::new(memory.clone(), campaign_id));
	let hook = flaky.hook();

	let llm = Arc::new(ScriptedLlm { output: basic_llm_output("Nothing happens.") });
	let config = EngineConfig { max_conflict_retries: 1, ..EngineConfig::default() };
	let engine = TurnEngine::new(flaky.clone(), llm, Some(Arc::new(NoResolver)), config);

	let actor_id = ActorId::new();
	let input = ResolveTurnInput::new(campaign_id, actor_id, "wait");
	let result = engine.resolve_turn(input, Some(&hook)).await;

	assert_eq!(result.status, ResolveTurnStatus::Conflict);
	assert_eq!(flaky.hook_invocations(), 2);
}

/// (c) Rewind deletes only turns/snapshots strictly after the target and
/// restores the watermark.
#[tokio::test]
async fn rewind_deletes_later_turns_only() {
	let memory = Arc::new(MemoryStore::new());
	let campaign_id = CampaignId::new();
	memory.seed_campaign(make_campaign(campaign_id, 1)).await;

	let llm = Arc::new(ScriptedLlm { output: basic_llm_output("The door creaks open.") });
	let config = EngineConfig::default();
	let engine =
		TurnEngine::new(memory.clone(), llm, Some(Arc::new(NoResolver) as Arc<dyn ActorResolverPort>), config);

	let actor_id = ActorId::new();
	for action in ["open the door", "step inside"] {
		let input = ResolveTurnInput::new(campaign_id, actor_id, action);
		let result = engine.resolve_turn(input, None).await;
		assert_eq!(result.status, ResolveTurnStatus::Ok);
	}

	let turns = memory.debug_turns(campaign_id).await;
	assert_eq!(turns.len(), 4);
	assert_eq!(turns[0].kind, TurnKind::Player);
	assert_eq!(turns[1].kind, TurnKind::Narrator);
	assert_eq!(turns[2].kind, TurnKind::Player);
	assert_eq!(turns[3].kind, TurnKind::Narrator);

	let rewind = RewindEngine::new(memory.clone(), Arc::new(SystemClock));
	let target = turns[1].id;
	let result = rewind.rewind_to_turn(campaign_id, target, None).await;

	assert_eq!(result.status, RewindStatus::Ok);
	assert_eq!(result.deleted_turns, 2);

	let remaining = memory.debug_turns(campaign_id).await;
	assert_eq!(remaining.len(), 2);
	assert!(remaining.iter().all(|t| t.id <= target));

	let mut uow = memory.begin().await.unwrap();
	let campaign = uow.find_campaign(campaign_id).await.unwrap().unwrap();
	uow.rollback().await.unwrap();
	assert_eq!(campaign.memory_visible_max_turn_id, Some(target));

	let hits = vec![
		MemoryHit { turn_id: turns[0].id, text: "a".to_string(), score: 1.0 },
		MemoryHit { turn_id: turns[1].id, text: "b".to_string(), score: 1.0 },
		MemoryHit { turn_id: turns[2].id, text: "c".to_string(), score: 1.0 },
		MemoryHit { turn_id: turns[3].id, text: "d".to_string(), score: 1.0 },
	];
	let visible = filter_memory_hits_by_visibility(campaign.memory_visible_max_turn_id, hits);
	assert_eq!(visible.len(), 2);
	assert!(visible.iter().all(|h| h.turn_id <= target));
}

/// (d) An unresolved give-item request is non-fatal: the turn still
/// succeeds and the engine records a `give_item_unresolved` outbox event.
#[tokio::test]
async fn give_item_unresolved_is_non_fatal() {
	let memory = Arc::new(MemoryStore::new());
	let campaign_id = CampaignId::new();
	memory.seed_campaign(make_campaign(campaign_id, 1)).await;

	let mut output = basic_llm_output("You offer the rusty key, but no one is there to take it.");
	output.give_item = Some(GiveItemRequest {
		item: "rusty key".to_string(),
		to_actor_id: None,
		to_discord_mention: Some("<@999999>".to_string()),
	});

	let llm = Arc::new(ScriptedLlm { output });
	let engine = TurnEngine::new(memory.clone(), llm, None, EngineConfig::default());

	let actor_id = ActorId::new();
	let input = ResolveTurnInput::new(campaign_id, actor_id, "hand over the rusty key");
	let result = engine.resolve_turn(input, None).await;

	assert_eq!(result.status, ResolveTurnStatus::Ok);

	let outbox = memory.debug_outbox_events(campaign_id).await;
	assert_eq!(outbox.iter().filter(|e| e.event_type == OutboxEventType::GiveItemUnresolved).count(), 1);
}

/// (e) Timer state-machine idempotence: binding twice is fine, but
/// `mark_timer_expired`/`mark_timer_consumed` only transition once each.
#[tokio::test]
async fn timer_state_machine_is_idempotent() {
	let memory = MemoryStore::new();
	let campaign_id = CampaignId::new();
	memory.seed_campaign(make_campaign(campaign_id, 1)).await;

	let now = Utc::now();
	let mut uow = memory.begin().await.unwrap();
	let timer = uow
		.insert_timer(NewTimer {
			campaign_id,
			due_at: now + chrono::Duration::seconds(60),
			event_text: "the tide comes in".to_string(),
			interruptible: true,
			interrupt_action: None,
		})
		.await
		.unwrap();

	assert!(uow
		.attach_timer_message(timer.id, "msg-1".to_string(), "chan-1".to_string(), now)
		.await
		.unwrap());
	assert!(uow
		.attach_timer_message(timer.id, "msg-2".to_string(), "chan-1".to_string(), now)
		.await
		.unwrap());

	assert!(uow.mark_timer_expired(timer.id, now).await.unwrap());
	assert!(!uow.mark_timer_expired(timer.id, now).await.unwrap());

	assert!(uow.mark_timer_consumed(timer.id, now).await.unwrap());
	assert!(!uow.mark_timer_consumed(timer.id, now).await.unwrap());

	uow.commit().await.unwrap();
}

/// (f) Rewind targeting a turn id from a different campaign's snapshot
/// space is rejected rather than silently matching.
#[tokio::test]
async fn rewind_rejects_cross_campaign_targets() {
	let memory = Arc::new(MemoryStore::new());
	let campaign_a = CampaignId::new();
	let campaign_b = CampaignId::new();
	memory.seed_campaign(make_campaign(campaign_a, 1)).await;
	memory.seed_campaign(make_campaign(campaign_b, 1)).await;

	let llm = Arc::new(ScriptedLlm { output: basic_llm_output("Something happens.") });
	let engine = TurnEngine::new(memory.clone(), llm, None, EngineConfig::default());

	for campaign_id in [campaign_a, campaign_b] {
		let input = ResolveTurnInput::new(campaign_id, ActorId::new(), "act");
		let result = engine.resolve_turn(input, None).await;
		assert_eq!(result.status, ResolveTurnStatus::Ok);
	}

	let turns_b = memory.debug_turns(campaign_b).await;
	let narrator_turn_from_b = turns_b.iter().find(|t| t.kind == TurnKind::Narrator).unwrap().id;

	let rewind = RewindEngine::new(memory.clone(), Arc::new(SystemClock));
	let result = rewind.rewind_to_turn(campaign_a, narrator_turn_from_b, None).await;

	assert_eq!(result.status, RewindStatus::Error);
	assert_eq!(result.reason.as_deref(), Some("snapshot_not_found"));
}

/// Rewinding to the same target twice is idempotent: the second call still
/// succeeds and deletes nothing further.
#[tokio::test]
async fn rewind_twice_to_same_target_is_idempotent() {
	let memory = Arc::new(MemoryStore::new());
	let campaign_id = CampaignId::new();
	memory.seed_campaign(make_campaign(campaign_id, 1)).await;

	let llm = Arc::new(ScriptedLlm { output: basic_llm_output("The lantern flickers.") });
	let engine = TurnEngine::new(memory.clone(), llm, None, EngineConfig::default());

	let actor_id = ActorId::new();
	let input = ResolveTurnInput::new(campaign_id, actor_id, "light the lantern");
	let result = engine.resolve_turn(input, None).await;
	assert_eq!(result.status, ResolveTurnStatus::Ok);

	let turns = memory.debug_turns(campaign_id).await;
	let target = turns.iter().find(|t| t.kind == TurnKind::Narrator).unwrap().id;

	let rewind = RewindEngine::new(memory.clone(), Arc::new(SystemClock));
	let first = rewind.rewind_to_turn(campaign_id, target, None).await;
	assert_eq!(first.status, RewindStatus::Ok);

	let second = rewind.rewind_to_turn(campaign_id, target, None).await;
	assert_eq!(second.status, RewindStatus::Ok);
	assert_eq!(second.deleted_turns, 0);
}

/// Channel-scoped rewind only deletes turns whose `session_id` falls in the
/// given scope, leaving other sessions' later turns untouched.
#[tokio::test]
async fn channel_scoped_rewind_restricts_deletion_to_session_scope() {
	let memory = Arc::new(MemoryStore::new());
	let campaign_id = CampaignId::new();
	memory.seed_campaign(make_campaign(campaign_id, 1)).await;

	let session_a = turn_types::SessionId::new();
	let session_b = turn_types::SessionId::new();

	let llm = Arc::new(ScriptedLlm { output: basic_llm_output("The torch sputters.") });
	let engine = TurnEngine::new(memory.clone(), llm, None, EngineConfig::default());

	let actor_id = ActorId::new();
	let mut input = ResolveTurnInput::new(campaign_id, actor_id, "light the torch");
	input.session_id = Some(session_a);
	let result = engine.resolve_turn(input, None).await;
	assert_eq!(result.status, ResolveTurnStatus::Ok);

	let turns_after_first = memory.debug_turns(campaign_id).await;
	let target = turns_after_first.iter().find(|t| t.kind == TurnKind::Narrator).unwrap().id;

	let mut input = ResolveTurnInput::new(campaign_id, actor_id, "look around elsewhere");
	input.session_id = Some(session_b);
	let result = engine.resolve_turn(input, None).await;
	assert_eq!(result.status, ResolveTurnStatus::Ok);

	let rewind = RewindEngine::new(memory.clone(), Arc::new(SystemClock));
	let result = rewind.rewind_to_turn(campaign_id, target, Some(&[session_a])).await;

	// `session_a` has no turns after `target`, so nothing in scope qualifies
	// for deletion even though session_b's later turns exist.
	assert_eq!(result.status, RewindStatus::Ok);
	assert_eq!(result.deleted_turns, 0);
	assert_eq!(memory.debug_turns(campaign_id).await.len(), 4);
}

/// `filter_memory_hits_by_visibility` passes everything through when the
/// campaign has no watermark set (§8 invariant 4).
#[tokio::test]
async fn memory_visibility_filter_is_a_noop_without_watermark() {
	let hits = vec![
		MemoryHit { turn_id: TurnId(1), text: "a".to_string(), score: 1.0 },
		MemoryHit { turn_id: TurnId(5), text: "b".to_string(), score: 1.0 },
	];
	let visible = filter_memory_hits_by_visibility(None, hits.clone());
	assert_eq!(visible.len(), hits.len());
}

/// Outbox inserts are idempotent on the composite key: re-inserting the
/// same `(campaign, session_scope, event_type, idempotency_key)` is a
/// silent no-op (§8 invariant 5).
#[tokio::test]
async fn outbox_insert_is_idempotent_on_composite_key() {
	let memory = MemoryStore::new();
	let campaign_id = CampaignId::new();
	memory.seed_campaign(make_campaign(campaign_id, 1)).await;

	let event = turn_types::NewOutboxEvent {
		campaign_id,
		session_scope: None,
		event_type: OutboxEventType::MemoryPruneRequested,
		idempotency_key: "rewind:1".to_string(),
		payload: Value::Null,
	};

	let mut uow = memory.begin().await.unwrap();
	assert!(uow.insert_outbox_event(event.clone()).await.unwrap());
	assert!(!uow.insert_outbox_event(event).await.unwrap());
	uow.commit().await.unwrap();

	assert_eq!(memory.debug_outbox_events(campaign_id).await.len(), 1);
}

/// A successful `resolve_turn` bumps `row_version` by exactly one and
/// writes exactly one narrator turn with a matching snapshot (§8 invariants
/// 1, 2).
#[tokio::test]
async fn successful_resolve_turn_advances_row_version_by_one() {
	let memory = Arc::new(MemoryStore::new());
	let campaign_id = CampaignId::new();
	memory.seed_campaign(make_campaign(campaign_id, 5)).await;

	let llm = Arc::new(ScriptedLlm { output: basic_llm_output("A breeze passes through.") });
	let engine = TurnEngine::new(memory.clone(), llm, None, EngineConfig::default());

	let actor_id = ActorId::new();
	let input = ResolveTurnInput::new(campaign_id, actor_id, "breathe");
	let result = engine.resolve_turn(input, None).await;
	assert_eq!(result.status, ResolveTurnStatus::Ok);

	let mut uow = memory.begin().await.unwrap();
	let campaign = uow.find_campaign(campaign_id).await.unwrap().unwrap();
	let snapshot = uow
		.find_snapshot_at_turn(campaign_id, campaign.memory_visible_max_turn_id.unwrap())
		.await
		.unwrap();
	uow.rollback().await.unwrap();

	assert_eq!(campaign.row_version, 6);
	assert!(snapshot.is_some());

	let turns = memory.debug_turns(campaign_id).await;
	assert_eq!(turns.iter().filter(|t| t.kind == TurnKind::Narrator).count(), 1);
}

/// Resolves a fixed set of narration mentions to actor ids, for exercising
/// the heuristic give-item inference path.
struct LabelResolver {
	labels: Vec<(&'static str, ActorId)>,
}

#[async_trait]
impl ActorResolverPort for LabelResolver {
	async fn resolve_discord_mention(&self, mention: &str) -> Result<Option<ActorId>, ActorResolverError> {
		Ok(self.labels.iter().find(|(label, _)| *label == mention).map(|(_, id)| *id))
	}
}

/// A handoff the LLM only described in narration, without an explicit
/// `give_item` field, still reaches the recipient: the item the source's
/// inventory lost is the item the target gains, not simply deleted (§4.4).
#[tokio::test]
async fn inferred_give_item_transfers_to_recipient() {
	let memory = Arc::new(MemoryStore::new());
	let campaign_id = CampaignId::new();
	let mut campaign = make_campaign(campaign_id, 1);
	campaign.characters.insert("Bob".to_string(), Value::Null);
	memory.seed_campaign(campaign).await;

	let giver = ActorId::new();
	let recipient = ActorId::new();
	let resolver = Arc::new(LabelResolver { labels: vec![("Bob", recipient)] });

	let mut pickup = basic_llm_output("You pick up a rusty key.");
	pickup.player_state_update.inventory_add = vec!["Rusty Key".to_string()];
	let llm = Arc::new(ScriptedLlm { output: pickup });
	let engine =
		TurnEngine::new(memory.clone(), llm, Some(resolver.clone() as Arc<dyn ActorResolverPort>), EngineConfig::default());
	let input = ResolveTurnInput::new(campaign_id, giver, "pick up the rusty key");
	let result = engine.resolve_turn(input, None).await;
	assert_eq!(result.status, ResolveTurnStatus::Ok);

	let mut handoff = basic_llm_output("Alice hands the rusty key to Bob.");
	handoff.player_state_update.inventory_remove = vec!["Rusty Key".to_string()];
	let llm = Arc::new(ScriptedLlm { output: handoff });
	let engine =
		TurnEngine::new(memory.clone(), llm, Some(resolver as Arc<dyn ActorResolverPort>), EngineConfig::default());
	let input = ResolveTurnInput::new(campaign_id, giver, "give the rusty key to Bob");
	let result = engine.resolve_turn(input, None).await;
	assert_eq!(result.status, ResolveTurnStatus::Ok);

	let mut uow = memory.begin().await.unwrap();
	let giver_after = uow.find_player(campaign_id, giver).await.unwrap().unwrap();
	let recipient_after = uow.find_player(campaign_id, recipient).await.unwrap().unwrap();
	uow.rollback().await.unwrap();

	assert!(giver_after.inventory().is_empty());
	assert_eq!(recipient_after.inventory().len(), 1);
	assert_eq!(recipient_after.inventory()[0].name, "Rusty Key");
}
