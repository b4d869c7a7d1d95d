//! `TurnEngine::resolve_turn`: the two-phase claim/commit orchestration
//! (§4.2). Phase A builds a consistent read of the world and leases the
//! `(campaign, actor)` pair; the LLM call happens with no lock held;
//! Phase C re-validates and applies the result under a row-version CAS.

use std::sync::Arc;

use serde_json::Value;
use tracing::instrument;

use turn_ports::{ActorResolverPort, LlmPort, TurnContext};
use turn_store::{CampaignUpdate, NewTimer, NewTurn, PlayerUpdate, Store};
use turn_types::{
	ActorId, CampaignId, ClaimToken, InventoryItem, NewOutboxEvent, OutboxEventType,
	PlayerSnapshot, SessionId, Snapshot, SnapshotId, TurnKind,
};

use crate::claim::ClaimManager;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::giveitem;
use crate::mutator;

/// The recent-turn context window fed to the LLM (§4.2 step A.4, §9).
pub const RECENT_TURN_WINDOW: i64 = 24;
/// Minimum timer delay enforced at schedule time (§4.2 step C.10).
const MIN_TIMER_DELAY_SECS: i64 = 30;

#[derive(Debug, Clone)]
pub struct ResolveTurnInput {
	pub campaign_id: CampaignId,
	pub actor_id: ActorId,
	pub action: String,
	pub session_id: Option<SessionId>,
	pub record_player_turn: bool,
	pub allow_timer_instruction: bool,
}

impl ResolveTurnInput {
	pub fn new(campaign_id: CampaignId, actor_id: ActorId, action: impl Into<String>) -> Self {
		Self {
			campaign_id,
			actor_id,
			action: action.into(),
			session_id: None,
			record_player_turn: true,
			allow_timer_instruction: true,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveTurnStatus {
	Ok,
	Busy,
	Conflict,
	Error,
}

#[derive(Debug, Clone)]
pub enum GiveItemOutcome {
	Transferred { target_actor_id: ActorId, item: String },
	/// Recovered from narration rather than an explicit `give_item` field
	/// (§4.4 "Heuristic fallback"). `item` already vanished from the
	/// source's inventory by the time this is produced — it was the
	/// signal `infer_give_item` used to notice the handoff — so it must
	/// not be popped from the source inventory a second time.
	InferredTransfer { target_actor_id: ActorId, item: String },
	Unresolved { reason: String },
}

#[derive(Debug, Clone)]
pub struct ResolveTurnResult {
	pub status: ResolveTurnStatus,
	pub narration: Option<String>,
	pub scene_image_prompt: Option<String>,
	pub timer_instruction: Option<turn_ports::TimerInstruction>,
	pub conflict_reason: Option<String>,
	pub give_item: Option<GiveItemOutcome>,
	pub reason: Option<String>,
}

impl ResolveTurnResult {
	fn ok(narration: String, scene_image_prompt: Option<String>, timer_instruction: Option<turn_ports::TimerInstruction>, give_item: Option<GiveItemOutcome>) -> Self {
		Self {
			status: ResolveTurnStatus::Ok,
			narration: Some(narration),
			scene_image_prompt,
			timer_instruction,
			conflict_reason: None,
			give_item,
			reason: None,
		}
	}

	fn busy(reason: String) -> Self {
		Self {
			status: ResolveTurnStatus::Busy,
			narration: None,
			scene_image_prompt: None,
			timer_instruction: None,
			conflict_reason: None,
			give_item: None,
			reason: Some(reason),
		}
	}

	fn conflict(reason: String) -> Self {
		Self {
			status: ResolveTurnStatus::Conflict,
			narration: None,
			scene_image_prompt: None,
			timer_instruction: None,
			conflict_reason: Some(reason),
			give_item: None,
			reason: None,
		}
	}

	fn error(reason: String) -> Self {
		Self {
			status: ResolveTurnStatus::Error,
			narration: None,
			scene_image_prompt: None,
			timer_instruction: None,
			conflict_reason: None,
			give_item: None,
			reason: Some(reason),
		}
	}
}

/// A consistent, pre-LLM read of the world, plus everything Phase C needs
/// to validate and re-apply (§4.2).
struct PhaseAOutput {
	context: TurnContext,
	token: ClaimToken,
	start_row_version: i64,
}

pub struct TurnEngine {
	store: Arc<dyn Store>,
	llm: Arc<dyn LlmPort>,
	actor_resolver: Option<Arc<dyn ActorResolverPort>>,
	config: EngineConfig,
	claims: ClaimManager,
}

impl TurnEngine {
	pub fn new(
		store: Arc<dyn Store>,
		llm: Arc<dyn LlmPort>,
		actor_resolver: Option<Arc<dyn ActorResolverPort>>,
		config: EngineConfig,
	) -> Self {
		let claims = ClaimManager::new(config.clock.clone());
		Self { store, llm, actor_resolver, config, claims }
	}

	/// `before_phase_c_hook` is invoked synchronously immediately before
	/// Phase C's transaction opens; production callers pass `None` (§4.2).
	#[instrument(skip(self, before_phase_c_hook), fields(campaign_id = %input.campaign_id, actor_id = %input.actor_id))]
	pub async fn resolve_turn(
		&self,
		input: ResolveTurnInput,
		before_phase_c_hook: Option<&(dyn Fn() + Sync)>,
	) -> ResolveTurnResult {
		let mut attempts = 0u32;
		loop {
			match self.try_resolve_once(&input, before_phase_c_hook).await {
				Ok(result) => return result,
				Err(err) if err.is_turn_busy() => {
					tracing::info!(reason = %err, "turn busy");
					return ResolveTurnResult::busy(err.reason());
				}
				Err(err) if err.is_stale_claim() => {
					attempts += 1;
					tracing::warn!(reason = %err, attempts, "stale claim, considering retry");
					if attempts > self.config.max_conflict_retries {
						return ResolveTurnResult::conflict(err.reason());
					}
				}
				Err(err) => {
					tracing::error!(reason = %err, "unexpected resolve_turn failure");
					return ResolveTurnResult::error(err.reason());
				}
			}
		}
	}

	async fn try_resolve_once(
		&self,
		input: &ResolveTurnInput,
		before_phase_c_hook: Option<&(dyn Fn() + Sync)>,
	) -> Result<ResolveTurnResult, EngineError> {
		let token = ClaimToken::new();
		let phase_a = self.phase_a(input, token).await?;

		let llm_output = self.llm.complete_turn(&phase_a.context).await?;

		if let Some(hook) = before_phase_c_hook {
			hook();
		}

		self.phase_c(input, phase_a, llm_output).await
	}

	#[instrument(skip(self, input), fields(campaign_id = %input.campaign_id, actor_id = %input.actor_id))]
	async fn phase_a(
		&self,
		input: &ResolveTurnInput,
		token: ClaimToken,
	) -> Result<PhaseAOutput, EngineError> {
		let mut uow = self.store.begin().await?;

		let campaign =
			uow.find_campaign(input.campaign_id).await?.ok_or(EngineError::CampaignNotFound)?;

		let acquired = self
			.claims
			.acquire_or_steal(uow.as_mut(), input.campaign_id, input.actor_id, token, self.config.lease_ttl())
			.await?;
		if !acquired {
			uow.rollback().await?;
			return Err(EngineError::TurnInflight);
		}

		let now = self.claims.now();
		let player = uow.find_or_create_player(input.campaign_id, input.actor_id, now).await?;
		let recent_turns = uow.recent_turns(input.campaign_id, RECENT_TURN_WINDOW).await?;

		let context = TurnContext {
			campaign_id: input.campaign_id,
			campaign_state: campaign.state.clone(),
			campaign_summary: campaign.summary.clone(),
			campaign_characters: campaign.characters.clone(),
			player_state: player.state.clone(),
			player_level: player.level,
			player_xp: player.xp,
			recent_turns,
			start_row_version: campaign.row_version,
			now,
			action: input.action.clone(),
		};

		uow.commit().await?;

		Ok(PhaseAOutput { context, token, start_row_version: campaign.row_version })
	}

	#[instrument(skip(self, input, phase_a, llm_output), fields(campaign_id = %input.campaign_id, actor_id = %input.actor_id))]
	async fn phase_c(
		&self,
		input: &ResolveTurnInput,
		phase_a: PhaseAOutput,
		llm_output: turn_ports::LlmTurnOutput,
	) -> Result<ResolveTurnResult, EngineError> {
		let PhaseAOutput { token, start_row_version, .. } = phase_a;
		let mut uow = self.store.begin().await?;

		let valid = self
			.claims
			.validate_token(uow.as_mut(), input.campaign_id, input.actor_id, token)
			.await?;
		if !valid {
			uow.rollback().await?;
			self.best_effort_release(input.campaign_id, input.actor_id, token).await;
			return Err(EngineError::ClaimInvalid);
		}

		let Some(campaign) = uow.find_campaign(input.campaign_id).await? else {
			uow.rollback().await?;
			return Err(EngineError::MissingEntity);
		};
		let Some(player) = uow.find_player(input.campaign_id, input.actor_id).await? else {
			uow.rollback().await?;
			return Err(EngineError::MissingEntity);
		};

		if campaign.row_version != start_row_version {
			uow.rollback().await?;
			self.best_effort_release(input.campaign_id, input.actor_id, token).await;
			return Err(EngineError::RowVersionChanged);
		}

		let now = self.claims.now();

		let mut campaign_state =
			mutator::apply_patch(&campaign.state, &llm_output.state_update.fields);
		let current_day = now.timestamp() / 86_400;
		let current_hour = (now.timestamp() % 86_400) / 3_600;
		campaign_state = mutator::apply_calendar_update(
			&campaign_state,
			llm_output.state_update.calendar_update.as_ref(),
			current_day,
			current_hour,
		);
		let campaign_characters = mutator::apply_patch(&campaign.characters, &llm_output.character_updates);
		let mut player_state =
			mutator::apply_patch(&player.state, &llm_output.player_state_update.fields);

		let narration = if llm_output.narration.trim().is_empty() {
			"The world shifts, but nothing clear emerges.".to_string()
		} else {
			llm_output.narration.clone()
		};

		let other_actor_labels: Vec<String> = campaign_characters.keys().cloned().collect();

		let inventory_before: Vec<InventoryItem> = player_state
			.get(turn_types::INVENTORY_KEY)
			.and_then(|v| serde_json::from_value(v.clone()).ok())
			.unwrap_or_default();
		let inventory_after_delta = mutator::apply_inventory_delta(
			&inventory_before,
			&llm_output.player_state_update.inventory_add,
			&llm_output.player_state_update.inventory_remove,
			&narration,
		);
		let mut player_inventory = inventory_after_delta;

		let give_item_outcome = self
			.resolve_give_item(
				&llm_output,
				input.actor_id,
				&inventory_before,
				&player_inventory,
				&other_actor_labels,
				&narration,
			)
			.await;

		let mut outbox: Vec<NewOutboxEvent> = Vec::new();
		let mut target_player_delta: Option<(ActorId, InventoryItem)> = None;

		match &give_item_outcome {
			Some(GiveItemOutcome::Transferred { target_actor_id, item }) => {
				if let Some((source_after, target_item)) = giveitem::transfer_item(
					&player_inventory,
					&[],
					item,
					&input.actor_id.to_string(),
				) {
					player_inventory = source_after;
					if let Some(picked_item) = target_item.into_iter().next() {
						target_player_delta = Some((*target_actor_id, picked_item));
					}
				}
			}
			Some(GiveItemOutcome::InferredTransfer { target_actor_id, item }) => {
				// `player_inventory` already reflects the item's removal (that
				// shrinkage is what `infer_give_item` detected), so there is
				// nothing left to pop from the source — hand the recipient
				// the item directly instead of re-deriving it.
				target_player_delta = Some((
					*target_actor_id,
					InventoryItem {
						name: item.clone(),
						origin: format!("Received from {}", input.actor_id),
					},
				));
			}
			Some(GiveItemOutcome::Unresolved { reason }) => {
				outbox.push(NewOutboxEvent {
					campaign_id: input.campaign_id,
					session_scope: input.session_id,
					event_type: OutboxEventType::GiveItemUnresolved,
					idempotency_key: format!("give_item_unresolved:{}:{}", input.actor_id, reason),
					payload: serde_json::json!({
						"item": llm_output.give_item.as_ref().map(|g| g.item.clone()),
						"reason": reason,
					}),
				});
			}
			None => {}
		}

		player_state.insert(
			turn_types::INVENTORY_KEY.to_string(),
			serde_json::to_value(&player_inventory).unwrap_or(Value::Array(vec![])),
		);

		let summary = if let Some(update) = &llm_output.summary_update {
			if update.trim().is_empty() {
				campaign.summary.clone()
			} else if campaign.summary.is_empty() {
				update.clone()
			} else {
				format!("{}\n{}", campaign.summary, update)
			}
		} else {
			campaign.summary.clone()
		};

		let xp_awarded = llm_output.xp_awarded.max(0);
		let new_xp = player.xp + xp_awarded;

		if input.record_player_turn {
			uow.append_turn(NewTurn {
				campaign_id: input.campaign_id,
				session_id: input.session_id,
				actor_id: Some(input.actor_id),
				kind: TurnKind::Player,
				content: input.action.clone(),
				external_message_id: None,
			})
			.await?;
		}
		let narrator_turn = uow
			.append_turn(NewTurn {
				campaign_id: input.campaign_id,
				session_id: input.session_id,
				actor_id: None,
				kind: TurnKind::Narrator,
				content: narration.clone(),
				external_message_id: None,
			})
			.await?;

		if input.record_player_turn {
			if let Some(active) = uow.find_active_timer(input.campaign_id).await? {
				if active.interruptible {
					uow.cancel_active_timer(input.campaign_id, now).await?;
					uow.append_turn(NewTurn {
						campaign_id: input.campaign_id,
						session_id: input.session_id,
						actor_id: None,
						kind: TurnKind::System,
						content: format!(
							"A lurking countdown (\"{}\") is disrupted by the sudden action.",
							active.event_text
						),
						external_message_id: None,
					})
					.await?;
				}
			}
		}

		let mut timer_instruction_out = None;
		if input.allow_timer_instruction {
			if let Some(instruction) = &llm_output.timer_instruction {
				uow.cancel_active_timer(input.campaign_id, now).await?;
				let delay = crate::timer::TimerScheduler::effective_delay_seconds(
					instruction.delay_seconds.max(MIN_TIMER_DELAY_SECS),
					campaign.speed_multiplier,
				);
				let timer = uow
					.insert_timer(NewTimer {
						campaign_id: input.campaign_id,
						due_at: now + chrono::Duration::seconds(delay),
						event_text: instruction.event_text.clone(),
						interruptible: instruction.interruptible,
						interrupt_action: instruction.interrupt_action.clone(),
					})
					.await?;
				outbox.push(NewOutboxEvent {
					campaign_id: input.campaign_id,
					session_scope: input.session_id,
					event_type: OutboxEventType::TimerScheduled,
					idempotency_key: format!("timer_scheduled:{}", timer.id),
					payload: serde_json::json!({ "timer_id": timer.id.0.to_string() }),
				});
				timer_instruction_out = Some(instruction.clone());
			}
		}

		if let Some(prompt) = &llm_output.scene_image_prompt {
			if !prompt.trim().is_empty() {
				outbox.push(NewOutboxEvent {
					campaign_id: input.campaign_id,
					session_scope: input.session_id,
					event_type: OutboxEventType::SceneImageRequested,
					idempotency_key: format!("scene_image:{}:{}", narrator_turn.id, input.campaign_id),
					payload: serde_json::json!({ "prompt": prompt }),
				});
			}
		}

		for event in outbox {
			uow.insert_outbox_event(event).await?;
		}

		let players = uow.list_players(input.campaign_id).await?;
		let player_snapshots: Vec<PlayerSnapshot> = players
			.iter()
			.map(|p| {
				let (state, level, xp, attributes) = if p.actor_id == input.actor_id {
					(player_state.clone(), player.level, new_xp, player.attributes.clone())
				} else {
					(p.state.clone(), p.level, p.xp, p.attributes.clone())
				};
				PlayerSnapshot { actor_id: p.actor_id, level, xp, attributes, state }
			})
			.collect();

		uow.insert_snapshot(Snapshot {
			id: SnapshotId::new(),
			campaign_id: input.campaign_id,
			turn_id: narrator_turn.id,
			state: campaign_state.clone(),
			characters: campaign_characters.clone(),
			summary: summary.clone(),
			last_narration: narration.clone(),
			players: player_snapshots,
			created_at: now,
		})
		.await?;

		uow.update_player(
			player.id,
			PlayerUpdate {
				level: player.level,
				xp: new_xp,
				attributes: player.attributes.clone(),
				state: player_state.clone(),
				last_active_at: now,
			},
		)
		.await?;

		if let Some((target_actor_id, item)) = target_player_delta {
			let target_player =
				uow.find_or_create_player(input.campaign_id, target_actor_id, now).await?;
			let mut target_inventory = target_player.inventory();
			if !target_inventory.iter().any(|i| i.name.eq_ignore_ascii_case(&item.name)) {
				target_inventory.push(item);
			}
			let mut target_state = target_player.state.clone();
			target_state.insert(
				turn_types::INVENTORY_KEY.to_string(),
				serde_json::to_value(&target_inventory).unwrap_or(Value::Array(vec![])),
			);
			uow.update_player(
				target_player.id,
				PlayerUpdate {
					level: target_player.level,
					xp: target_player.xp,
					attributes: target_player.attributes.clone(),
					state: target_state,
					last_active_at: now,
				},
			)
			.await?;
		}

		let committed = uow
			.cas_update_campaign(
				input.campaign_id,
				start_row_version,
				CampaignUpdate {
					summary,
					state: campaign_state,
					characters: campaign_characters,
					last_narration: narration.clone(),
					memory_visible_max_turn_id: Some(narrator_turn.id),
					speed_multiplier: campaign.speed_multiplier,
					updated_at: now,
				},
			)
			.await?;

		if !committed {
			uow.rollback().await?;
			self.best_effort_release(input.campaign_id, input.actor_id, token).await;
			return Err(EngineError::CasFailed);
		}

		self.claims.release(uow.as_mut(), input.campaign_id, input.actor_id, token).await?;
		uow.commit().await?;

		Ok(ResolveTurnResult::ok(narration, llm_output.scene_image_prompt, timer_instruction_out, give_item_outcome))
	}

	async fn resolve_give_item(
		&self,
		llm_output: &turn_ports::LlmTurnOutput,
		source_actor_id: ActorId,
		inventory_before: &[InventoryItem],
		inventory_after: &[InventoryItem],
		other_actor_labels: &[String],
		narration: &str,
	) -> Option<GiveItemOutcome> {
		if let Some(request) = &llm_output.give_item {
			return Some(self.normalize_give_item(request).await);
		}

		let inferred =
			giveitem::infer_give_item(narration, inventory_before, inventory_after, other_actor_labels)?;
		let target_actor_id = self.resolve_mention(&inferred.target_label).await?;
		if target_actor_id == source_actor_id {
			return None;
		}
		Some(GiveItemOutcome::InferredTransfer { target_actor_id, item: inferred.item })
	}

	async fn normalize_give_item(&self, request: &turn_ports::GiveItemRequest) -> GiveItemOutcome {
		if request.item.trim().is_empty() {
			return GiveItemOutcome::Unresolved { reason: "missing_item".to_string() };
		}

		let target_actor_id = if let Some(raw) = &request.to_actor_id {
			uuid::Uuid::parse_str(raw).ok().map(ActorId::from)
		} else {
			None
		};

		let target_actor_id = match target_actor_id {
			Some(id) => Some(id),
			None => {
				if let Some(mention) = &request.to_discord_mention {
					self.resolve_mention(mention).await
				} else {
					None
				}
			}
		};

		match target_actor_id {
			Some(target_actor_id) => GiveItemOutcome::Transferred { target_actor_id, item: request.item.clone() },
			None => GiveItemOutcome::Unresolved { reason: "unresolved_target".to_string() },
		}
	}

	async fn resolve_mention(&self, mention: &str) -> Option<ActorId> {
		let resolver = self.actor_resolver.as_ref()?;
		resolver.resolve_discord_mention(mention).await.ok().flatten()
	}

	async fn best_effort_release(&self, campaign_id: CampaignId, actor_id: ActorId, token: ClaimToken) {
		if let Ok(mut uow) = self.store.begin().await {
			let _ = self.claims.release(uow.as_mut(), campaign_id, actor_id, token).await;
			let _ = uow.commit().await;
		}
	}
}
