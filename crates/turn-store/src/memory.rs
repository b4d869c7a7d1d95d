//! An in-process, hermetic `Store` for tests. No isolation between
//! concurrently open transactions against *different* campaigns is
//! attempted — within one test scenario only one `UnitOfWork` is ever open
//! at a time, save for the deliberate "sidecar" races exercised via
//! [`MemoryStore::debug_bump_campaign_row_version`], which intentionally
//! bypasses the transactional boundary the same way a second, independent
//! database client would. Grounded on the `RwLock<HashMap>` shape of
//! `neuron-state-memory`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use turn_types::{
	ActorId, CampaignId, ClaimToken, InflightTurn, NewOutboxEvent, OutboxEvent, OutboxStatus,
	Player, PlayerId, PlayerSnapshot, SessionId, Timer, TimerId, TimerStatus, Turn, TurnId,
};
use turn_types::{Campaign, Snapshot};

use crate::error::StoreError;
use crate::repo::{
	CampaignRepository, CampaignUpdate, InflightRepository, NewTimer, NewTurn, OutboxRepository,
	PlayerRepository, PlayerUpdate, SnapshotRepository, Store, TimerRepository, TurnRepository,
	UnitOfWork,
};

#[derive(Default, Clone)]
struct MemoryData {
	campaigns: HashMap<CampaignId, Campaign>,
	players: HashMap<PlayerId, Player>,
	players_by_actor: HashMap<(CampaignId, ActorId), PlayerId>,
	turns: Vec<Turn>,
	next_turn_id: i64,
	snapshots: HashMap<(CampaignId, TurnId), Snapshot>,
	timers: HashMap<TimerId, Timer>,
	inflight: HashMap<(CampaignId, ActorId), InflightTurn>,
	outbox: Vec<OutboxEvent>,
}

pub struct MemoryStore {
	data: Arc<RwLock<MemoryData>>,
}

impl Default for MemoryStore {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryStore {
	pub fn new() -> Self {
		Self { data: Arc::new(RwLock::new(MemoryData::default())) }
	}

	/// Directly insert a campaign, bypassing any `UnitOfWork`. Test setup
	/// helper; production callers go through migrations + an admin path
	/// outside this crate (§3 Lifecycle: campaigns are created out of band).
	pub async fn seed_campaign(&self, campaign: Campaign) {
		self.data.write().await.campaigns.insert(campaign.id, campaign);
	}

	/// Simulates a concurrent writer bumping a campaign's `row_version`
	/// without going through `resolve_turn`, for exercising the optimistic
	/// concurrency conflict path (§8 scenario (a)).
	pub async fn debug_bump_campaign_row_version(&self, id: CampaignId) {
		if let Some(c) = self.data.write().await.campaigns.get_mut(&id) {
			c.row_version += 1;
			c.updated_at = Utc::now();
		}
	}

	/// Inspect the outbox rows for a campaign. Test assertion helper; a real
	/// dispatcher drains this table through its own connection, not through
	/// `turn-store` (§8 scenario (d)).
	pub async fn debug_outbox_events(&self, campaign_id: CampaignId) -> Vec<OutboxEvent> {
		self.data
			.read()
			.await
			.outbox
			.iter()
			.filter(|e| e.campaign_id == campaign_id)
			.cloned()
			.collect()
	}

	/// Snapshot the turns currently stored for a campaign, oldest first.
	/// Test assertion helper (§8 scenario (c)).
	pub async fn debug_turns(&self, campaign_id: CampaignId) -> Vec<Turn> {
		self.data
			.read()
			.await
			.turns
			.iter()
			.filter(|t| t.campaign_id == campaign_id)
			.cloned()
			.collect()
	}
}

#[async_trait]
impl Store for MemoryStore {
	async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
		let local = self.data.read().await.clone();
		Ok(Box::new(MemoryUnitOfWork {
			shared: self.data.clone(),
			local,
			campaign_cas_checks: Vec::new(),
		}))
	}
}

/// A private, copy-on-begin workspace. Reads within the transaction see
/// this fork; [`commit`](UnitOfWork::commit) re-validates every campaign
/// this transaction CAS'd against the live shared state and, if all still
/// match, replaces the shared state wholesale with the fork. A transaction
/// that never calls `cas_update_campaign` commits unconditionally.
struct MemoryUnitOfWork {
	shared: Arc<RwLock<MemoryData>>,
	local: MemoryData,
	campaign_cas_checks: Vec<(CampaignId, i64)>,
}

#[async_trait]
impl CampaignRepository for MemoryUnitOfWork {
	async fn find_campaign(&mut self, id: CampaignId) -> Result<Option<Campaign>, StoreError> {
		Ok(self.local.campaigns.get(&id).cloned())
	}

	async fn cas_update_campaign(
		&mut self,
		id: CampaignId,
		expected_row_version: i64,
		update: CampaignUpdate,
	) -> Result<bool, StoreError> {
		let Some(campaign) = self.local.campaigns.get_mut(&id) else {
			return Ok(false);
		};
		if campaign.row_version != expected_row_version {
			return Ok(false);
		}
		campaign.summary = update.summary;
		campaign.state = update.state;
		campaign.characters = update.characters;
		campaign.last_narration = update.last_narration;
		campaign.memory_visible_max_turn_id = update.memory_visible_max_turn_id;
		campaign.speed_multiplier = update.speed_multiplier;
		campaign.row_version += 1;
		campaign.updated_at = update.updated_at;
		self.campaign_cas_checks.push((id, expected_row_version));
		Ok(true)
	}
}

#[async_trait]
impl PlayerRepository for MemoryUnitOfWork {
	async fn find_player(
		&mut self,
		campaign_id: CampaignId,
		actor_id: ActorId,
	) -> Result<Option<Player>, StoreError> {
		Ok(self
			.local
			.players_by_actor
			.get(&(campaign_id, actor_id))
			.and_then(|id| self.local.players.get(id))
			.cloned())
	}

	async fn find_or_create_player(
		&mut self,
		campaign_id: CampaignId,
		actor_id: ActorId,
		now: DateTime<Utc>,
	) -> Result<Player, StoreError> {
		if let Some(player) = self.find_player(campaign_id, actor_id).await? {
			return Ok(player);
		}
		let player = Player {
			id: PlayerId::new(),
			campaign_id,
			actor_id,
			level: 1,
			xp: 0,
			attributes: Default::default(),
			state: Default::default(),
			last_active_at: now,
		};
		self.local.players_by_actor.insert((campaign_id, actor_id), player.id);
		self.local.players.insert(player.id, player.clone());
		Ok(player)
	}

	async fn update_player(&mut self, id: PlayerId, update: PlayerUpdate) -> Result<(), StoreError> {
		let player = self.local.players.get_mut(&id).ok_or(StoreError::NotFound)?;
		player.level = update.level;
		player.xp = update.xp;
		player.attributes = update.attributes;
		player.state = update.state;
		player.last_active_at = update.last_active_at;
		Ok(())
	}

	async fn list_players(&mut self, campaign_id: CampaignId) -> Result<Vec<Player>, StoreError> {
		Ok(self
			.local
			.players
			.values()
			.filter(|p| p.campaign_id == campaign_id)
			.cloned()
			.collect())
	}

	async fn restore_player(
		&mut self,
		campaign_id: CampaignId,
		snapshot: &PlayerSnapshot,
	) -> Result<(), StoreError> {
		let player = self.find_or_create_player(campaign_id, snapshot.actor_id, Utc::now()).await?;
		let player = self.local.players.get_mut(&player.id).expect("just created or found");
		player.level = snapshot.level;
		player.xp = snapshot.xp;
		player.attributes = snapshot.attributes.clone();
		player.state = snapshot.state.clone();
		Ok(())
	}
}

#[async_trait]
impl TurnRepository for MemoryUnitOfWork {
	async fn append_turn(&mut self, turn: NewTurn) -> Result<Turn, StoreError> {
		self.local.next_turn_id += 1;
		let row = Turn {
			id: TurnId(self.local.next_turn_id),
			campaign_id: turn.campaign_id,
			session_id: turn.session_id,
			actor_id: turn.actor_id,
			kind: turn.kind,
			content: turn.content,
			external_message_id: turn.external_message_id,
			created_at: Utc::now(),
		};
		self.local.turns.push(row.clone());
		Ok(row)
	}

	async fn recent_turns(
		&mut self,
		campaign_id: CampaignId,
		limit: i64,
	) -> Result<Vec<Turn>, StoreError> {
		let mut turns: Vec<Turn> =
			self.local.turns.iter().filter(|t| t.campaign_id == campaign_id).cloned().collect();
		turns.sort_by_key(|t| t.id);
		let len = turns.len();
		let start = len.saturating_sub(limit.max(0) as usize);
		Ok(turns.split_off(start))
	}

	async fn latest_turn(&mut self, campaign_id: CampaignId) -> Result<Option<Turn>, StoreError> {
		Ok(self
			.local
			.turns
			.iter()
			.filter(|t| t.campaign_id == campaign_id)
			.max_by_key(|t| t.id)
			.cloned())
	}

	async fn delete_turns_after(
		&mut self,
		campaign_id: CampaignId,
		target_turn_id: TurnId,
		session_scope: Option<&[SessionId]>,
	) -> Result<u64, StoreError> {
		let before = self.local.turns.len();
		self.local.turns.retain(|t| {
			let in_range = t.campaign_id == campaign_id && t.id > target_turn_id;
			if !in_range {
				return true;
			}
			match session_scope {
				None => false,
				Some(sessions) => !t.session_id.is_some_and(|sid| sessions.contains(&sid)),
			}
		});
		Ok((before - self.local.turns.len()) as u64)
	}
}

#[async_trait]
impl SnapshotRepository for MemoryUnitOfWork {
	async fn insert_snapshot(&mut self, snapshot: Snapshot) -> Result<(), StoreError> {
		self.local.snapshots.insert((snapshot.campaign_id, snapshot.turn_id), snapshot);
		Ok(())
	}

	async fn find_snapshot_at_turn(
		&mut self,
		campaign_id: CampaignId,
		turn_id: TurnId,
	) -> Result<Option<Snapshot>, StoreError> {
		Ok(self.local.snapshots.get(&(campaign_id, turn_id)).cloned())
	}

	async fn find_snapshot_at_or_before(
		&mut self,
		campaign_id: CampaignId,
		turn_id: TurnId,
	) -> Result<Option<Snapshot>, StoreError> {
		Ok(self
			.local
			.snapshots
			.values()
			.filter(|s| s.campaign_id == campaign_id && s.turn_id <= turn_id)
			.max_by_key(|s| s.turn_id)
			.cloned())
	}

	async fn delete_snapshots_after(
		&mut self,
		campaign_id: CampaignId,
		target_turn_id: TurnId,
	) -> Result<u64, StoreError> {
		let before = self.local.snapshots.len();
		self.local
			.snapshots
			.retain(|(c, t), _| !(*c == campaign_id && *t > target_turn_id));
		Ok((before - self.local.snapshots.len()) as u64)
	}
}

#[async_trait]
impl TimerRepository for MemoryUnitOfWork {
	async fn find_active_timer(
		&mut self,
		campaign_id: CampaignId,
	) -> Result<Option<Timer>, StoreError> {
		Ok(self
			.local
			.timers
			.values()
			.find(|t| t.campaign_id == campaign_id && t.status.is_active())
			.cloned())
	}

	async fn cancel_active_timer(
		&mut self,
		campaign_id: CampaignId,
		now: DateTime<Utc>,
	) -> Result<u64, StoreError> {
		let mut count = 0;
		for timer in self.local.timers.values_mut() {
			if timer.campaign_id == campaign_id && timer.status.is_active() {
				timer.status = TimerStatus::Cancelled;
				timer.updated_at = now;
				count += 1;
			}
		}
		Ok(count)
	}

	async fn insert_timer(&mut self, timer: NewTimer) -> Result<Timer, StoreError> {
		let now = Utc::now();
		let row = Timer {
			id: TimerId::new(),
			campaign_id: timer.campaign_id,
			status: TimerStatus::ScheduledUnbound,
			due_at: timer.due_at,
			event_text: timer.event_text,
			interruptible: timer.interruptible,
			interrupt_action: timer.interrupt_action,
			external_message_id: None,
			external_channel_id: None,
			created_at: now,
			updated_at: now,
		};
		self.local.timers.insert(row.id, row.clone());
		Ok(row)
	}

	async fn attach_timer_message(
		&mut self,
		id: TimerId,
		external_message_id: String,
		external_channel_id: String,
		now: DateTime<Utc>,
	) -> Result<bool, StoreError> {
		let Some(timer) = self.local.timers.get_mut(&id) else { return Ok(false) };
		if !timer.status.is_active() {
			return Ok(false);
		}
		timer.status = TimerStatus::ScheduledBound;
		timer.external_message_id = Some(external_message_id);
		timer.external_channel_id = Some(external_channel_id);
		timer.updated_at = now;
		Ok(true)
	}

	async fn mark_timer_expired(&mut self, id: TimerId, now: DateTime<Utc>) -> Result<bool, StoreError> {
		let Some(timer) = self.local.timers.get_mut(&id) else { return Ok(false) };
		if !timer.status.is_active() {
			return Ok(false);
		}
		timer.status = TimerStatus::Expired;
		timer.updated_at = now;
		Ok(true)
	}

	async fn mark_timer_consumed(&mut self, id: TimerId, now: DateTime<Utc>) -> Result<bool, StoreError> {
		let Some(timer) = self.local.timers.get_mut(&id) else { return Ok(false) };
		if timer.status != TimerStatus::Expired {
			return Ok(false);
		}
		timer.status = TimerStatus::Consumed;
		timer.updated_at = now;
		Ok(true)
	}

	async fn list_active_timers(&mut self) -> Result<Vec<Timer>, StoreError> {
		Ok(self.local.timers.values().filter(|t| t.status.is_active()).cloned().collect())
	}
}

#[async_trait]
impl InflightRepository for MemoryUnitOfWork {
	async fn find_inflight(
		&mut self,
		campaign_id: CampaignId,
		actor_id: ActorId,
	) -> Result<Option<InflightTurn>, StoreError> {
		Ok(self.local.inflight.get(&(campaign_id, actor_id)).cloned())
	}

	async fn acquire_or_steal_lease(
		&mut self,
		campaign_id: CampaignId,
		actor_id: ActorId,
		token: ClaimToken,
		now: DateTime<Utc>,
		expires_at: DateTime<Utc>,
	) -> Result<bool, StoreError> {
		if let Some(existing) = self.local.inflight.get(&(campaign_id, actor_id)) {
			if existing.expires_at > now {
				return Ok(false);
			}
		}
		self.local.inflight.insert(
			(campaign_id, actor_id),
			InflightTurn { campaign_id, actor_id, claim_token: token, claimed_at: now, heartbeat_at: now, expires_at },
		);
		Ok(true)
	}

	async fn heartbeat_lease(
		&mut self,
		campaign_id: CampaignId,
		actor_id: ActorId,
		token: ClaimToken,
		new_expires_at: DateTime<Utc>,
	) -> Result<bool, StoreError> {
		let Some(lease) = self.local.inflight.get_mut(&(campaign_id, actor_id)) else {
			return Ok(false);
		};
		if lease.claim_token.0 != token.0 {
			return Ok(false);
		}
		lease.heartbeat_at = Utc::now();
		lease.expires_at = new_expires_at;
		Ok(true)
	}

	async fn release_lease(
		&mut self,
		campaign_id: CampaignId,
		actor_id: ActorId,
		token: ClaimToken,
	) -> Result<bool, StoreError> {
		match self.local.inflight.get(&(campaign_id, actor_id)) {
			Some(lease) if lease.claim_token.0 == token.0 => {
				self.local.inflight.remove(&(campaign_id, actor_id));
				Ok(true)
			}
			_ => Ok(false),
		}
	}
}

#[async_trait]
impl OutboxRepository for MemoryUnitOfWork {
	async fn insert_outbox_event(&mut self, event: NewOutboxEvent) -> Result<bool, StoreError> {
		let duplicate = self.local.outbox.iter().any(|e| {
			e.campaign_id == event.campaign_id
				&& e.session_scope == event.session_scope
				&& e.event_type == event.event_type
				&& e.idempotency_key == event.idempotency_key
		});
		if duplicate {
			return Ok(false);
		}
		let now = Utc::now();
		self.local.outbox.push(OutboxEvent {
			campaign_id: event.campaign_id,
			session_scope: event.session_scope,
			event_type: event.event_type,
			idempotency_key: event.idempotency_key,
			payload: event.payload,
			status: OutboxStatus::Pending,
			attempts: 0,
			next_attempt_at: now,
			created_at: now,
		});
		Ok(true)
	}
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
	async fn commit(self: Box<Self>) -> Result<(), StoreError> {
		let mut shared = self.shared.write().await;
		for (id, expected) in &self.campaign_cas_checks {
			let live_version = shared.campaigns.get(id).map(|c| c.row_version);
			if live_version != Some(*expected) {
				return Err(StoreError::Conflict);
			}
		}
		*shared = self.local;
		Ok(())
	}

	async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
		Ok(())
	}
}
