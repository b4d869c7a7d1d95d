use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use turn_types::{
	ActorId, CampaignId, ClaimToken, InflightTurn, NewOutboxEvent, Player, PlayerId, SessionId,
	Timer, TimerId, Turn, TurnId,
};
use turn_types::{Campaign, Snapshot};

use crate::error::StoreError;

/// Fields a successful turn resolution (or rewind) writes back onto the
/// `Campaign` aggregate, gated by the compare-and-set on `row_version`
/// (§4.2 step 13, §4.6).
#[derive(Debug, Clone)]
pub struct CampaignUpdate {
	pub summary: String,
	pub state: Map<String, Value>,
	pub characters: Map<String, Value>,
	pub last_narration: String,
	pub memory_visible_max_turn_id: Option<TurnId>,
	pub speed_multiplier: f64,
	pub updated_at: DateTime<Utc>,
}

/// Fields written back onto a `Player` as part of the same transaction as
/// a `CampaignUpdate`. Players carry no version of their own: their
/// durability rides on the campaign's CAS (§3, §5).
#[derive(Debug, Clone)]
pub struct PlayerUpdate {
	pub level: i32,
	pub xp: i64,
	pub attributes: Map<String, Value>,
	pub state: Map<String, Value>,
	pub last_active_at: DateTime<Utc>,
}

/// A `Turn` row to append; the store assigns `id` and `created_at` (§3).
#[derive(Debug, Clone)]
pub struct NewTurn {
	pub campaign_id: CampaignId,
	pub session_id: Option<SessionId>,
	pub actor_id: Option<ActorId>,
	pub kind: turn_types::TurnKind,
	pub content: String,
	pub external_message_id: Option<String>,
}

/// A `Timer` to schedule; the store assigns `id`, `created_at`, `updated_at`
/// (§4.5).
#[derive(Debug, Clone)]
pub struct NewTimer {
	pub campaign_id: CampaignId,
	pub due_at: DateTime<Utc>,
	pub event_text: String,
	pub interruptible: bool,
	pub interrupt_action: Option<String>,
}

#[async_trait]
pub trait CampaignRepository: Send {
	async fn find_campaign(&mut self, id: CampaignId) -> Result<Option<Campaign>, StoreError>;

	/// Apply `update` to `id` iff its live `row_version` still equals
	/// `expected_row_version`, bumping the version by one. Returns `false`
	/// (never an error) on a version mismatch; `resolve_turn`/`rewind_to_turn`
	/// decide what that means (§4.2 step 13, §5).
	async fn cas_update_campaign(
		&mut self,
		id: CampaignId,
		expected_row_version: i64,
		update: CampaignUpdate,
	) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait PlayerRepository: Send {
	async fn find_player(
		&mut self,
		campaign_id: CampaignId,
		actor_id: ActorId,
	) -> Result<Option<Player>, StoreError>;

	/// Create a player row with default fields if one does not already
	/// exist for `(campaign_id, actor_id)` (§3 Lifecycle: "created lazily on
	/// first reference").
	async fn find_or_create_player(
		&mut self,
		campaign_id: CampaignId,
		actor_id: ActorId,
		now: DateTime<Utc>,
	) -> Result<Player, StoreError>;

	async fn update_player(
		&mut self,
		id: PlayerId,
		update: PlayerUpdate,
	) -> Result<(), StoreError>;

	async fn list_players(&mut self, campaign_id: CampaignId) -> Result<Vec<Player>, StoreError>;

	/// Overwrite a player's mutable fields from a `PlayerSnapshot` taken at
	/// an earlier turn (§4.6).
	async fn restore_player(
		&mut self,
		campaign_id: CampaignId,
		snapshot: &turn_types::PlayerSnapshot,
	) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TurnRepository: Send {
	async fn append_turn(&mut self, turn: NewTurn) -> Result<Turn, StoreError>;

	/// The most recent `limit` turns for `campaign_id`, oldest first (§4.2
	/// step A.2, the recent-turn window).
	async fn recent_turns(
		&mut self,
		campaign_id: CampaignId,
		limit: i64,
	) -> Result<Vec<Turn>, StoreError>;

	async fn latest_turn(&mut self, campaign_id: CampaignId) -> Result<Option<Turn>, StoreError>;

	/// Permanently remove every turn with `id > target_turn_id` for the
	/// campaign (§4.6 rewind). When `session_scope` is `Some`, only turns
	/// whose `session_id` is in that set are removed (channel-scoped
	/// rewind); `None` removes every later turn regardless of session.
	/// Returns the number of rows deleted.
	async fn delete_turns_after(
		&mut self,
		campaign_id: CampaignId,
		target_turn_id: TurnId,
		session_scope: Option<&[SessionId]>,
	) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait SnapshotRepository: Send {
	async fn insert_snapshot(&mut self, snapshot: Snapshot) -> Result<(), StoreError>;

	async fn find_snapshot_at_turn(
		&mut self,
		campaign_id: CampaignId,
		turn_id: TurnId,
	) -> Result<Option<Snapshot>, StoreError>;

	/// The latest snapshot at or before `turn_id`, used when `rewind_to_turn`
	/// targets a non-narrator turn (§4.6).
	async fn find_snapshot_at_or_before(
		&mut self,
		campaign_id: CampaignId,
		turn_id: TurnId,
	) -> Result<Option<Snapshot>, StoreError>;

	async fn delete_snapshots_after(
		&mut self,
		campaign_id: CampaignId,
		target_turn_id: TurnId,
	) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait TimerRepository: Send {
	async fn find_active_timer(
		&mut self,
		campaign_id: CampaignId,
	) -> Result<Option<Timer>, StoreError>;

	/// Transition every active timer for `campaign_id` to `Cancelled`.
	/// Returns the number of rows transitioned (0 or 1, per the at-most-one
	/// invariant).
	async fn cancel_active_timer(
		&mut self,
		campaign_id: CampaignId,
		now: DateTime<Utc>,
	) -> Result<u64, StoreError>;

	async fn insert_timer(&mut self, timer: NewTimer) -> Result<Timer, StoreError>;

	/// Bind an external message/channel id onto an active timer; fails
	/// silently (returns `false`) if the timer is no longer active (§4.5).
	async fn attach_timer_message(
		&mut self,
		id: TimerId,
		external_message_id: String,
		external_channel_id: String,
		now: DateTime<Utc>,
	) -> Result<bool, StoreError>;

	/// `ScheduledUnbound|ScheduledBound -> Expired`. Idempotent: returns
	/// `false` if the row was not in an active state.
	async fn mark_timer_expired(&mut self, id: TimerId, now: DateTime<Utc>) -> Result<bool, StoreError>;

	/// `Expired -> Consumed`. Idempotent: returns `false` if the row was not
	/// `Expired`.
	async fn mark_timer_consumed(&mut self, id: TimerId, now: DateTime<Utc>) -> Result<bool, StoreError>;

	/// Every active timer across every campaign, for process-start recovery
	/// of the in-process scheduler (SPEC_FULL §4.5 "In-process runtime").
	async fn list_active_timers(&mut self) -> Result<Vec<Timer>, StoreError>;
}

#[async_trait]
pub trait InflightRepository: Send {
	async fn find_inflight(
		&mut self,
		campaign_id: CampaignId,
		actor_id: ActorId,
	) -> Result<Option<InflightTurn>, StoreError>;

	/// Insert a new lease row, or steal an existing one whose `expires_at`
	/// has already passed. Returns `false` if a live, unexpired lease
	/// already exists (§4.1).
	async fn acquire_or_steal_lease(
		&mut self,
		campaign_id: CampaignId,
		actor_id: ActorId,
		token: ClaimToken,
		now: DateTime<Utc>,
		expires_at: DateTime<Utc>,
	) -> Result<bool, StoreError>;

	/// Extend `expires_at` on the row matching `token` exactly. Returns
	/// `false` if the token no longer matches (lost, stolen, or already
	/// released).
	async fn heartbeat_lease(
		&mut self,
		campaign_id: CampaignId,
		actor_id: ActorId,
		token: ClaimToken,
		new_expires_at: DateTime<Utc>,
	) -> Result<bool, StoreError>;

	/// Delete the row matching `token` exactly. Returns `false` if it had
	/// already been stolen or released.
	async fn release_lease(
		&mut self,
		campaign_id: CampaignId,
		actor_id: ActorId,
		token: ClaimToken,
	) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait OutboxRepository: Send {
	/// Insert a row, silently dropping duplicates on `(campaign_id,
	/// session_scope, event_type, idempotency_key)` (§3, §8 invariant 5).
	/// Returns whether a new row was actually inserted.
	async fn insert_outbox_event(&mut self, event: NewOutboxEvent) -> Result<bool, StoreError>;
}

/// One transactional unit of work spanning every repository. Dropping a
/// `UnitOfWork` without calling [`commit`](UnitOfWork::commit) rolls it
/// back (§2 component table: "UnitOfWork").
#[async_trait]
pub trait UnitOfWork:
	CampaignRepository
	+ PlayerRepository
	+ TurnRepository
	+ SnapshotRepository
	+ TimerRepository
	+ InflightRepository
	+ OutboxRepository
	+ Send
{
	async fn commit(self: Box<Self>) -> Result<(), StoreError>;

	async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// The top-level handle `turn-engine` depends on. Opens a fresh
/// [`UnitOfWork`] per logical operation (Phase A, Phase C, a heartbeat, a
/// timer transition, a rewind) — never held across an `await` on an
/// external port (§5).
#[async_trait]
pub trait Store: Send + Sync {
	async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;
}
