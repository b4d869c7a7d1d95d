//! A CockroachDB/PostgreSQL-backed `Store`, grounded on the `PgPoolOptions`
//! setup idiom in `rivet-pools`' `db/crdb.rs`. Every [`UnitOfWork`] wraps
//! one `sqlx::Transaction`; `commit`/`rollback` map directly onto
//! `COMMIT`/`ROLLBACK`, so the compare-and-set races described in SPEC_FULL
//! §5 are handled by the database itself, not reimplemented here.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use turn_types::{
	ActorId, CampaignId, ClaimToken, InflightTurn, NewOutboxEvent, Player, PlayerId, PlayerSnapshot,
	SessionId, Timer, TimerId, TimerStatus, Turn, TurnId, TurnKind,
};
use turn_types::{Campaign, Snapshot};

use crate::error::StoreError;
use crate::repo::{
	CampaignRepository, CampaignUpdate, InflightRepository, NewTimer, NewTurn, OutboxRepository,
	PlayerRepository, PlayerUpdate, SnapshotRepository, Store, TimerRepository, TurnRepository,
	UnitOfWork,
};

/// Connection knobs the caller wants to override; everything else takes
/// `rivet-pools`' defaults (SPEC_FULL §2.1).
#[derive(Debug, Clone)]
pub struct PostgresConfig {
	pub url: String,
	pub min_connections: u32,
	pub max_connections: u32,
	pub acquire_timeout: Duration,
}

pub struct PgStore {
	pool: PgPool,
}

impl PgStore {
	#[tracing::instrument(skip(config))]
	pub async fn connect(config: PostgresConfig) -> Result<Self, StoreError> {
		let opts: PgConnectOptions = config.url.parse().map_err(sqlx::Error::from)?;

		let pool = PgPoolOptions::new()
			.acquire_timeout(config.acquire_timeout)
			.min_connections(config.min_connections)
			.max_connections(config.max_connections)
			.test_before_acquire(true)
			.connect_with(opts)
			.await?;

		Ok(Self { pool })
	}

	pub fn pool(&self) -> &PgPool {
		&self.pool
	}
}

#[async_trait]
impl Store for PgStore {
	async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
		let tx = self.pool.begin().await?;
		Ok(Box::new(PgUnitOfWork { tx: Some(tx) }))
	}
}

struct PgUnitOfWork {
	tx: Option<Transaction<'static, Postgres>>,
}

impl PgUnitOfWork {
	fn tx(&mut self) -> &mut Transaction<'static, Postgres> {
		self.tx.as_mut().expect("unit of work used after commit/rollback")
	}
}

fn row_to_campaign(row: sqlx::postgres::PgRow) -> Result<Campaign, StoreError> {
	Ok(Campaign {
		id: row.try_get::<uuid::Uuid, _>("id")?.into(),
		namespace: row.try_get("namespace")?,
		name: row.try_get("name")?,
		name_normalized: row.try_get("name_normalized")?,
		summary: row.try_get("summary")?,
		state: json_to_map(row.try_get("state")?),
		characters: json_to_map(row.try_get("characters")?),
		last_narration: row.try_get("last_narration")?,
		memory_visible_max_turn_id: row.try_get::<Option<i64>, _>("memory_visible_max_turn_id")?.map(TurnId),
		speed_multiplier: row.try_get("speed_multiplier")?,
		row_version: row.try_get("row_version")?,
		created_at: row.try_get("created_at")?,
		updated_at: row.try_get("updated_at")?,
	})
}

fn json_to_map(value: Value) -> serde_json::Map<String, Value> {
	match value {
		Value::Object(map) => map,
		_ => serde_json::Map::new(),
	}
}

fn row_to_player(row: sqlx::postgres::PgRow) -> Result<Player, StoreError> {
	Ok(Player {
		id: row.try_get::<uuid::Uuid, _>("id")?.into(),
		campaign_id: row.try_get::<uuid::Uuid, _>("campaign_id")?.into(),
		actor_id: row.try_get::<uuid::Uuid, _>("actor_id")?.into(),
		level: row.try_get("level")?,
		xp: row.try_get("xp")?,
		attributes: json_to_map(row.try_get("attributes")?),
		state: json_to_map(row.try_get("state")?),
		last_active_at: row.try_get("last_active_at")?,
	})
}

fn row_to_turn(row: sqlx::postgres::PgRow) -> Result<Turn, StoreError> {
	let kind: String = row.try_get("kind")?;
	Ok(Turn {
		id: TurnId(row.try_get("id")?),
		campaign_id: row.try_get::<uuid::Uuid, _>("campaign_id")?.into(),
		session_id: row.try_get::<Option<uuid::Uuid>, _>("session_id")?.map(Into::into),
		actor_id: row.try_get::<Option<uuid::Uuid>, _>("actor_id")?.map(Into::into),
		kind: parse_turn_kind(&kind),
		content: row.try_get("content")?,
		external_message_id: row.try_get("external_message_id")?,
		created_at: row.try_get("created_at")?,
	})
}

fn turn_kind_db_str(kind: TurnKind) -> &'static str {
	match kind {
		TurnKind::Player => "player",
		TurnKind::Narrator => "narrator",
		TurnKind::System => "system",
	}
}

fn parse_turn_kind(s: &str) -> TurnKind {
	match s {
		"player" => TurnKind::Player,
		"system" => TurnKind::System,
		_ => TurnKind::Narrator,
	}
}

fn row_to_snapshot(row: sqlx::postgres::PgRow) -> Result<Snapshot, StoreError> {
	let players_json: Value = row.try_get("players")?;
	let players: Vec<PlayerSnapshot> = serde_json::from_value(players_json).unwrap_or_default();
	Ok(Snapshot {
		id: row.try_get::<uuid::Uuid, _>("id")?.into(),
		campaign_id: row.try_get::<uuid::Uuid, _>("campaign_id")?.into(),
		turn_id: TurnId(row.try_get("turn_id")?),
		state: json_to_map(row.try_get("state")?),
		characters: json_to_map(row.try_get("characters")?),
		summary: row.try_get("summary")?,
		last_narration: row.try_get("last_narration")?,
		players,
		created_at: row.try_get("created_at")?,
	})
}

fn row_to_timer(row: sqlx::postgres::PgRow) -> Result<Timer, StoreError> {
	let status: String = row.try_get("status")?;
	Ok(Timer {
		id: row.try_get::<uuid::Uuid, _>("id")?.into(),
		campaign_id: row.try_get::<uuid::Uuid, _>("campaign_id")?.into(),
		status: parse_timer_status(&status),
		due_at: row.try_get("due_at")?,
		event_text: row.try_get("event_text")?,
		interruptible: row.try_get("interruptible")?,
		interrupt_action: row.try_get("interrupt_action")?,
		external_message_id: row.try_get("external_message_id")?,
		external_channel_id: row.try_get("external_channel_id")?,
		created_at: row.try_get("created_at")?,
		updated_at: row.try_get("updated_at")?,
	})
}

fn parse_timer_status(s: &str) -> TimerStatus {
	match s {
		"scheduled_unbound" => TimerStatus::ScheduledUnbound,
		"scheduled_bound" => TimerStatus::ScheduledBound,
		"cancelled" => TimerStatus::Cancelled,
		"expired" => TimerStatus::Expired,
		_ => TimerStatus::Consumed,
	}
}

fn row_to_inflight(row: sqlx::postgres::PgRow) -> Result<InflightTurn, StoreError> {
	Ok(InflightTurn {
		campaign_id: row.try_get::<uuid::Uuid, _>("campaign_id")?.into(),
		actor_id: row.try_get::<uuid::Uuid, _>("actor_id")?.into(),
		claim_token: row.try_get::<uuid::Uuid, _>("claim_token")?.into(),
		claimed_at: row.try_get("claimed_at")?,
		heartbeat_at: row.try_get("heartbeat_at")?,
		expires_at: row.try_get("expires_at")?,
	})
}

#[async_trait]
impl CampaignRepository for PgUnitOfWork {
	async fn find_campaign(&mut self, id: CampaignId) -> Result<Option<Campaign>, StoreError> {
		let row = sqlx::query("SELECT * FROM campaigns WHERE id = $1")
			.bind(id.0)
			.fetch_optional(&mut *self.tx())
			.await?;
		row.map(row_to_campaign).transpose()
	}

	async fn cas_update_campaign(
		&mut self,
		id: CampaignId,
		expected_row_version: i64,
		update: CampaignUpdate,
	) -> Result<bool, StoreError> {
		let result = sqlx::query(
			"UPDATE campaigns SET summary = $1, state = $2, characters = $3, last_narration = $4,
				memory_visible_max_turn_id = $5, speed_multiplier = $6, row_version = row_version + 1,
				updated_at = $7
			WHERE id = $8 AND row_version = $9",
		)
		.bind(update.summary)
		.bind(Value::Object(update.state))
		.bind(Value::Object(update.characters))
		.bind(update.last_narration)
		.bind(update.memory_visible_max_turn_id.map(|t| t.0))
		.bind(update.speed_multiplier)
		.bind(update.updated_at)
		.bind(id.0)
		.bind(expected_row_version)
		.execute(&mut *self.tx())
		.await?;
		Ok(result.rows_affected() == 1)
	}
}

#[async_trait]
impl PlayerRepository for PgUnitOfWork {
	async fn find_player(
		&mut self,
		campaign_id: CampaignId,
		actor_id: ActorId,
	) -> Result<Option<Player>, StoreError> {
		let row = sqlx::query("SELECT * FROM players WHERE campaign_id = $1 AND actor_id = $2")
			.bind(campaign_id.0)
			.bind(actor_id.0)
			.fetch_optional(&mut *self.tx())
			.await?;
		row.map(row_to_player).transpose()
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
		let id = PlayerId::new();
		sqlx::query(
			"INSERT INTO players (id, campaign_id, actor_id, level, xp, attributes, state, last_active_at)
			VALUES ($1, $2, $3, 1, 0, '{}'::jsonb, '{}'::jsonb, $4)
			ON CONFLICT (campaign_id, actor_id) DO NOTHING",
		)
		.bind(id.0)
		.bind(campaign_id.0)
		.bind(actor_id.0)
		.bind(now)
		.execute(&mut *self.tx())
		.await?;
		self.find_player(campaign_id, actor_id)
			.await?
			.ok_or(StoreError::NotFound)
	}

	async fn update_player(&mut self, id: PlayerId, update: PlayerUpdate) -> Result<(), StoreError> {
		let result = sqlx::query(
			"UPDATE players SET level = $1, xp = $2, attributes = $3, state = $4, last_active_at = $5
			WHERE id = $6",
		)
		.bind(update.level)
		.bind(update.xp)
		.bind(Value::Object(update.attributes))
		.bind(Value::Object(update.state))
		.bind(update.last_active_at)
		.bind(id.0)
		.execute(&mut *self.tx())
		.await?;
		if result.rows_affected() == 0 {
			return Err(StoreError::NotFound);
		}
		Ok(())
	}

	async fn list_players(&mut self, campaign_id: CampaignId) -> Result<Vec<Player>, StoreError> {
		let rows = sqlx::query("SELECT * FROM players WHERE campaign_id = $1")
			.bind(campaign_id.0)
			.fetch_all(&mut *self.tx())
			.await?;
		rows.into_iter().map(row_to_player).collect()
	}

	async fn restore_player(
		&mut self,
		campaign_id: CampaignId,
		snapshot: &PlayerSnapshot,
	) -> Result<(), StoreError> {
		let player = self.find_or_create_player(campaign_id, snapshot.actor_id, Utc::now()).await?;
		self.update_player(
			player.id,
			PlayerUpdate {
				level: snapshot.level,
				xp: snapshot.xp,
				attributes: snapshot.attributes.clone(),
				state: snapshot.state.clone(),
				last_active_at: player.last_active_at,
			},
		)
		.await
	}
}

#[async_trait]
impl TurnRepository for PgUnitOfWork {
	async fn append_turn(&mut self, turn: NewTurn) -> Result<Turn, StoreError> {
		let row = sqlx::query(
			"INSERT INTO turns (campaign_id, session_id, actor_id, kind, content, external_message_id)
			VALUES ($1, $2, $3, $4, $5, $6)
			RETURNING *",
		)
		.bind(turn.campaign_id.0)
		.bind(turn.session_id.map(|s| s.0))
		.bind(turn.actor_id.map(|a| a.0))
		.bind(turn_kind_db_str(turn.kind))
		.bind(turn.content)
		.bind(turn.external_message_id)
		.fetch_one(&mut *self.tx())
		.await?;
		row_to_turn(row)
	}

	async fn recent_turns(
		&mut self,
		campaign_id: CampaignId,
		limit: i64,
	) -> Result<Vec<Turn>, StoreError> {
		let rows = sqlx::query(
			"SELECT * FROM (
				SELECT * FROM turns WHERE campaign_id = $1 ORDER BY id DESC LIMIT $2
			) recent ORDER BY id ASC",
		)
		.bind(campaign_id.0)
		.bind(limit)
		.fetch_all(&mut *self.tx())
		.await?;
		rows.into_iter().map(row_to_turn).collect()
	}

	async fn latest_turn(&mut self, campaign_id: CampaignId) -> Result<Option<Turn>, StoreError> {
		let row = sqlx::query("SELECT * FROM turns WHERE campaign_id = $1 ORDER BY id DESC LIMIT 1")
			.bind(campaign_id.0)
			.fetch_optional(&mut *self.tx())
			.await?;
		row.map(row_to_turn).transpose()
	}

	async fn delete_turns_after(
		&mut self,
		campaign_id: CampaignId,
		target_turn_id: TurnId,
		session_scope: Option<&[SessionId]>,
	) -> Result<u64, StoreError> {
		let result = match session_scope {
			None => {
				sqlx::query("DELETE FROM turns WHERE campaign_id = $1 AND id > $2")
					.bind(campaign_id.0)
					.bind(target_turn_id.0)
					.execute(&mut *self.tx())
					.await?
			}
			Some(sessions) => {
				let session_ids: Vec<Uuid> = sessions.iter().map(|s| s.0).collect();
				sqlx::query(
					"DELETE FROM turns WHERE campaign_id = $1 AND id > $2 AND session_id = ANY($3)",
				)
				.bind(campaign_id.0)
				.bind(target_turn_id.0)
				.bind(session_ids)
				.execute(&mut *self.tx())
				.await?
			}
		};
		Ok(result.rows_affected())
	}
}

#[async_trait]
impl SnapshotRepository for PgUnitOfWork {
	async fn insert_snapshot(&mut self, snapshot: Snapshot) -> Result<(), StoreError> {
		sqlx::query(
			"INSERT INTO snapshots (id, campaign_id, turn_id, state, characters, summary, last_narration, players, created_at)
			VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
		)
		.bind(snapshot.id.0)
		.bind(snapshot.campaign_id.0)
		.bind(snapshot.turn_id.0)
		.bind(Value::Object(snapshot.state))
		.bind(Value::Object(snapshot.characters))
		.bind(snapshot.summary)
		.bind(snapshot.last_narration)
		.bind(serde_json::to_value(&snapshot.players).unwrap_or(Value::Array(vec![])))
		.bind(snapshot.created_at)
		.execute(&mut *self.tx())
		.await?;
		Ok(())
	}

	async fn find_snapshot_at_turn(
		&mut self,
		campaign_id: CampaignId,
		turn_id: TurnId,
	) -> Result<Option<Snapshot>, StoreError> {
		let row = sqlx::query("SELECT * FROM snapshots WHERE campaign_id = $1 AND turn_id = $2")
			.bind(campaign_id.0)
			.bind(turn_id.0)
			.fetch_optional(&mut *self.tx())
			.await?;
		row.map(row_to_snapshot).transpose()
	}

	async fn find_snapshot_at_or_before(
		&mut self,
		campaign_id: CampaignId,
		turn_id: TurnId,
	) -> Result<Option<Snapshot>, StoreError> {
		let row = sqlx::query(
			"SELECT * FROM snapshots WHERE campaign_id = $1 AND turn_id <= $2 ORDER BY turn_id DESC LIMIT 1",
		)
		.bind(campaign_id.0)
		.bind(turn_id.0)
		.fetch_optional(&mut *self.tx())
		.await?;
		row.map(row_to_snapshot).transpose()
	}

	async fn delete_snapshots_after(
		&mut self,
		campaign_id: CampaignId,
		target_turn_id: TurnId,
	) -> Result<u64, StoreError> {
		let result = sqlx::query("DELETE FROM snapshots WHERE campaign_id = $1 AND turn_id > $2")
			.bind(campaign_id.0)
			.bind(target_turn_id.0)
			.execute(&mut *self.tx())
			.await?;
		Ok(result.rows_affected())
	}
}

#[async_trait]
impl TimerRepository for PgUnitOfWork {
	async fn find_active_timer(
		&mut self,
		campaign_id: CampaignId,
	) -> Result<Option<Timer>, StoreError> {
		let row = sqlx::query(
			"SELECT * FROM timers WHERE campaign_id = $1
				AND status IN ('scheduled_unbound', 'scheduled_bound')",
		)
		.bind(campaign_id.0)
		.fetch_optional(&mut *self.tx())
		.await?;
		row.map(row_to_timer).transpose()
	}

	async fn cancel_active_timer(
		&mut self,
		campaign_id: CampaignId,
		now: DateTime<Utc>,
	) -> Result<u64, StoreError> {
		let result = sqlx::query(
			"UPDATE timers SET status = 'cancelled', updated_at = $1
			WHERE campaign_id = $2 AND status IN ('scheduled_unbound', 'scheduled_bound')",
		)
		.bind(now)
		.bind(campaign_id.0)
		.execute(&mut *self.tx())
		.await?;
		Ok(result.rows_affected())
	}

	async fn insert_timer(&mut self, timer: NewTimer) -> Result<Timer, StoreError> {
		let row = sqlx::query(
			"INSERT INTO timers (id, campaign_id, status, due_at, event_text, interruptible, interrupt_action)
			VALUES ($1, $2, 'scheduled_unbound', $3, $4, $5, $6)
			RETURNING *",
		)
		.bind(TimerId::new().0)
		.bind(timer.campaign_id.0)
		.bind(timer.due_at)
		.bind(timer.event_text)
		.bind(timer.interruptible)
		.bind(timer.interrupt_action)
		.fetch_one(&mut *self.tx())
		.await?;
		row_to_timer(row)
	}

	async fn attach_timer_message(
		&mut self,
		id: TimerId,
		external_message_id: String,
		external_channel_id: String,
		now: DateTime<Utc>,
	) -> Result<bool, StoreError> {
		let result = sqlx::query(
			"UPDATE timers SET status = 'scheduled_bound', external_message_id = $1, external_channel_id = $2, updated_at = $3
			WHERE id = $4 AND status IN ('scheduled_unbound', 'scheduled_bound')",
		)
		.bind(external_message_id)
		.bind(external_channel_id)
		.bind(now)
		.bind(id.0)
		.execute(&mut *self.tx())
		.await?;
		Ok(result.rows_affected() == 1)
	}

	async fn mark_timer_expired(&mut self, id: TimerId, now: DateTime<Utc>) -> Result<bool, StoreError> {
		let result = sqlx::query(
			"UPDATE timers SET status = 'expired', updated_at = $1
			WHERE id = $2 AND status IN ('scheduled_unbound', 'scheduled_bound')",
		)
		.bind(now)
		.bind(id.0)
		.execute(&mut *self.tx())
		.await?;
		Ok(result.rows_affected() == 1)
	}

	async fn mark_timer_consumed(&mut self, id: TimerId, now: DateTime<Utc>) -> Result<bool, StoreError> {
		let result = sqlx::query(
			"UPDATE timers SET status = 'consumed', updated_at = $1 WHERE id = $2 AND status = 'expired'",
		)
		.bind(now)
		.bind(id.0)
		.execute(&mut *self.tx())
		.await?;
		Ok(result.rows_affected() == 1)
	}

	async fn list_active_timers(&mut self) -> Result<Vec<Timer>, StoreError> {
		let rows = sqlx::query("SELECT * FROM timers WHERE status IN ('scheduled_unbound', 'scheduled_bound')")
			.fetch_all(&mut *self.tx())
			.await?;
		rows.into_iter().map(row_to_timer).collect()
	}
}

#[async_trait]
impl InflightRepository for PgUnitOfWork {
	async fn find_inflight(
		&mut self,
		campaign_id: CampaignId,
		actor_id: ActorId,
	) -> Result<Option<InflightTurn>, StoreError> {
		let row = sqlx::query("SELECT * FROM inflight_turns WHERE campaign_id = $1 AND actor_id = $2")
			.bind(campaign_id.0)
			.bind(actor_id.0)
			.fetch_optional(&mut *self.tx())
			.await?;
		row.map(row_to_inflight).transpose()
	}

	async fn acquire_or_steal_lease(
		&mut self,
		campaign_id: CampaignId,
		actor_id: ActorId,
		token: ClaimToken,
		now: DateTime<Utc>,
		expires_at: DateTime<Utc>,
	) -> Result<bool, StoreError> {
		let result = sqlx::query(
			"INSERT INTO inflight_turns (campaign_id, actor_id, claim_token, claimed_at, heartbeat_at, expires_at)
			VALUES ($1, $2, $3, $4, $4, $5)
			ON CONFLICT (campaign_id, actor_id) DO UPDATE SET
				claim_token = EXCLUDED.claim_token,
				claimed_at = EXCLUDED.claimed_at,
				heartbeat_at = EXCLUDED.heartbeat_at,
				expires_at = EXCLUDED.expires_at
			WHERE inflight_turns.expires_at <= $4",
		)
		.bind(campaign_id.0)
		.bind(actor_id.0)
		.bind(token.0)
		.bind(now)
		.bind(expires_at)
		.execute(&mut *self.tx())
		.await?;
		if result.rows_affected() == 1 {
			return Ok(true);
		}
		// Row exists and is still live, or didn't exist before the INSERT
		// raced with a concurrent acquire; either way this caller lost.
		let existing = self.find_inflight(campaign_id, actor_id).await?;
		Ok(existing.is_none())
	}

	async fn heartbeat_lease(
		&mut self,
		campaign_id: CampaignId,
		actor_id: ActorId,
		token: ClaimToken,
		new_expires_at: DateTime<Utc>,
	) -> Result<bool, StoreError> {
		let result = sqlx::query(
			"UPDATE inflight_turns SET heartbeat_at = now(), expires_at = $1
			WHERE campaign_id = $2 AND actor_id = $3 AND claim_token = $4",
		)
		.bind(new_expires_at)
		.bind(campaign_id.0)
		.bind(actor_id.0)
		.bind(token.0)
		.execute(&mut *self.tx())
		.await?;
		Ok(result.rows_affected() == 1)
	}

	async fn release_lease(
		&mut self,
		campaign_id: CampaignId,
		actor_id: ActorId,
		token: ClaimToken,
	) -> Result<bool, StoreError> {
		let result = sqlx::query(
			"DELETE FROM inflight_turns WHERE campaign_id = $1 AND actor_id = $2 AND claim_token = $3",
		)
		.bind(campaign_id.0)
		.bind(actor_id.0)
		.bind(token.0)
		.execute(&mut *self.tx())
		.await?;
		Ok(result.rows_affected() == 1)
	}
}

#[async_trait]
impl OutboxRepository for PgUnitOfWork {
	async fn insert_outbox_event(&mut self, event: NewOutboxEvent) -> Result<bool, StoreError> {
		let result = sqlx::query(
			"INSERT INTO outbox_events (campaign_id, session_scope, event_type, idempotency_key, payload)
			VALUES ($1, $2, $3, $4, $5)
			ON CONFLICT (campaign_id, (COALESCE(session_scope, '00000000-0000-0000-0000-000000000000'::uuid)), event_type, idempotency_key)
			DO NOTHING",
		)
		.bind(event.campaign_id.0)
		.bind(event.session_scope.map(|s| s.0))
		.bind(event.event_type.as_db_str())
		.bind(event.idempotency_key)
		.bind(event.payload)
		.execute(&mut *self.tx())
		.await?;
		Ok(result.rows_affected() == 1)
	}
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
	async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
		let tx = self.tx.take().expect("unit of work used after commit/rollback");
		tx.commit().await?;
		Ok(())
	}

	async fn rollback(mut self: Box<Self>) -> Result<(), StoreError> {
		let tx = self.tx.take().expect("unit of work used after commit/rollback");
		tx.rollback().await?;
		Ok(())
	}
}
