//! In-process countdown tasks mirroring persisted `Timer` rows (§4.5). The
//! persisted row is always the source of truth; this module only keeps at
//! most one `tokio::task` alive per campaign to drive it, recovering them
//! from the store on process start.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use turn_store::{Store, StoreError};
use turn_types::{ActorId, CampaignId, Timer, TurnKind};

use crate::config::Clock;
use crate::engine::{ResolveTurnInput, TurnEngine};

/// Dispatch-time delay bounds (§5 Timeouts: "timer minimum delay 30s in the
/// store, clamped to 15s-300s at dispatch time").
const MIN_DISPATCH_DELAY_SECS: i64 = 15;
const MAX_DISPATCH_DELAY_SECS: i64 = 300;
/// If the campaign's latest turn is a player turn younger than this, a
/// firing timer is skipped (§4.5 "Firing").
const FIRE_RACE_GUARD_SECS: i64 = 5;

/// The actor identity a timer fire resolves its synthetic turn as. A fixed
/// nil id rather than a fresh one per fire, so the system's lazily-created
/// player row is stable instead of accumulating one ghost row per timer.
const SYSTEM_ACTOR_ID: ActorId = ActorId(Uuid::nil());

pub struct TimerScheduler {
	store: Arc<dyn Store>,
	engine: Arc<TurnEngine>,
	clock: Arc<dyn Clock>,
	registry: Mutex<HashMap<CampaignId, JoinHandle<()>>>,
}

impl TimerScheduler {
	pub fn new(store: Arc<dyn Store>, engine: Arc<TurnEngine>, clock: Arc<dyn Clock>) -> Arc<Self> {
		Arc::new(Self { store, engine, clock, registry: Mutex::new(HashMap::new()) })
	}

	/// Adjust a raw delay by the campaign's speed multiplier, clamped to the
	/// dispatch-time bounds (§4.5 "Speed multiplier").
	pub fn effective_delay_seconds(original_seconds: i64, speed_multiplier: f64) -> i64 {
		let multiplier = if speed_multiplier.is_finite() && speed_multiplier > 0.0 {
			speed_multiplier
		} else {
			1.0
		};
		let adjusted = (original_seconds as f64 / multiplier).round() as i64;
		adjusted.clamp(MIN_DISPATCH_DELAY_SECS, MAX_DISPATCH_DELAY_SECS)
	}

	/// Recover every active `Timer` row at process start and resume a
	/// countdown task for each, using `due_at - now` clamped to `>= 0` (§4.5
	/// "In-process runtime").
	#[tracing::instrument(skip(self))]
	pub async fn recover_on_start(self: &Arc<Self>) -> Result<usize, StoreError> {
		let mut uow = self.store.begin().await?;
		let timers = uow.list_active_timers().await?;
		uow.rollback().await?;
		let count = timers.len();
		for timer in timers {
			self.spawn_countdown(timer).await;
		}
		tracing::info!(recovered = count, "resumed active timers");
		Ok(count)
	}

	/// Start (or replace) the in-memory countdown task for `timer`'s
	/// campaign. The persisted row must already exist; the at-most-one-
	/// active invariant itself is enforced at the store (§4.5).
	#[tracing::instrument(skip(self, timer), fields(campaign_id = %timer.campaign_id, timer_id = %timer.id))]
	pub async fn schedule(self: &Arc<Self>, timer: Timer) {
		self.spawn_countdown(timer).await;
	}

	/// Abort the in-memory countdown task for a campaign, if any. Does not
	/// touch the persisted row; callers that already transitioned it to
	/// `cancelled` use this to stop the matching task (§4.5 "Interruption").
	pub async fn cancel(&self, campaign_id: CampaignId) {
		if let Some(handle) = self.registry.lock().await.remove(&campaign_id) {
			handle.abort();
		}
	}

	async fn spawn_countdown(self: &Arc<Self>, timer: Timer) {
		let campaign_id = timer.campaign_id;
		let delay_ms = (timer.due_at - self.clock.now()).num_milliseconds().max(0) as u64;

		let scheduler = self.clone();
		let handle = tokio::spawn(async move {
			tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
			scheduler.fire(timer).await;
		});

		let mut registry = self.registry.lock().await;
		if let Some(previous) = registry.insert(campaign_id, handle) {
			previous.abort();
		}
	}

	#[tracing::instrument(skip(self, timer), fields(campaign_id = %timer.campaign_id, timer_id = %timer.id))]
	async fn fire(self: Arc<Self>, timer: Timer) {
		self.registry.lock().await.remove(&timer.campaign_id);

		let mut uow = match self.store.begin().await {
			Ok(uow) => uow,
			Err(err) => {
				tracing::error!(%err, "failed to open transaction for timer fire");
				return;
			}
		};

		let latest = match uow.latest_turn(timer.campaign_id).await {
			Ok(latest) => latest,
			Err(err) => {
				tracing::error!(%err, "failed to load latest turn before firing timer");
				let _ = uow.rollback().await;
				return;
			}
		};
		if let Some(latest) = &latest {
			let player_just_acted = latest.kind == TurnKind::Player
				&& (self.clock.now() - latest.created_at).num_seconds() < FIRE_RACE_GUARD_SECS;
			if player_just_acted {
				tracing::info!("skipping timer fire: player acted within the race guard window");
				let _ = uow.rollback().await;
				return;
			}
		}

		let transitioned = match uow.mark_timer_expired(timer.id, self.clock.now()).await {
			Ok(transitioned) => transitioned,
			Err(err) => {
				tracing::error!(%err, "failed to mark timer expired");
				let _ = uow.rollback().await;
				return;
			}
		};
		if !transitioned {
			let _ = uow.rollback().await;
			return;
		}
		if let Err(err) = uow.commit().await {
			tracing::error!(%err, "failed to commit timer expiry");
			return;
		}

		let mut input = ResolveTurnInput::new(
			timer.campaign_id,
			SYSTEM_ACTOR_ID,
			format!("[SYSTEM EVENT - TIMED]: {}", timer.event_text),
		);
		input.record_player_turn = false;
		input.allow_timer_instruction = false;
		let result = self.engine.resolve_turn(input, None).await;
		tracing::info!(status = ?result.status, "timer-fired turn resolved");

		let mut uow = match self.store.begin().await {
			Ok(uow) => uow,
			Err(err) => {
				tracing::error!(%err, "failed to open transaction for timer consumption");
				return;
			}
		};
		if let Err(err) = uow.mark_timer_consumed(timer.id, self.clock.now()).await {
			tracing::error!(%err, "failed to mark timer consumed");
			let _ = uow.rollback().await;
			return;
		}
		let _ = uow.commit().await;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn effective_delay_respects_bounds() {
		assert_eq!(TimerScheduler::effective_delay_seconds(60, 1.0), 60);
		assert_eq!(TimerScheduler::effective_delay_seconds(10, 1.0), MIN_DISPATCH_DELAY_SECS);
		assert_eq!(TimerScheduler::effective_delay_seconds(1000, 1.0), MAX_DISPATCH_DELAY_SECS);
	}

	#[test]
	fn effective_delay_scales_with_speed_multiplier() {
		assert_eq!(TimerScheduler::effective_delay_seconds(200, 2.0), 100);
		assert_eq!(TimerScheduler::effective_delay_seconds(100, 0.5), 200);
	}

	#[test]
	fn effective_delay_tolerates_degenerate_multiplier() {
		assert_eq!(TimerScheduler::effective_delay_seconds(60, 0.0), 60);
		assert_eq!(TimerScheduler::effective_delay_seconds(60, f64::NAN), 60);
	}
}
