//! Point-in-time rewind to a prior narrator turn (§4.6): snapshot lookup,
//! atomic restore, cascade delete of later turns/snapshots, memory-watermark
//! update, outbox `memory_prune_requested`.

use std::sync::Arc;

use turn_ports::MemoryHit;
use turn_store::{CampaignUpdate, Store};
use turn_types::{CampaignId, NewOutboxEvent, OutboxEventType, SessionId, TurnId};

use crate::config::Clock;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewindStatus {
	Ok,
	Error,
	Conflict,
}

#[derive(Debug, Clone)]
pub struct RewindResult {
	pub status: RewindStatus,
	pub target_turn_id: Option<TurnId>,
	pub deleted_turns: u64,
	pub reason: Option<String>,
}

impl RewindResult {
	fn ok(target_turn_id: TurnId, deleted_turns: u64) -> Self {
		Self { status: RewindStatus::Ok, target_turn_id: Some(target_turn_id), deleted_turns, reason: None }
	}

	fn error(reason: impl Into<String>) -> Self {
		Self { status: RewindStatus::Error, target_turn_id: None, deleted_turns: 0, reason: Some(reason.into()) }
	}

	fn conflict(reason: impl Into<String>) -> Self {
		Self { status: RewindStatus::Conflict, target_turn_id: None, deleted_turns: 0, reason: Some(reason.into()) }
	}
}

/// Restores a campaign (and its players) to the state recorded in the
/// snapshot of an earlier narrator turn, deleting everything after it.
pub struct RewindEngine {
	store: Arc<dyn Store>,
	clock: Arc<dyn Clock>,
}

impl RewindEngine {
	pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
		Self { store, clock }
	}

	/// `session_scope` restricts turn deletion to a pre-resolved set of
	/// session ids for channel-scoped rewind (§4.6 step 5); `None` deletes
	/// every later turn regardless of session.
	#[tracing::instrument(skip(self, session_scope), fields(%campaign_id, %target_turn_id))]
	pub async fn rewind_to_turn(
		&self,
		campaign_id: CampaignId,
		target_turn_id: TurnId,
		session_scope: Option<&[SessionId]>,
	) -> RewindResult {
		match self.try_rewind(campaign_id, target_turn_id, session_scope).await {
			Ok(result) => result,
			Err(EngineError::CampaignNotFound) => RewindResult::error("campaign_not_found"),
			Err(EngineError::SnapshotNotFound) => RewindResult::error("snapshot_not_found"),
			Err(EngineError::CasFailed) => RewindResult::conflict("row_version_conflict"),
			Err(err) => {
				tracing::error!(reason = %err, "unexpected rewind failure");
				RewindResult::error(err.reason())
			}
		}
	}

	async fn try_rewind(
		&self,
		campaign_id: CampaignId,
		target_turn_id: TurnId,
		session_scope: Option<&[SessionId]>,
	) -> Result<RewindResult, EngineError> {
		let mut uow = self.store.begin().await?;

		let Some(campaign) = uow.find_campaign(campaign_id).await? else {
			uow.rollback().await?;
			return Err(EngineError::CampaignNotFound);
		};

		let Some(snapshot) = uow.find_snapshot_at_turn(campaign_id, target_turn_id).await? else {
			uow.rollback().await?;
			return Err(EngineError::SnapshotNotFound);
		};

		let now = self.clock.now();
		let committed = uow
			.cas_update_campaign(
				campaign_id,
				campaign.row_version,
				CampaignUpdate {
					summary: snapshot.summary.clone(),
					state: snapshot.state.clone(),
					characters: snapshot.characters.clone(),
					last_narration: snapshot.last_narration.clone(),
					memory_visible_max_turn_id: Some(target_turn_id),
					speed_multiplier: campaign.speed_multiplier,
					updated_at: now,
				},
			)
			.await?;
		if !committed {
			uow.rollback().await?;
			return Err(EngineError::CasFailed);
		}

		for player in &snapshot.players {
			uow.restore_player(campaign_id, player).await?;
		}

		uow.delete_snapshots_after(campaign_id, target_turn_id).await?;
		let deleted_turns =
			uow.delete_turns_after(campaign_id, target_turn_id, session_scope).await?;

		uow.insert_outbox_event(NewOutboxEvent {
			campaign_id,
			session_scope: None,
			event_type: OutboxEventType::MemoryPruneRequested,
			idempotency_key: format!("rewind:{}", target_turn_id.0),
			payload: serde_json::json!({ "target_turn_id": target_turn_id.0 }),
		})
		.await?;

		uow.commit().await?;

		Ok(RewindResult::ok(target_turn_id, deleted_turns))
	}
}

/// Drop any memory-search hit whose `turn_id` exceeds the campaign's
/// watermark; a `None` watermark disables filtering (§4.6 "Memory
/// visibility filter").
pub fn filter_memory_hits_by_visibility(
	memory_visible_max_turn_id: Option<TurnId>,
	hits: Vec<MemoryHit>,
) -> Vec<MemoryHit> {
	match memory_visible_max_turn_id {
		None => hits,
		Some(watermark) => hits.into_iter().filter(|hit| hit.turn_id <= watermark).collect(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn hit(turn_id: i64) -> MemoryHit {
		MemoryHit { turn_id: TurnId(turn_id), text: "x".to_string(), score: 1.0 }
	}

	#[test]
	fn filter_drops_hits_past_watermark() {
		let hits = vec![hit(1), hit(2), hit(3)];
		let filtered = filter_memory_hits_by_visibility(Some(TurnId(2)), hits);
		assert_eq!(filtered.len(), 2);
	}

	#[test]
	fn filter_passes_everything_when_watermark_is_none() {
		let hits = vec![hit(1), hit(2)];
		let filtered = filter_memory_hits_by_visibility(None, hits);
		assert_eq!(filtered.len(), 2);
	}
}
