use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{CampaignId, SessionId};

/// Durable, idempotency-keyed event log for side effects dispatched
/// asynchronously by external collaborators (§3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
	Pending,
	Dispatched,
	Failed,
}

/// The event kinds the core itself emits. Dispatchers for these live
/// outside the core (§1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxEventType {
	TimerScheduled,
	SceneImageRequested,
	GiveItemUnresolved,
	MemoryPruneRequested,
}

impl OutboxEventType {
	pub fn as_db_str(self) -> &'static str {
		match self {
			OutboxEventType::TimerScheduled => "timer_scheduled",
			OutboxEventType::SceneImageRequested => "scene_image_requested",
			OutboxEventType::GiveItemUnresolved => "give_item_unresolved",
			OutboxEventType::MemoryPruneRequested => "memory_prune_requested",
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
	pub campaign_id: CampaignId,
	pub session_scope: Option<SessionId>,
	pub event_type: OutboxEventType,
	pub idempotency_key: String,
	pub payload: Value,
	pub status: OutboxStatus,
	pub attempts: i32,
	pub next_attempt_at: DateTime<Utc>,
	pub created_at: DateTime<Utc>,
}

/// A new outbox row to be inserted; duplicates on the composite unique key
/// are silently dropped by the store (§3, §8 invariant 5).
#[derive(Debug, Clone)]
pub struct NewOutboxEvent {
	pub campaign_id: CampaignId,
	pub session_scope: Option<SessionId>,
	pub event_type: OutboxEventType,
	pub idempotency_key: String,
	pub payload: Value,
}
