use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{ActorId, CampaignId, SnapshotId, TurnId};

/// Value-copy of a single player's mutable fields at the moment a
/// `Snapshot` was taken. Carried by value, never by reference, per the
/// "cyclic references" design note (SPEC_FULL §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
	pub actor_id: ActorId,
	pub level: i32,
	pub xp: i64,
	pub attributes: Map<String, Value>,
	pub state: Map<String, Value>,
}

/// The unit of rewind: a full value-copy of world state taken at exactly
/// one narrator `Turn`. Exactly one snapshot exists per narrator turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
	pub id: SnapshotId,
	pub campaign_id: CampaignId,
	pub turn_id: TurnId,

	pub state: Map<String, Value>,
	pub characters: Map<String, Value>,
	pub summary: String,
	pub last_narration: String,
	pub players: Vec<PlayerSnapshot>,

	pub created_at: DateTime<Utc>,
}
