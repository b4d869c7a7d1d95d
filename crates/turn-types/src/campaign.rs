use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{CampaignId, TurnId};

/// The aggregate root. Every mutation to a campaign goes through a
/// compare-and-set on `row_version` (§3, §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
	pub id: CampaignId,
	pub namespace: String,
	pub name: String,
	pub name_normalized: String,

	pub summary: String,
	pub state: Map<String, Value>,
	pub characters: Map<String, Value>,
	pub last_narration: String,

	pub memory_visible_max_turn_id: Option<TurnId>,
	pub speed_multiplier: f64,

	pub row_version: i64,

	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// Minimum and maximum values `Campaign::speed_multiplier` may take (§3).
pub const SPEED_MULTIPLIER_MIN: f64 = 0.1;
pub const SPEED_MULTIPLIER_MAX: f64 = 10.0;

impl Campaign {
	/// Clamp a requested speed multiplier into the campaign's allowed domain.
	pub fn clamp_speed_multiplier(value: f64) -> f64 {
		value.clamp(SPEED_MULTIPLIER_MIN, SPEED_MULTIPLIER_MAX)
	}
}
