use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use turn_types::{CampaignId, Turn};

/// Read-only snapshot of world state handed to `LLMPort::complete_turn`.
/// Built once in Phase A and never mutated (§4.2 step A.5).
#[derive(Debug, Clone)]
pub struct TurnContext {
	pub campaign_id: CampaignId,
	pub campaign_state: Map<String, Value>,
	pub campaign_summary: String,
	pub campaign_characters: Map<String, Value>,

	pub player_state: Map<String, Value>,
	pub player_level: i32,
	pub player_xp: i64,

	/// Last `RECENT_TURN_WINDOW` turns (any kind) in ascending id order.
	pub recent_turns: Vec<Turn>,

	/// `Campaign::row_version` as observed when this context was built.
	/// Phase C re-validates against this value (§4.2 step C.3).
	pub start_row_version: i64,

	pub now: DateTime<Utc>,

	/// The action text the player submitted. Not part of the original
	/// spec's `TurnContext` field list, but required for the LLM to know
	/// what it is narrating in response to.
	pub action: String,
}
