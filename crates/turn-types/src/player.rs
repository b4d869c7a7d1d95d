use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{ActorId, CampaignId, PlayerId};

/// A single item in a player's inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
	pub name: String,
	pub origin: String,
}

/// `(campaign, actor)` unique. Created lazily on first reference (§3 Lifecycle).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
	pub id: PlayerId,
	pub campaign_id: CampaignId,
	pub actor_id: ActorId,

	pub level: i32,
	pub xp: i64,
	pub attributes: Map<String, Value>,
	/// Includes the `inventory` list of `InventoryItem`, among other
	/// player-scoped state the LLM may update.
	pub state: Map<String, Value>,

	pub last_active_at: DateTime<Utc>,
}

/// Key under which a player's inventory lives inside `Player::state`.
pub const INVENTORY_KEY: &str = "inventory";

impl Player {
	/// Read the player's inventory out of `state`, tolerating a missing or
	/// malformed key (treated as empty).
	pub fn inventory(&self) -> Vec<InventoryItem> {
		self.state
			.get(INVENTORY_KEY)
			.and_then(|v| serde_json::from_value(v.clone()).ok())
			.unwrap_or_default()
	}

	/// Write the player's inventory back into `state`.
	pub fn set_inventory(&mut self, items: Vec<InventoryItem>) {
		self.state.insert(
			INVENTORY_KEY.to_string(),
			serde_json::to_value(items).expect("inventory items are always serializable"),
		);
	}
}
