use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ActorId, CampaignId, SessionId, TurnId};

/// Discriminates the author of a `Turn` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
	Player,
	Narrator,
	System,
}

/// An append-only log entry. Turns are never mutated or deleted except by
/// `RewindEngine` (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
	pub id: TurnId,
	pub campaign_id: CampaignId,
	pub session_id: Option<SessionId>,
	pub actor_id: Option<ActorId>,
	pub kind: TurnKind,
	pub content: String,
	pub external_message_id: Option<String>,
	pub created_at: DateTime<Utc>,
}
