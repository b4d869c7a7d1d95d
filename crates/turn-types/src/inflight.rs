use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ActorId, CampaignId, ClaimToken};

/// Unique per `(campaign, actor)`. The unit of admission control for
/// `ClaimManager` (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InflightTurn {
	pub campaign_id: CampaignId,
	pub actor_id: ActorId,
	pub claim_token: ClaimToken,
	pub claimed_at: DateTime<Utc>,
	pub heartbeat_at: DateTime<Utc>,
	pub expires_at: DateTime<Utc>,
}
