use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CampaignId, TimerId};

/// A `Timer`'s lifecycle state (§4.5). The store enforces a partial unique
/// index so at most one row per campaign carries an "active" status at a
/// time — see [`TimerStatus::is_active`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerStatus {
	ScheduledUnbound,
	ScheduledBound,
	Cancelled,
	Expired,
	Consumed,
}

impl TimerStatus {
	/// Active statuses are the ones the at-most-one-per-campaign invariant
	/// applies to.
	pub fn is_active(self) -> bool {
		matches!(self, TimerStatus::ScheduledUnbound | TimerStatus::ScheduledBound)
	}

	pub fn as_db_str(self) -> &'static str {
		match self {
			TimerStatus::ScheduledUnbound => "scheduled_unbound",
			TimerStatus::ScheduledBound => "scheduled_bound",
			TimerStatus::Cancelled => "cancelled",
			TimerStatus::Expired => "expired",
			TimerStatus::Consumed => "consumed",
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timer {
	pub id: TimerId,
	pub campaign_id: CampaignId,
	pub status: TimerStatus,

	pub due_at: DateTime<Utc>,
	pub event_text: String,
	pub interruptible: bool,
	pub interrupt_action: Option<String>,

	pub external_message_id: Option<String>,
	pub external_channel_id: Option<String>,

	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}
