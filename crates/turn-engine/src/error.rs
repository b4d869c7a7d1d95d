use thiserror::Error;
use turn_ports::LlmError;
use turn_store::StoreError;

/// Internal failure type used only between the engine's own functions.
/// Never returned from [`crate::resolve_turn`] or
/// [`crate::rewind_to_turn`] — both fold every variant into their closed
/// result enum before returning (§7, §9).
#[derive(Debug, Error)]
pub(crate) enum EngineError {
	#[error("campaign not found")]
	CampaignNotFound,

	#[error("turn already in flight for this actor")]
	TurnInflight,

	#[error("claim token is no longer valid")]
	ClaimInvalid,

	#[error("campaign or player vanished mid-resolution")]
	MissingEntity,

	#[error("campaign row_version changed since the claim was taken")]
	RowVersionChanged,

	#[error("compare-and-set commit lost a race")]
	CasFailed,

	#[error("snapshot not found for the requested turn")]
	SnapshotNotFound,

	#[error(transparent)]
	Store(#[from] StoreError),

	#[error(transparent)]
	Llm(#[from] LlmError),

	#[error("{0}")]
	Other(String),
}

impl EngineError {
	/// Whether this failure belongs to the `StaleClaim` kind (§7), which is
	/// retried up to `max_conflict_retries` times with a fresh token.
	pub(crate) fn is_stale_claim(&self) -> bool {
		matches!(
			self,
			EngineError::ClaimInvalid
				| EngineError::MissingEntity
				| EngineError::RowVersionChanged
				| EngineError::CasFailed
		)
	}

	/// Whether this failure belongs to the `TurnBusy` kind (§7), which is
	/// surfaced immediately without retry.
	pub(crate) fn is_turn_busy(&self) -> bool {
		matches!(self, EngineError::CampaignNotFound | EngineError::TurnInflight)
	}

	pub(crate) fn reason(&self) -> String {
		self.to_string()
	}
}
