use thiserror::Error;

/// Everything a `Store` implementation can fail with. `turn-engine` maps
/// these onto its own closed result enums; this type never escapes a
/// public `turn-engine` entry point (SPEC_FULL §7).
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("row not found")]
	NotFound,

	/// A compare-and-set update lost a race: the row's version no longer
	/// matched the caller's expected value (§5).
	#[error("optimistic concurrency conflict")]
	Conflict,

	#[error("store backend error: {0}")]
	Backend(#[from] sqlx::Error),
}
