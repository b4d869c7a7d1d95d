//! Opaque identifiers for every entity in the data model.
//!
//! Turn ids are the one identifier that is *not* opaque: they are a
//! monotonically increasing integer per store, and callers are allowed to
//! compare and order them (§3, §5 ordering guarantees).

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! opaque_id {
	($name:ident) => {
		#[derive(
			Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
		)]
		#[serde(transparent)]
		pub struct $name(pub Uuid);

		impl $name {
			pub fn new() -> Self {
				Self(Uuid::new_v4())
			}
		}

		impl Default for $name {
			fn default() -> Self {
				Self::new()
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				fmt::Display::fmt(&self.0, f)
			}
		}

		impl From<Uuid> for $name {
			fn from(value: Uuid) -> Self {
				Self(value)
			}
		}
	};
}

opaque_id!(CampaignId);
opaque_id!(ActorId);
opaque_id!(PlayerId);
opaque_id!(SessionId);
opaque_id!(TimerId);
opaque_id!(SnapshotId);

/// A turn id is a `BIGSERIAL` in the store: globally monotonic, not opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnId(pub i64);

impl fmt::Display for TurnId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&self.0, f)
	}
}

/// An opaque single-use token identifying the holder of a claim lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimToken(pub Uuid);

impl ClaimToken {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for ClaimToken {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for ClaimToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&self.0, f)
	}
}
