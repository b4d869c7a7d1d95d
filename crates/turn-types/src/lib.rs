//! Shared domain types for the campaign turn-resolution engine.
//!
//! This crate carries no behavior beyond small invariant-preserving helpers
//! (e.g. `Campaign::clamp_speed_multiplier`, `Player::inventory`); the
//! orchestration logic that reads and writes these types lives in
//! `turn-engine`, and their persistence lives in `turn-store`.

pub mod campaign;
pub mod ids;
pub mod inflight;
pub mod outbox;
pub mod player;
pub mod snapshot;
pub mod timer;
pub mod turn;

pub use campaign::Campaign;
pub use ids::{ActorId, CampaignId, ClaimToken, PlayerId, SessionId, SnapshotId, TimerId, TurnId};
pub use inflight::InflightTurn;
pub use outbox::{NewOutboxEvent, OutboxEvent, OutboxEventType, OutboxStatus};
pub use player::{InventoryItem, Player, INVENTORY_KEY};
pub use snapshot::{PlayerSnapshot, Snapshot};
pub use timer::{Timer, TimerStatus};
pub use turn::{Turn, TurnKind};

/// A JSON document, used for `Campaign::state`, `Campaign::characters`, and
/// `Player::attributes` / `Player::state` (SPEC_FULL §9, JSON documents as
/// columns).
pub type JsonDoc = serde_json::Map<String, serde_json::Value>;
