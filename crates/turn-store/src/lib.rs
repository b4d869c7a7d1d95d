//! Persistence layer for the turn engine: the `Store`/`UnitOfWork`
//! abstraction `turn-engine` programs against (SPEC_FULL §2), a
//! CockroachDB/PostgreSQL-backed implementation, and an in-memory one for
//! hermetic tests.

pub mod error;
pub mod memory;
pub mod migrate;
pub mod postgres;
pub mod repo;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use migrate::run_migrations;
pub use postgres::{PgStore, PostgresConfig};
pub use repo::{
	CampaignRepository, CampaignUpdate, InflightRepository, NewTimer, NewTurn, OutboxRepository,
	PlayerRepository, PlayerUpdate, SnapshotRepository, Store, TimerRepository, TurnRepository,
	UnitOfWork,
};
