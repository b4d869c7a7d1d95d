//! Lease-based single-writer admission per `(campaign, actor)` pair
//! (§4.1). A thin, fully-instrumented wrapper over `InflightRepository` —
//! it carries no state of its own beyond the `Clock` it was given.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use turn_store::{StoreError, UnitOfWork};
use turn_types::{ActorId, CampaignId, ClaimToken};

use crate::config::Clock;

pub struct ClaimManager {
	clock: Arc<dyn Clock>,
}

impl ClaimManager {
	pub fn new(clock: Arc<dyn Clock>) -> Self {
		Self { clock }
	}

	#[tracing::instrument(skip(self, repo), fields(%campaign_id, %actor_id))]
	pub async fn acquire_or_steal(
		&self,
		repo: &mut dyn UnitOfWork,
		campaign_id: CampaignId,
		actor_id: ActorId,
		token: ClaimToken,
		lease_ttl: Duration,
	) -> Result<bool, StoreError> {
		let now = self.clock.now();
		let expires_at = now + chrono::Duration::from_std(lease_ttl).unwrap_or(chrono::Duration::seconds(90));
		repo.acquire_or_steal_lease(campaign_id, actor_id, token, now, expires_at).await
	}

	#[tracing::instrument(skip(self, repo), fields(%campaign_id, %actor_id))]
	pub async fn validate_token(
		&self,
		repo: &mut dyn UnitOfWork,
		campaign_id: CampaignId,
		actor_id: ActorId,
		token: ClaimToken,
	) -> Result<bool, StoreError> {
		let now = self.clock.now();
		match repo.find_inflight(campaign_id, actor_id).await? {
			Some(lease) => Ok(lease.claim_token.0 == token.0 && lease.expires_at >= now),
			None => Ok(false),
		}
	}

	pub async fn heartbeat(
		&self,
		repo: &mut dyn UnitOfWork,
		campaign_id: CampaignId,
		actor_id: ActorId,
		token: ClaimToken,
		lease_ttl: Duration,
	) -> Result<bool, StoreError> {
		let new_expires_at = self.clock.now()
			+ chrono::Duration::from_std(lease_ttl).unwrap_or(chrono::Duration::seconds(90));
		repo.heartbeat_lease(campaign_id, actor_id, token, new_expires_at).await
	}

	pub async fn release(
		&self,
		repo: &mut dyn UnitOfWork,
		campaign_id: CampaignId,
		actor_id: ActorId,
		token: ClaimToken,
	) -> Result<bool, StoreError> {
		repo.release_lease(campaign_id, actor_id, token).await
	}

	pub fn now(&self) -> DateTime<Utc> {
		self.clock.now()
	}
}
