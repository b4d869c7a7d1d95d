use async_trait::async_trait;
use turn_types::ActorId;

use crate::{context::TurnContext, llm::LlmTurnOutput};

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
	#[error("llm backend unavailable: {0}")]
	Unavailable(String),
	#[error("llm returned a response that could not be parsed: {0}")]
	InvalidResponse(String),
}

/// The only hard external dependency of `TurnEngine`: produces a structured
/// response given a read-only world snapshot. Implementations may take
/// arbitrarily long; the core bounds this only via the claim lease (§5).
#[async_trait]
pub trait LlmPort: Send + Sync {
	async fn complete_turn(&self, context: &TurnContext) -> Result<LlmTurnOutput, LlmError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ActorResolverError {
	#[error("actor resolver backend unavailable: {0}")]
	Unavailable(String),
}

/// Maps an external mention (e.g. a Discord user mention) to an actor id
/// already known to this campaign (§4.4, §6.1).
#[async_trait]
pub trait ActorResolverPort: Send + Sync {
	async fn resolve_discord_mention(
		&self,
		mention: &str,
	) -> Result<Option<ActorId>, ActorResolverError>;
}

/// Listed in §1/§6.1 as an adapter; only its surface is core-visible. No
/// production implementation ships in this crate.
#[async_trait]
pub trait MemorySearchPort: Send + Sync {
	async fn search(&self, campaign_id: turn_types::CampaignId, query: &str) -> Vec<MemoryHit>;
}

#[derive(Debug, Clone)]
pub struct MemoryHit {
	pub turn_id: turn_types::TurnId,
	pub text: String,
	pub score: f64,
}

/// Listed in §1/§6.1 as an adapter; only its surface is core-visible.
#[async_trait]
pub trait MediaGenerationPort: Send + Sync {
	async fn request_scene_image(&self, prompt: &str) -> Result<(), anyhow::Error>;
}

/// Listed in §1/§6.1 as an adapter; only its surface is core-visible.
#[async_trait]
pub trait TimerEffectsPort: Send + Sync {
	async fn on_timer_fired(&self, campaign_id: turn_types::CampaignId, event_text: &str);
}

/// Listed in §1/§6.1 as an adapter; only its surface is core-visible.
#[async_trait]
pub trait ImdbLookupPort: Send + Sync {
	async fn lookup(&self, title: &str) -> Result<Option<String>, anyhow::Error>;
}

/// Listed in §1/§6.1 as an adapter; used by the attachment-summarization
/// utility, out of scope for the core.
#[async_trait]
pub trait TextCompletionPort: Send + Sync {
	async fn complete(&self, prompt: &str) -> Result<String, anyhow::Error>;
}
