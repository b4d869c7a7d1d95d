//! Placeholder adapters so `turn-service` links and boots standalone.
//!
//! Prompt content and LLM wiring are explicitly out of scope for this core
//! (§1 Non-goals); a real deployment swaps these for a crate that actually
//! talks to a model and a directory service, without touching `turn-engine`.

use async_trait::async_trait;
use turn_ports::{ActorResolverError, ActorResolverPort, LlmError, LlmPort, LlmTurnOutput, TurnContext};
use turn_types::ActorId;

pub struct UnconfiguredLlmPort;

#[async_trait]
impl LlmPort for UnconfiguredLlmPort {
	async fn complete_turn(&self, _context: &TurnContext) -> Result<LlmTurnOutput, LlmError> {
		Err(LlmError::Unavailable("no LlmPort adapter configured for this deployment".to_string()))
	}
}

pub struct NullActorResolverPort;

#[async_trait]
impl ActorResolverPort for NullActorResolverPort {
	async fn resolve_discord_mention(&self, _mention: &str) -> Result<Option<ActorId>, ActorResolverError> {
		Ok(None)
	}
}
