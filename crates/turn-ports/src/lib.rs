//! External collaborator interfaces ("ports") the core consults but does
//! not implement (SPEC_FULL §1, §6). Everything in this crate is a trait
//! or a plain data type; production bodies are presentation/infra concerns
//! that live outside this repository.

pub mod context;
pub mod llm;
pub mod ports;

pub use context::TurnContext;
pub use llm::{
	CalendarEventAdd, CalendarUpdate, GiveItemRequest, LlmTurnOutput, PlayerStateUpdate,
	StateUpdate, TimeUnit, TimerInstruction,
};
pub use ports::{
	ActorResolverError, ActorResolverPort, ImdbLookupPort, LlmError, LlmPort, MediaGenerationPort,
	MemoryHit, MemorySearchPort, TextCompletionPort, TimerEffectsPort,
};
