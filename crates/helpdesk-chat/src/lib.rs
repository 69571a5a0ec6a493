//! Customer-support dialogue orchestration.
//!
//! Routes each user message through a fixed graph of stages (intent gate,
//! compactor, router, memory retriever, generator, escalator) and keeps
//! tiered conversational memory across turns: the in-session buffer, the
//! persisted message history, and semantic recall.

pub mod error;
pub mod graph;
pub mod llm;
pub mod orchestrator;
pub mod stages;
pub mod state;
pub mod ticketing;

mod guard;
#[cfg(test)]
mod test_support;

pub use error::ChatError;
pub use graph::{Command, DialogueGraph, EscalationReason, Goto, Services, Stage, StageName, Timeouts, TurnTrace};
pub use llm::{CompletionRequest, LanguageModel, OpenAiCompatibleClient, PromptMessage};
pub use orchestrator::{SupportOrchestrator, TurnInput, TurnOutcome};
pub use state::{ConversationState, StateUpdate};
pub use ticketing::{LocalTicketService, TicketService};
