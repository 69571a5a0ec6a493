//! Generator: asks the model for a grounded reply, with a bounded retry.

use tracing::{info, warn};

use helpdesk_core::config::MIN_GENERATION_ATTEMPTS;
use helpdesk_core::types::Role;

use crate::error::ChatError;
use crate::graph::{Command, EscalationReason, Stage, StageContext};
use crate::guard::guarded;
use crate::llm::{CompletionRequest, PromptMessage};
use crate::state::{ConversationState, StateUpdate};

/// Outcome of checking one candidate reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Accepted(String),
    Retry { next_attempt: u32 },
    Exhausted,
}

#[derive(Clone, Copy, Debug)]
pub struct Generator {
    min_reply_chars: usize,
    max_attempts: u32,
    attempt_cap: u32,
}

impl Generator {
    /// `attempt_cap` is the most attempts the stage graph has steps for;
    /// no budget, configured or per turn, goes past it.
    pub fn new(min_reply_chars: usize, max_attempts: u32, attempt_cap: u32) -> Self {
        Self {
            min_reply_chars,
            max_attempts,
            attempt_cap: attempt_cap.max(1),
        }
    }

    /// Attempt budget for this turn; a per-turn override wins.
    pub fn attempt_limit(&self, state: &ConversationState) -> u32 {
        state
            .turn_config
            .max_generation_attempts
            .unwrap_or(self.max_attempts)
            .max(MIN_GENERATION_ATTEMPTS)
            .min(self.attempt_cap)
    }

    pub fn assess(&self, reply: &str, attempt: u32, limit: u32) -> Verdict {
        let trimmed = reply.trim();
        if trimmed.chars().count() >= self.min_reply_chars {
            Verdict::Accepted(trimmed.to_string())
        } else if attempt < limit {
            Verdict::Retry {
                next_attempt: attempt + 1,
            }
        } else {
            Verdict::Exhausted
        }
    }

    pub async fn run(&self, state: &ConversationState, attempt: u32, ctx: StageContext<'_>) -> Command {
        let request = CompletionRequest::new(state.turn_config.model.clone(), build_prompt(state));
        let result = guarded(ctx.timeouts.llm, "generation", ctx.services.llm.complete(&request)).await;

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => {
                warn!(thread_id = %state.thread_id, attempt, error = %e, "Generation failed");
                return Command::goto(Stage::Escalator {
                    reason: EscalationReason::GenerationFailed,
                })
                .with_warning(ChatError::GenerationFailure(e));
            }
        };

        let limit = self.attempt_limit(state);
        match self.assess(&reply, attempt, limit) {
            Verdict::Accepted(text) => Command::end(StateUpdate::Reply(text)),
            Verdict::Retry { next_attempt } => {
                info!(thread_id = %state.thread_id, attempt, "Reply too short; retrying");
                Command::goto(Stage::Generator {
                    attempt: next_attempt,
                })
            }
            Verdict::Exhausted => {
                warn!(thread_id = %state.thread_id, attempts = limit, "No acceptable reply");
                Command::goto(Stage::Escalator {
                    reason: EscalationReason::RepliesRejected,
                })
                .with_warning(ChatError::QualityRejection { attempts: limit })
            }
        }
    }
}

/// System instructions with the assembled context, then the live buffer.
pub fn build_prompt(state: &ConversationState) -> Vec<PromptMessage> {
    let mut system = String::from(
        "You are a MakTek support agent. Use the following context to answer the user's question.\n",
    );
    if !state.summary.is_empty() {
        system.push_str(&format!("Conversation summary:\n{}\n", state.summary));
    }
    system.push_str(&format!(
        "Relevant past conversations:\n{}\n",
        state.retrieved_context.join("\n")
    ));
    system.push_str(&format!(
        "Recent history:\n{}\n",
        state.history_context.join("\n")
    ));
    system.push_str("If the answer is not in the context, say 'I don't know' or ask to escalate.");

    let mut prompt = Vec::with_capacity(state.messages.len() + 1);
    prompt.push(PromptMessage::system(system));
    prompt.extend(
        state
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| PromptMessage::new(m.role, m.content.clone())),
    );
    prompt
}
