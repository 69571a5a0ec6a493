//! Compactor: folds long buffers into the running summary.

use tracing::{info, warn};

use helpdesk_core::types::Message;

use crate::error::ChatError;
use crate::graph::{Command, Stage, StageContext};
use crate::guard::guarded;
use crate::llm::{CompletionRequest, PromptMessage};
use crate::state::{ConversationState, StateUpdate};

#[derive(Clone, Copy, Debug)]
pub struct Compactor {
    threshold: usize,
    keep_recent: usize,
}

impl Compactor {
    pub fn new(threshold: usize, keep_recent: usize) -> Self {
        Self {
            threshold,
            keep_recent: keep_recent.max(1),
        }
    }

    fn needs_compaction(&self, state: &ConversationState) -> bool {
        state.messages.len() > self.threshold
    }

    /// Always continues to the router. A failed summary leaves the buffer
    /// and summary exactly as they were.
    pub async fn run(&self, state: &ConversationState, ctx: StageContext<'_>) -> Command {
        let next = Command::goto(Stage::Router);
        if !self.needs_compaction(state) {
            return next;
        }

        let request = CompletionRequest::new(
            state.turn_config.model.clone(),
            vec![PromptMessage::user(summary_prompt(&state.summary, &state.messages))],
        );
        let result = guarded(
            ctx.timeouts.llm,
            "summarization",
            ctx.services.llm.complete(&request),
        )
        .await;

        match result {
            Ok(summary) if !summary.trim().is_empty() => {
                info!(
                    thread_id = %state.thread_id,
                    dropped = state.messages.len() - self.keep_recent.min(state.messages.len()),
                    "Compacted conversation buffer"
                );
                next.with_update(StateUpdate::Compacted {
                    summary: summary.trim().to_string(),
                    keep_recent: self.keep_recent,
                })
            }
            Ok(_) => {
                warn!(thread_id = %state.thread_id, "Summarizer returned an empty summary");
                next.with_warning(ChatError::SummaryFailure("empty summary".to_string()))
            }
            Err(e) => {
                warn!(thread_id = %state.thread_id, error = %e, "Summarization failed; keeping buffer");
                next.with_warning(ChatError::SummaryFailure(e))
            }
        }
    }
}

fn summary_prompt(summary: &str, messages: &[Message]) -> String {
    let lines: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    format!(
        "Previous summary: {}\n\nNew lines of conversation:\n{}\n\n\
         Summarize the conversation so far, retaining key details for customer support.",
        summary,
        lines.join("\n")
    )
}
