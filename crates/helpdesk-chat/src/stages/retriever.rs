//! Memory retriever: semantic recall plus recent persisted history.
//!
//! Both lookups run concurrently and each is bounded by its own deadline.
//! A failed lookup degrades to its placeholder; it never fails the turn.

use tracing::{debug, warn};

use helpdesk_core::types::{MemoryHit, StoredMessage};

use crate::error::ChatError;
use crate::graph::{Command, EscalationReason, Stage, StageContext};
use crate::guard::guarded;
use crate::state::{ConversationState, StateUpdate};

pub const NO_SEMANTIC_CONTEXT: &str = "No relevant past conversations found.";
pub const NO_HISTORY_CONTEXT: &str = "No previous conversation history.";

#[derive(Clone, Debug)]
pub struct MemoryRetriever {
    top_k: usize,
    history_limit: usize,
    out_of_domain_markers: Vec<String>,
}

impl MemoryRetriever {
    pub fn new(top_k: usize, history_limit: usize, out_of_domain_markers: Vec<String>) -> Self {
        Self {
            top_k,
            history_limit,
            out_of_domain_markers: out_of_domain_markers
                .into_iter()
                .map(|m| m.to_lowercase())
                .collect(),
        }
    }

    pub fn is_out_of_domain(&self, query: &str) -> bool {
        let lowered = query.to_lowercase();
        self.out_of_domain_markers
            .iter()
            .any(|marker| lowered.contains(marker.as_str()))
    }

    pub async fn run(&self, state: &ConversationState, ctx: StageContext<'_>) -> Command {
        let query = state
            .latest_user_message()
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let recall = guarded(
            ctx.timeouts.memory,
            "semantic recall",
            ctx.services.memory.query(&state.user_id, query, self.top_k),
        );
        let history = guarded(
            ctx.timeouts.storage,
            "history load",
            ctx.services
                .history
                .load_recent(&state.user_id, &state.thread_id, self.history_limit),
        );
        let (recall, history) = tokio::join!(recall, history);

        let mut warnings = Vec::new();
        let hits = recall.unwrap_or_else(|e| {
            warn!(user_id = %state.user_id, error = %e, "Semantic recall failed");
            warnings.push(ChatError::RetrievalFailure(e));
            Vec::new()
        });
        let past = history.unwrap_or_else(|e| {
            warn!(thread_id = %state.thread_id, error = %e, "History load failed");
            warnings.push(ChatError::RetrievalFailure(e));
            Vec::new()
        });

        debug!(
            hits = hits.len(),
            history = past.len(),
            backend = ctx.services.memory.backend(),
            "Retrieved context"
        );

        let mut command = if hits.is_empty() && self.is_out_of_domain(query) {
            Command::goto(Stage::Escalator {
                reason: EscalationReason::OutOfDomain,
            })
            .with_update(StateUpdate::ClearContext)
        } else {
            Command::goto(Stage::Generator { attempt: 1 }).with_update(StateUpdate::Context {
                retrieved: render_hits(&hits),
                history: render_history(&past),
            })
        };
        command.warnings = warnings;
        command
    }
}

fn render_hits(hits: &[MemoryHit]) -> Vec<String> {
    if hits.is_empty() {
        return vec![NO_SEMANTIC_CONTEXT.to_string()];
    }
    hits.iter()
        .map(|h| format!("{} (past): {}", h.role.as_str(), h.content))
        .collect()
}

fn render_history(messages: &[StoredMessage]) -> Vec<String> {
    if messages.is_empty() {
        return vec![NO_HISTORY_CONTEXT.to_string()];
    }
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.title(), m.content))
        .collect()
}
