//! Router: explicit requests for a human skip straight to escalation.

use crate::graph::{Command, EscalationReason, Stage};
use crate::state::ConversationState;

pub const ESCALATION_KEYWORDS: &[&str] = &["human", "agent", "support ticket", "escalate"];

/// Whether `text` asks for a human.
pub fn wants_human(text: &str) -> bool {
    let lowered = text.to_lowercase();
    ESCALATION_KEYWORDS.iter().any(|k| lowered.contains(k))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Router;

impl Router {
    pub fn run(&self, state: &ConversationState) -> Command {
        let asks_for_human = state
            .latest_user_message()
            .is_some_and(|m| wants_human(&m.content));

        if asks_for_human {
            Command::goto(Stage::Escalator {
                reason: EscalationReason::UserRequested,
            })
        } else {
            Command::goto(Stage::Retriever)
        }
    }
}
