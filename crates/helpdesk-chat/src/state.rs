//! Per-turn conversation state and the updates stages return.

use chrono::Utc;
use helpdesk_core::types::{Checkpoint, Message, Role, TurnConfig};

/// Working state carried through the stage graph for one turn.
///
/// `messages` and `summary` persist across turns through the checkpoint.
/// `retrieved_context` and `history_context` are rebuilt by the retriever
/// every turn and never written anywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationState {
    pub user_id: String,
    pub thread_id: String,
    pub messages: Vec<Message>,
    pub summary: String,
    pub retrieved_context: Vec<String>,
    pub history_context: Vec<String>,
    pub turn_config: TurnConfig,
    pub turn_count: u64,
}

/// State change produced by a stage. Applied by the graph, never by stages.
#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    None,
    /// Append an assistant reply that ends the turn.
    Reply(String),
    /// Append the escalation reply; `ticket` is the confirmation when one
    /// was created.
    Escalated {
        reply: String,
        ticket: Option<String>,
    },
    /// Replace the summary and drop all but the newest `keep_recent` messages.
    Compacted { summary: String, keep_recent: usize },
    /// Context assembled by the retriever for this turn.
    Context {
        retrieved: Vec<String>,
        history: Vec<String>,
    },
    /// Clear per-turn context (relevance gate tripped).
    ClearContext,
}

impl ConversationState {
    /// Resume a thread from its checkpoint and append the new user message.
    pub fn resume(checkpoint: Checkpoint, user_message: Message, turn_config: TurnConfig) -> Self {
        let mut messages = checkpoint.messages;
        messages.push(user_message);
        Self {
            user_id: checkpoint.user_id,
            thread_id: checkpoint.thread_id,
            messages,
            summary: checkpoint.summary,
            retrieved_context: Vec::new(),
            history_context: Vec::new(),
            turn_config,
            turn_count: checkpoint.turn_count,
        }
    }

    pub fn latest_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Most recent user-authored message in the buffer.
    pub fn latest_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }

    /// The final assistant reply, if the turn produced one.
    pub fn reply(&self) -> Option<&str> {
        self.latest_message()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    pub fn apply(&mut self, update: StateUpdate) {
        match update {
            StateUpdate::None => {}
            StateUpdate::Reply(reply) | StateUpdate::Escalated { reply, .. } => {
                self.messages.push(Message::assistant(reply));
            }
            StateUpdate::Compacted {
                summary,
                keep_recent,
            } => {
                let keep = keep_recent.max(1);
                if self.messages.len() > keep {
                    self.messages.drain(..self.messages.len() - keep);
                }
                self.summary = summary;
            }
            StateUpdate::Context { retrieved, history } => {
                self.retrieved_context = retrieved;
                self.history_context = history;
            }
            StateUpdate::ClearContext => {
                self.retrieved_context.clear();
                self.history_context.clear();
            }
        }
    }

    /// Snapshot of the persistent parts of this state.
    pub fn to_checkpoint(&self) -> Checkpoint {
        Checkpoint {
            thread_id: self.thread_id.clone(),
            user_id: self.user_id.clone(),
            summary: self.summary.clone(),
            messages: self.messages.clone(),
            turn_count: self.turn_count,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(n: usize) -> ConversationState {
        let mut checkpoint = Checkpoint::empty("user_123", "thread_1");
        for i in 0..n.saturating_sub(1) {
            checkpoint.messages.push(Message::user(format!("m{}", i)));
        }
        ConversationState::resume(checkpoint, Message::user("latest"), TurnConfig::default())
    }

    #[test]
    fn test_resume_appends_user_message() {
        let state = state_with(3);
        assert_eq!(state.messages.len(), 3);
        assert_eq!(state.latest_message().unwrap().content, "latest");
        assert!(state.retrieved_context.is_empty());
        assert_eq!(state.user_id, "user_123");
    }

    #[test]
    fn test_compaction_keeps_newest_messages() {
        let mut state = state_with(7);
        state.apply(StateUpdate::Compacted {
            summary: "User has a broken charger.".into(),
            keep_recent: 2,
        });
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[1].content, "latest");
        assert_eq!(state.messages[0].content, "m5");
        assert_eq!(state.summary, "User has a broken charger.");
    }

    #[test]
    fn test_compaction_never_empties_buffer() {
        let mut state = state_with(3);
        state.apply(StateUpdate::Compacted {
            summary: "s".into(),
            keep_recent: 0,
        });
        assert_eq!(state.messages.len(), 1);
    }

    #[test]
    fn test_reply_and_escalation_append_assistant_message() {
        let mut state = state_with(1);
        assert!(state.reply().is_none());
        state.apply(StateUpdate::Escalated {
            reply: "ticket opened".into(),
            ticket: Some("TICKET-0001".into()),
        });
        assert_eq!(state.reply(), Some("ticket opened"));
        assert_eq!(state.latest_user_message().unwrap().content, "latest");
    }

    #[test]
    fn test_context_is_not_checkpointed() {
        let mut state = state_with(1);
        state.apply(StateUpdate::Context {
            retrieved: vec!["user (past): old".into()],
            history: vec!["User: hi".into()],
        });
        assert_eq!(state.retrieved_context.len(), 1);

        let checkpoint = state.to_checkpoint();
        let json = serde_json::to_string(&checkpoint).unwrap();
        assert!(!json.contains("(past)"));

        state.apply(StateUpdate::ClearContext);
        assert!(state.retrieved_context.is_empty());
        assert!(state.history_context.is_empty());
    }
}
