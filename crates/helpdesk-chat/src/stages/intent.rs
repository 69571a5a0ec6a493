//! Intent gate: short-circuits abusive messages and bare greetings.

use tracing::info;

use crate::graph::{Command, Stage};
use crate::state::{ConversationState, StateUpdate};

pub const ABUSIVE_KEYWORDS: &[&str] = &[
    "stupid", "idiot", "dumb", "hate you", "shut up", "useless", "fuck", "shit", "bitch",
    "asshole",
];

pub const GREETINGS: &[&str] = &[
    "hi",
    "hello",
    "hey",
    "greetings",
    "good morning",
    "good afternoon",
    "good evening",
];

pub const REFUSAL_REPLY: &str = "I'm here to help you, but I expect respectful communication. \
Please refrain from using offensive language so we can solve your issue constructively.";

pub const GREETING_REPLY: &str = "Hello! How can I assist you with MakTek support today?";

/// Coarse classification of an incoming message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    Abusive,
    Greeting,
    Support,
}

/// Classify `text`. Abuse wins over a greeting.
pub fn classify(text: &str) -> Intent {
    let normalized = text.trim().to_lowercase();
    if ABUSIVE_KEYWORDS.iter().any(|k| normalized.contains(k)) {
        Intent::Abusive
    } else if GREETINGS.contains(&normalized.as_str()) {
        Intent::Greeting
    } else {
        Intent::Support
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct IntentGate;

impl IntentGate {
    pub fn run(&self, state: &ConversationState) -> Command {
        let text = state
            .latest_message()
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        match classify(text) {
            Intent::Abusive => {
                info!(thread_id = %state.thread_id, "Refusing abusive message");
                Command::end(StateUpdate::Reply(REFUSAL_REPLY.to_string()))
            }
            Intent::Greeting => Command::end(StateUpdate::Reply(GREETING_REPLY.to_string())),
            Intent::Support => Command::goto(Stage::Compactor),
        }
    }
}
