//! Error types for the dialogue orchestrator.

use helpdesk_core::error::HelpdeskError;

/// Apology shown whenever a turn cannot produce a normal reply.
pub const APOLOGY_REPLY: &str =
    "I'm sorry, something went wrong on our side while handling your message. \
     Please try again in a moment.";

/// Errors raised while processing a conversation turn.
///
/// Stages absorb most of these and report them as turn warnings: retrieval
/// and persistence failures degrade the turn, generation failures turn into
/// an escalation. Only input validation and checkpoint loading surface from
/// [`SupportOrchestrator::handle_turn`](crate::SupportOrchestrator::handle_turn).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("thread {thread_id} belongs to a different user")]
    ThreadOwnership { thread_id: String },
    #[error("retrieval failed: {0}")]
    RetrievalFailure(String),
    #[error("summarization failed: {0}")]
    SummaryFailure(String),
    #[error("generation failed: {0}")]
    GenerationFailure(String),
    #[error("reply rejected after {attempts} attempts")]
    QualityRejection { attempts: u32 },
    #[error("persistence failed: {0}")]
    PersistenceFailure(String),
    #[error("escalation failed: {0}")]
    EscalationFailure(String),
    #[error("stage graph exceeded {0} steps")]
    StepLimitExceeded(usize),
}

impl ChatError {
    /// Whether a turn can still complete normally after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ChatError::RetrievalFailure(_)
                | ChatError::SummaryFailure(_)
                | ChatError::QualityRejection { .. }
                | ChatError::PersistenceFailure(_)
                | ChatError::EscalationFailure(_)
        )
    }

    /// Natural-language text to show the user in place of this error.
    pub fn user_message(&self) -> String {
        match self {
            ChatError::EmptyMessage => "Please type a message so I can help you.".to_string(),
            ChatError::MessageTooLong(max) => format!(
                "Your message is a bit long for me. Could you shorten it to under {} characters?",
                max
            ),
            _ => APOLOGY_REPLY.to_string(),
        }
    }
}

impl From<HelpdeskError> for ChatError {
    fn from(err: HelpdeskError) -> Self {
        ChatError::PersistenceFailure(err.to_string())
    }
}
