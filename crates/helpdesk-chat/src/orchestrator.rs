//! Turn boundary: validation, per-thread serialization, persistence.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use helpdesk_core::config::HelpdeskConfig;
use helpdesk_core::types::{Checkpoint, Message, Role, TurnConfig};

use crate::error::ChatError;
use crate::graph::{DialogueGraph, Services, StageName, Timeouts};
use crate::guard::guarded;
use crate::stages::escalator::ESCALATION_FALLBACK_REPLY;
use crate::state::ConversationState;

/// One user message addressed to a thread.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnInput {
    pub user_id: String,
    pub thread_id: String,
    pub message: String,
    pub turn_config: TurnConfig,
}

impl TurnInput {
    pub fn new(
        user_id: impl Into<String>,
        thread_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            thread_id: thread_id.into(),
            message: message.into(),
            turn_config: TurnConfig::default(),
        }
    }

    pub fn with_config(mut self, turn_config: TurnConfig) -> Self {
        self.turn_config = turn_config;
        self
    }
}

/// Everything a caller learns from a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub checkpoint: Checkpoint,
    pub path: Vec<StageName>,
    /// Ticket confirmation, when the turn escalated successfully.
    pub ticket: Option<String>,
    /// Failures the turn absorbed while still producing a reply.
    pub warnings: Vec<ChatError>,
}

impl TurnOutcome {
    /// Whether any absorbed failure was a fault rather than a degradation.
    pub fn faulted(&self) -> bool {
        self.warnings.iter().any(|w| !w.is_recoverable())
    }
}

/// Runs conversation turns against the dialogue graph.
///
/// Turns on the same thread are serialized; turns on different threads run
/// concurrently.
pub struct SupportOrchestrator {
    graph: DialogueGraph,
    max_message_chars: usize,
    thread_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SupportOrchestrator {
    pub fn new(services: Services, config: &HelpdeskConfig) -> Self {
        let graph = DialogueGraph::new(
            services,
            &config.dialogue,
            &config.memory,
            Timeouts::from_config(config),
        );
        Self {
            graph,
            max_message_chars: config.dialogue.max_message_chars,
            thread_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn handle_turn(&self, input: TurnInput) -> Result<TurnOutcome, ChatError> {
        self.validate(&input.message)?;

        let lock = self.thread_lock(&input.thread_id);
        let _guard = lock.lock().await;
        let started = Instant::now();

        let checkpoint = self.load_checkpoint(&input.user_id, &input.thread_id).await?;
        let user_message = Message::user(input.message.trim());
        let user_message_id = user_message.id;
        let mut state = ConversationState::resume(checkpoint, user_message, input.turn_config);

        let mut trace = self.graph.run(&mut state).await?;

        let reply = state
            .reply()
            .unwrap_or(ESCALATION_FALLBACK_REPLY)
            .to_string();

        // Greetings and refusals stay out of history and recall.
        if trace.passed_intent_gate() {
            self.persist_exchange(&state, user_message_id, &input.message, &reply, &mut trace.warnings)
                .await;
        }

        state.turn_count += 1;
        let checkpoint = state.to_checkpoint();
        if let Err(e) = guarded(
            self.graph.timeouts().storage,
            "checkpoint save",
            self.graph.services().checkpoints.save(&checkpoint),
        )
        .await
        {
            warn!(thread_id = %state.thread_id, error = %e, "Failed to save checkpoint");
            trace.warnings.push(ChatError::PersistenceFailure(e));
        }

        let outcome = TurnOutcome {
            reply,
            checkpoint,
            path: trace.path,
            ticket: trace.ticket,
            warnings: trace.warnings,
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if outcome.faulted() {
            error!(
                user_id = %state.user_id,
                thread_id = %state.thread_id,
                path = ?outcome.path,
                warnings = ?outcome.warnings,
                elapsed_ms,
                "Turn completed after a fault"
            );
        } else {
            info!(
                user_id = %state.user_id,
                thread_id = %state.thread_id,
                path = ?outcome.path,
                escalated = outcome.ticket.is_some(),
                warnings = outcome.warnings.len(),
                elapsed_ms,
                "Turn complete"
            );
        }

        Ok(outcome)
    }

    fn validate(&self, message: &str) -> Result<(), ChatError> {
        if message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if message.chars().count() > self.max_message_chars {
            return Err(ChatError::MessageTooLong(self.max_message_chars));
        }
        Ok(())
    }

    fn thread_lock(&self, thread_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .thread_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Drop locks nobody else is holding or waiting on.
        locks.retain(|id, lock| id == thread_id || Arc::strong_count(lock) > 1);
        locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    async fn load_checkpoint(&self, user_id: &str, thread_id: &str) -> Result<Checkpoint, ChatError> {
        let loaded = guarded(
            self.graph.timeouts().storage,
            "checkpoint load",
            self.graph.services().checkpoints.load(thread_id),
        )
        .await
        .map_err(ChatError::PersistenceFailure)?;

        match loaded {
            Some(checkpoint) if checkpoint.user_id != user_id => {
                warn!(thread_id, "Rejected turn for a thread owned by another user");
                Err(ChatError::ThreadOwnership {
                    thread_id: thread_id.to_string(),
                })
            }
            Some(checkpoint) => {
                debug!(thread_id, messages = checkpoint.messages.len(), "Resumed checkpoint");
                Ok(checkpoint)
            }
            None => Ok(Checkpoint::empty(user_id, thread_id)),
        }
    }

    /// Append the user message and reply to history, then index both for
    /// recall. Failures are logged and reported as warnings only.
    async fn persist_exchange(
        &self,
        state: &ConversationState,
        user_message_id: uuid::Uuid,
        user_text: &str,
        reply: &str,
        warnings: &mut Vec<ChatError>,
    ) {
        let services = self.graph.services();
        let timeouts = self.graph.timeouts();
        let reply_id = state
            .latest_message()
            .map(|m| m.id)
            .unwrap_or_else(uuid::Uuid::new_v4);

        for (role, content, fallback_id) in [
            (Role::User, user_text.trim(), user_message_id),
            (Role::Assistant, reply, reply_id),
        ] {
            let message_id = match guarded(
                timeouts.storage,
                "history append",
                services
                    .history
                    .append(&state.user_id, &state.thread_id, role, content),
            )
            .await
            {
                Ok(id) => id,
                Err(e) => {
                    warn!(thread_id = %state.thread_id, %role, error = %e, "History append failed");
                    warnings.push(ChatError::PersistenceFailure(e));
                    fallback_id.to_string()
                }
            };

            if let Err(e) = guarded(
                timeouts.memory,
                "memory upsert",
                services
                    .memory
                    .upsert(&state.user_id, &message_id, content, role),
            )
            .await
            {
                warn!(user_id = %state.user_id, %role, error = %e, "Memory upsert failed");
                warnings.push(ChatError::PersistenceFailure(e));
            }
        }
    }
}
