//! In-memory collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use helpdesk_core::error::{HelpdeskError, Result};
use helpdesk_core::types::{Checkpoint, MemoryHit, Message, Role, StoredMessage, TurnConfig};
use helpdesk_storage::{CheckpointStore, HistoryStore};
use helpdesk_vector::SemanticMemory;

use crate::error::ChatError;
use crate::graph::{Services, StageContext, Timeouts};
use crate::llm::{CompletionRequest, LanguageModel};
use crate::state::ConversationState;
use crate::ticketing::TicketService;

pub(crate) const FALLBACK_ANSWER: &str = "Default answer from the model.";

/// Model that plays back queued results, then a fixed fallback.
pub(crate) struct ScriptedModel {
    script: Mutex<VecDeque<std::result::Result<String, String>>>,
    fallback: std::result::Result<String, String>,
    delay: Option<Duration>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn replying(replies: &[&str]) -> Self {
        Self {
            script: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
            fallback: Ok(FALLBACK_ANSWER.to_string()),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(reply: &str) -> Self {
        Self {
            fallback: Ok(reply.to_string()),
            ..Self::replying(&[])
        }
    }

    pub fn failing() -> Self {
        Self {
            fallback: Err("model unavailable".to_string()),
            ..Self::replying(&[])
        }
    }

    pub fn hanging() -> Self {
        Self {
            delay: Some(Duration::from_secs(3600)),
            ..Self::replying(&[])
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> std::result::Result<String, ChatError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        next.map_err(ChatError::GenerationFailure)
    }
}

/// Semantic memory with canned hits that records upserts.
#[derive(Default)]
pub(crate) struct RecordingMemory {
    pub hits: Mutex<Vec<MemoryHit>>,
    pub fail: AtomicBool,
    pub upserts: Mutex<Vec<(String, String, String, Role)>>,
}

impl RecordingMemory {
    pub fn with_hits(hits: Vec<MemoryHit>) -> Self {
        Self {
            hits: Mutex::new(hits),
            ..Self::default()
        }
    }
}

#[async_trait]
impl SemanticMemory for RecordingMemory {
    async fn upsert(&self, user_id: &str, message_id: &str, content: &str, role: Role) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HelpdeskError::Memory("index offline".into()));
        }
        self.upserts.lock().unwrap().push((
            user_id.to_string(),
            message_id.to_string(),
            content.to_string(),
            role,
        ));
        Ok(())
    }

    async fn query(&self, _user_id: &str, _query_text: &str, top_k: usize) -> Result<Vec<MemoryHit>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HelpdeskError::Memory("index offline".into()));
        }
        Ok(self.hits.lock().unwrap().iter().take(top_k).cloned().collect())
    }

    fn backend(&self) -> &'static str {
        "recording"
    }
}

/// History store kept in a vector.
#[derive(Default)]
pub(crate) struct MemoryHistory {
    pub rows: Mutex<Vec<(String, String, StoredMessage)>>,
    pub fail: AtomicBool,
}

impl MemoryHistory {
    pub fn seed(&self, user_id: &str, thread_id: &str, role: Role, content: &str) {
        self.rows.lock().unwrap().push((
            user_id.to_string(),
            thread_id.to_string(),
            StoredMessage {
                message_id: Uuid::new_v4().to_string(),
                role,
                content: content.to_string(),
                timestamp: Utc::now(),
            },
        ));
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn load_recent(&self, user_id: &str, thread_id: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HelpdeskError::Storage("database is locked".into()));
        }
        let rows = self.rows.lock().unwrap();
        let matching: Vec<StoredMessage> = rows
            .iter()
            .filter(|(u, t, _)| u == user_id && t == thread_id)
            .map(|(_, _, m)| m.clone())
            .collect();
        let skip = matching.len().saturating_sub(limit);
        Ok(matching.into_iter().skip(skip).collect())
    }

    async fn append(&self, user_id: &str, thread_id: &str, role: Role, content: &str) -> Result<String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HelpdeskError::Storage("database is locked".into()));
        }
        let id = Uuid::new_v4().to_string();
        self.rows.lock().unwrap().push((
            user_id.to_string(),
            thread_id.to_string(),
            StoredMessage {
                message_id: id.clone(),
                role,
                content: content.to_string(),
                timestamp: Utc::now(),
            },
        ));
        Ok(id)
    }
}

/// Checkpoint store kept in a map.
#[derive(Default)]
pub(crate) struct MemoryCheckpoints {
    pub saved: Mutex<HashMap<String, Checkpoint>>,
    pub fail_load: AtomicBool,
    pub fail_save: AtomicBool,
}

#[async_trait]
impl CheckpointStore for MemoryCheckpoints {
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(HelpdeskError::Storage("checkpoint table missing".into()));
        }
        Ok(self.saved.lock().unwrap().get(thread_id).cloned())
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(HelpdeskError::Storage("disk full".into()));
        }
        self.saved
            .lock()
            .unwrap()
            .insert(checkpoint.thread_id.clone(), checkpoint.clone());
        Ok(())
    }
}

/// Ticket service that counts calls and can be told to fail.
#[derive(Default)]
pub(crate) struct CountingTickets {
    calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl CountingTickets {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TicketService for CountingTickets {
    async fn create_ticket(&self, _issue: &str, _user_id: &str) -> std::result::Result<String, ChatError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail.load(Ordering::SeqCst) {
            return Err(ChatError::EscalationFailure("ticketing returned 503".into()));
        }
        Ok(format!(
            "Support ticket #TICKET-{:04} has been created for your issue.",
            n
        ))
    }
}

/// One of each fake, wired together.
pub(crate) struct Fakes {
    pub llm: Arc<ScriptedModel>,
    pub memory: Arc<RecordingMemory>,
    pub history: Arc<MemoryHistory>,
    pub checkpoints: Arc<MemoryCheckpoints>,
    pub tickets: Arc<CountingTickets>,
    services: Services,
}

impl Fakes {
    pub fn new(llm: ScriptedModel) -> Self {
        Self::with_memory(llm, RecordingMemory::default())
    }

    pub fn with_memory(llm: ScriptedModel, memory: RecordingMemory) -> Self {
        let llm = Arc::new(llm);
        let memory = Arc::new(memory);
        let history = Arc::new(MemoryHistory::default());
        let checkpoints = Arc::new(MemoryCheckpoints::default());
        let tickets = Arc::new(CountingTickets::default());
        let services = Services {
            llm: llm.clone(),
            memory: memory.clone(),
            history: history.clone(),
            checkpoints: checkpoints.clone(),
            tickets: tickets.clone(),
        };
        Self {
            llm,
            memory,
            history,
            checkpoints,
            tickets,
            services,
        }
    }

    pub fn services(&self) -> Services {
        self.services.clone()
    }

    pub fn context(&self) -> StageContext<'_> {
        StageContext {
            services: &self.services,
            timeouts: Timeouts::default(),
        }
    }
}

/// Fresh state for `user_123` / `thread_1` holding a single user message.
pub(crate) fn state_with_message(text: &str) -> ConversationState {
    ConversationState::resume(
        Checkpoint::empty("user_123", "thread_1"),
        Message::user(text),
        TurnConfig::default(),
    )
}

/// State whose buffer holds `n` alternating messages ending in a user message.
pub(crate) fn state_with_history(n: usize) -> ConversationState {
    let mut checkpoint = Checkpoint::empty("user_123", "thread_1");
    for i in 0..n.saturating_sub(1) {
        let message = if i % 2 == 0 {
            Message::user(format!("question {}", i))
        } else {
            Message::assistant(format!("answer {}", i))
        };
        checkpoint.messages.push(message);
    }
    ConversationState::resume(checkpoint, Message::user("latest question"), TurnConfig::default())
}
