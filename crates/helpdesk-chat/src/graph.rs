//! The stage graph: stage identities, transitions, and the dispatch loop.
//!
//! Every stage is a function of the current [`ConversationState`] that
//! returns a [`Command`]: a state update plus the next stage (or the end of
//! the turn). The graph applies updates itself, so stages never mutate
//! shared state directly.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use helpdesk_core::config::{DialogueConfig, HelpdeskConfig, MemoryConfig};
use helpdesk_storage::{CheckpointStore, HistoryStore};
use helpdesk_vector::SemanticMemory;

use crate::error::ChatError;
use crate::llm::LanguageModel;
use crate::stages::escalator::ESCALATION_FALLBACK_REPLY;
use crate::stages::{Compactor, Escalator, Generator, IntentGate, MemoryRetriever, Router};
use crate::state::{ConversationState, StateUpdate};
use crate::ticketing::TicketService;

// =============================================================================
// Stage identities
// =============================================================================

/// Stage name without per-stage data, used for tracing and turn paths.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageName {
    IntentGate,
    Compactor,
    Router,
    Retriever,
    Generator,
    Escalator,
}

impl StageName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::IntentGate => "intent_gate",
            StageName::Compactor => "compactor",
            StageName::Router => "router",
            StageName::Retriever => "retriever",
            StageName::Generator => "generator",
            StageName::Escalator => "escalator",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a conversation was handed to a human.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EscalationReason {
    /// The user asked for a human.
    UserRequested,
    /// No recall and the question is outside the support domain.
    OutOfDomain,
    /// The model failed or timed out.
    GenerationFailed,
    /// Every generation attempt produced an unacceptable reply.
    RepliesRejected,
}

/// A stage together with the data it needs for this step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    IntentGate,
    Compactor,
    Router,
    Retriever,
    /// `attempt` is 1-based.
    Generator { attempt: u32 },
    Escalator { reason: EscalationReason },
}

impl Stage {
    pub fn name(&self) -> StageName {
        match self {
            Stage::IntentGate => StageName::IntentGate,
            Stage::Compactor => StageName::Compactor,
            Stage::Router => StageName::Router,
            Stage::Retriever => StageName::Retriever,
            Stage::Generator { .. } => StageName::Generator,
            Stage::Escalator { .. } => StageName::Escalator,
        }
    }
}

/// Where control goes after a stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Goto {
    Stage(Stage),
    End,
}

/// Result of running one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub update: StateUpdate,
    pub goto: Goto,
    /// Failures the stage absorbed instead of failing the turn.
    pub warnings: Vec<ChatError>,
}

impl Command {
    /// Move to `stage` without changing state.
    pub fn goto(stage: Stage) -> Self {
        Self {
            update: StateUpdate::None,
            goto: Goto::Stage(stage),
            warnings: Vec::new(),
        }
    }

    /// Apply `update` and end the turn.
    pub fn end(update: StateUpdate) -> Self {
        Self {
            update,
            goto: Goto::End,
            warnings: Vec::new(),
        }
    }

    pub fn with_update(mut self, update: StateUpdate) -> Self {
        self.update = update;
        self
    }

    pub fn with_warning(mut self, warning: ChatError) -> Self {
        self.warnings.push(warning);
        self
    }
}

// =============================================================================
// Collaborators
// =============================================================================

/// External collaborators shared by every turn.
#[derive(Clone)]
pub struct Services {
    pub llm: Arc<dyn LanguageModel>,
    pub memory: Arc<dyn SemanticMemory>,
    pub history: Arc<dyn HistoryStore>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub tickets: Arc<dyn TicketService>,
}

/// Per-collaborator call deadlines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub llm: Duration,
    pub memory: Duration,
    pub storage: Duration,
    pub ticketing: Duration,
}

impl Timeouts {
    pub fn from_config(config: &HelpdeskConfig) -> Self {
        Self {
            llm: config.llm.timeout(),
            memory: config.memory.timeout(),
            storage: config.storage.timeout(),
            ticketing: config.ticketing.timeout(),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from_config(&HelpdeskConfig::default())
    }
}

/// What a stage may reach while it runs.
#[derive(Clone, Copy)]
pub struct StageContext<'a> {
    pub services: &'a Services,
    pub timeouts: Timeouts,
}

// =============================================================================
// Dispatch
// =============================================================================

/// Record of one pass through the graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnTrace {
    pub path: Vec<StageName>,
    /// Ticket confirmation, when the turn opened one.
    pub ticket: Option<String>,
    pub warnings: Vec<ChatError>,
}

impl TurnTrace {
    /// Whether the turn was cut off by the step cap.
    pub fn hit_step_limit(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, ChatError::StepLimitExceeded(_)))
    }

    /// Whether the intent gate let the message into the main flow.
    pub fn passed_intent_gate(&self) -> bool {
        self.hit_step_limit() || self.path.iter().any(|s| *s != StageName::IntentGate)
    }
}

/// The fixed support dialogue graph.
pub struct DialogueGraph {
    services: Services,
    timeouts: Timeouts,
    intent_gate: IntentGate,
    compactor: Compactor,
    router: Router,
    retriever: MemoryRetriever,
    generator: Generator,
    escalator: Escalator,
    max_steps: usize,
}

impl DialogueGraph {
    pub fn new(
        services: Services,
        dialogue: &DialogueConfig,
        memory: &MemoryConfig,
        timeouts: Timeouts,
    ) -> Self {
        let max_steps = dialogue.max_stage_steps.max(1);
        Self {
            services,
            timeouts,
            intent_gate: IntentGate,
            compactor: Compactor::new(dialogue.compaction_threshold, dialogue.keep_recent),
            router: Router,
            retriever: MemoryRetriever::new(
                memory.top_k,
                memory.history_limit,
                dialogue.out_of_domain_markers.clone(),
            ),
            generator: Generator::new(
                dialogue.min_reply_chars,
                dialogue.max_generation_attempts,
                dialogue.generation_attempt_cap(),
            ),
            escalator: Escalator,
            max_steps,
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Drive `state` from the intent gate to the end of the turn.
    ///
    /// Every collaborator failure is absorbed by the stage that saw it and
    /// recorded in the trace. Hitting the step cap ends the turn with the
    /// escalation apology and a [`ChatError::StepLimitExceeded`] warning.
    pub async fn run(&self, state: &mut ConversationState) -> Result<TurnTrace, ChatError> {
        if state.messages.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let ctx = StageContext {
            services: &self.services,
            timeouts: self.timeouts,
        };
        let mut trace = TurnTrace::default();
        let mut stage = Stage::IntentGate;

        for _ in 0..self.max_steps {
            trace.path.push(stage.name());
            debug!(stage = %stage.name(), thread_id = %state.thread_id, "Running stage");

            let Command {
                update,
                goto,
                warnings,
            } = self.dispatch(stage, state, ctx).await;

            trace.warnings.extend(warnings);
            if let StateUpdate::Escalated {
                ticket: Some(ticket),
                ..
            } = &update
            {
                trace.ticket = Some(ticket.clone());
            }
            state.apply(update);

            match goto {
                Goto::End => return Ok(trace),
                Goto::Stage(next) => stage = next,
            }
        }

        warn!(
            thread_id = %state.thread_id,
            steps = self.max_steps,
            path = ?trace.path,
            "Stage graph hit its step cap"
        );
        state.apply(StateUpdate::Escalated {
            reply: ESCALATION_FALLBACK_REPLY.to_string(),
            ticket: None,
        });
        trace
            .warnings
            .push(ChatError::StepLimitExceeded(self.max_steps));
        Ok(trace)
    }

    async fn dispatch(
        &self,
        stage: Stage,
        state: &ConversationState,
        ctx: StageContext<'_>,
    ) -> Command {
        match stage {
            Stage::IntentGate => self.intent_gate.run(state),
            Stage::Compactor => self.compactor.run(state, ctx).await,
            Stage::Router => self.router.run(state),
            Stage::Retriever => self.retriever.run(state, ctx).await,
            Stage::Generator { attempt } => self.generator.run(state, attempt, ctx).await,
            Stage::Escalator { reason } => self.escalator.run(state, reason, ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{state_with_message, Fakes, ScriptedModel};
    use helpdesk_core::types::{Message, Role};

    fn graph(fakes: &Fakes, dialogue: DialogueConfig) -> DialogueGraph {
        DialogueGraph::new(
            fakes.services(),
            &dialogue,
            &MemoryConfig::default(),
            Timeouts::default(),
        )
    }

    #[tokio::test]
    async fn test_greeting_ends_at_intent_gate() {
        let fakes = Fakes::new(ScriptedModel::replying(&[]));
        let graph = graph(&fakes, DialogueConfig::default());
        let mut state = state_with_message("hello");

        let trace = graph.run(&mut state).await.unwrap();
        assert_eq!(trace.path, vec![StageName::IntentGate]);
        assert!(!trace.passed_intent_gate());
        assert_eq!(fakes.llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_normal_turn_path() {
        let fakes = Fakes::new(ScriptedModel::replying(&[
            "Hold the power button for ten seconds.",
        ]));
        let graph = graph(&fakes, DialogueConfig::default());
        let mut state = state_with_message("My tablet will not turn on");

        let trace = graph.run(&mut state).await.unwrap();
        assert_eq!(
            trace.path,
            vec![
                StageName::IntentGate,
                StageName::Compactor,
                StageName::Router,
                StageName::Retriever,
                StageName::Generator,
            ]
        );
        assert!(trace.passed_intent_gate());
        assert!(trace.ticket.is_none());
        assert_eq!(state.reply(), Some("Hold the power button for ten seconds."));
    }

    #[tokio::test]
    async fn test_escalation_records_ticket() {
        let fakes = Fakes::new(ScriptedModel::replying(&[]));
        let graph = graph(&fakes, DialogueConfig::default());
        let mut state = state_with_message("I need a human agent now");

        let trace = graph.run(&mut state).await.unwrap();
        assert_eq!(trace.path.last(), Some(&StageName::Escalator));
        assert!(trace.ticket.is_some());
        assert_eq!(fakes.tickets.calls(), 1);
    }

    #[tokio::test]
    async fn test_step_cap_is_enforced() {
        let fakes = Fakes::new(ScriptedModel::replying(&["A perfectly fine reply."]));
        let dialogue = DialogueConfig {
            max_stage_steps: 3,
            ..DialogueConfig::default()
        };
        let graph = graph(&fakes, dialogue);
        let mut state = state_with_message("My tablet will not turn on");

        let trace = graph.run(&mut state).await.unwrap();
        assert!(trace.hit_step_limit());
        assert_eq!(
            trace.path,
            vec![StageName::IntentGate, StageName::Compactor, StageName::Router]
        );
        assert_eq!(trace.warnings, vec![ChatError::StepLimitExceeded(3)]);
        assert_eq!(state.reply(), Some(ESCALATION_FALLBACK_REPLY));
    }

    #[tokio::test]
    async fn test_oversized_retry_budget_still_reaches_escalator() {
        let fakes = Fakes::new(ScriptedModel::always("ok"));
        let graph = graph(&fakes, DialogueConfig::default());
        let mut state = state_with_message("My tablet will not turn on");
        state.turn_config.max_generation_attempts = Some(20);

        let trace = graph.run(&mut state).await.unwrap();
        assert!(!trace.hit_step_limit());
        assert_eq!(trace.path.len(), 16);
        assert_eq!(trace.path.last(), Some(&StageName::Escalator));
        assert_eq!(fakes.llm.calls(), 11);
        assert!(trace.ticket.is_some());
        assert_eq!(fakes.tickets.calls(), 1);
    }

    #[tokio::test]
    async fn test_rejects_empty_buffer() {
        let fakes = Fakes::new(ScriptedModel::replying(&[]));
        let graph = graph(&fakes, DialogueConfig::default());
        let mut state = state_with_message("x");
        state.messages.clear();

        assert!(matches!(
            graph.run(&mut state).await,
            Err(ChatError::EmptyMessage)
        ));
    }

    #[tokio::test]
    async fn test_every_turn_ends_with_assistant_message() {
        let fakes = Fakes::new(ScriptedModel::replying(&["ok"]));
        let graph = graph(&fakes, DialogueConfig::default());

        for text in ["hi", "you are useless", "escalate please", "what's the weather", "printer jam"] {
            let mut state = state_with_message(text);
            graph.run(&mut state).await.unwrap();
            let last: &Message = state.latest_message().unwrap();
            assert_eq!(last.role, Role::Assistant, "no reply for {:?}", text);
        }
    }

    #[test]
    fn test_command_builders() {
        let cmd = Command::goto(Stage::Router)
            .with_warning(ChatError::SummaryFailure("model down".into()));
        assert_eq!(cmd.goto, Goto::Stage(Stage::Router));
        assert_eq!(cmd.update, StateUpdate::None);
        assert_eq!(
            cmd.warnings,
            vec![ChatError::SummaryFailure("model down".into())]
        );

        let cmd = Command::end(StateUpdate::Reply("bye".into()));
        assert_eq!(cmd.goto, Goto::End);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::Generator { attempt: 2 }.name(), StageName::Generator);
        assert_eq!(
            Stage::Escalator {
                reason: EscalationReason::OutOfDomain
            }
            .name()
            .to_string(),
            "escalator"
        );
    }
}
