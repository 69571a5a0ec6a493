//! Escalator: opens a ticket and hands the user to a human.

use tracing::{error, info};

use crate::error::ChatError;
use crate::graph::{Command, EscalationReason, StageContext};
use crate::guard::guarded;
use crate::state::{ConversationState, StateUpdate};

/// Sent when the ticketing service cannot be reached.
pub const ESCALATION_FALLBACK_REPLY: &str = "I'm sorry I couldn't help with that. \
I wasn't able to open a support ticket just now, so please try again shortly \
or contact MakTek support directly.";

pub fn escalation_reply(confirmation: &str) -> String {
    format!(
        "I'm sorry I couldn't help with that. {}\nA human agent will contact you shortly.",
        confirmation
    )
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Escalator;

impl Escalator {
    /// Always ends the turn with an apology, ticket or not.
    pub async fn run(
        &self,
        state: &ConversationState,
        reason: EscalationReason,
        ctx: StageContext<'_>,
    ) -> Command {
        let issue = state
            .latest_user_message()
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let result = guarded(
            ctx.timeouts.ticketing,
            "ticket creation",
            ctx.services.tickets.create_ticket(issue, &state.user_id),
        )
        .await;

        match result {
            Ok(confirmation) => {
                info!(thread_id = %state.thread_id, ?reason, "Escalated to a human agent");
                Command::end(StateUpdate::Escalated {
                    reply: escalation_reply(&confirmation),
                    ticket: Some(confirmation),
                })
            }
            Err(e) => {
                error!(thread_id = %state.thread_id, ?reason, error = %e, "Ticket creation failed");
                Command::end(StateUpdate::Escalated {
                    reply: ESCALATION_FALLBACK_REPLY.to_string(),
                    ticket: None,
                })
                .with_warning(ChatError::EscalationFailure(e))
            }
        }
    }
}
