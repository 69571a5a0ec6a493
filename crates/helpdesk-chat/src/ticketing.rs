//! Ticketing Service seam.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::error::ChatError;

/// Opens support tickets for escalated conversations.
#[async_trait]
pub trait TicketService: Send + Sync {
    /// Create a ticket and return a human-readable confirmation.
    /// Every call creates a new ticket.
    async fn create_ticket(&self, issue: &str, user_id: &str) -> Result<String, ChatError>;
}

/// In-process ticketing that issues `TICKET-NNNN` identifiers.
#[derive(Debug, Default)]
pub struct LocalTicketService {
    created: AtomicUsize,
}

impl LocalTicketService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tickets issued by this instance.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TicketService for LocalTicketService {
    async fn create_ticket(&self, issue: &str, user_id: &str) -> Result<String, ChatError> {
        let number = Uuid::new_v4().as_u128() % 10_000;
        let ticket_id = format!("TICKET-{:04}", number);
        self.created.fetch_add(1, Ordering::Relaxed);
        info!(
            %ticket_id,
            user_id,
            issue_chars = issue.chars().count(),
            "Support ticket created"
        );
        Ok(format!(
            "Support ticket #{} has been created for your issue.",
            ticket_id
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_confirmation_format() {
        let service = LocalTicketService::new();
        let confirmation = service
            .create_ticket("screen flickers", "user_123")
            .await
            .unwrap();
        assert!(confirmation.starts_with("Support ticket #TICKET-"));
        assert!(confirmation.ends_with(" has been created for your issue."));

        let id = confirmation
            .trim_start_matches("Support ticket #TICKET-")
            .split_whitespace()
            .next()
            .unwrap();
        assert_eq!(id.len(), 4);
        assert!(id.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_every_call_creates_a_ticket() {
        let service = LocalTicketService::new();
        service.create_ticket("a", "u").await.unwrap();
        service.create_ticket("a", "u").await.unwrap();
        assert_eq!(service.created(), 2);
    }
}
