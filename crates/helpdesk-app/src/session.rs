//! Interactive console loop over any line reader and writer.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use helpdesk_chat::{SupportOrchestrator, TurnInput};
use helpdesk_core::types::TurnConfig;

const EXIT_COMMANDS: &[&str] = &["quit", "exit"];

/// One user on one thread.
pub struct Session<'a> {
    orchestrator: &'a SupportOrchestrator,
    user_id: String,
    thread_id: String,
    turn_config: TurnConfig,
}

impl<'a> Session<'a> {
    pub fn new(
        orchestrator: &'a SupportOrchestrator,
        user_id: impl Into<String>,
        thread_id: impl Into<String>,
        turn_config: TurnConfig,
    ) -> Self {
        Self {
            orchestrator,
            user_id: user_id.into(),
            thread_id: thread_id.into(),
            turn_config,
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// Read lines until EOF or an exit command. Returns the number of turns
    /// handled.
    pub async fn run<R, W>(&self, input: R, mut output: W) -> std::io::Result<usize>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        let mut turns = 0;

        loop {
            output.write_all(b"You: ").await?;
            output.flush().await?;

            let Some(line) = lines.next_line().await? else {
                break;
            };
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            if EXIT_COMMANDS.contains(&text.to_lowercase().as_str()) {
                break;
            }

            let input = TurnInput::new(&self.user_id, &self.thread_id, text)
                .with_config(self.turn_config.clone());
            let reply = match self.orchestrator.handle_turn(input).await {
                Ok(outcome) => outcome.reply,
                Err(e) => {
                    warn!(thread_id = %self.thread_id, error = %e, "Turn failed");
                    e.user_message()
                }
            };
            turns += 1;

            output
                .write_all(format!("MakTek: {}\n", reply).as_bytes())
                .await?;
        }

        output.flush().await?;
        Ok(turns)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use helpdesk_chat::{LocalTicketService, OpenAiCompatibleClient, Services};
    use helpdesk_core::config::HelpdeskConfig;
    use helpdesk_storage::{Database, SqliteCheckpointStore, SqliteHistoryStore};
    use helpdesk_vector::{HashEmbedding, LocalSemanticMemory};

    fn orchestrator() -> SupportOrchestrator {
        let db = Arc::new(Database::in_memory().unwrap());
        let llm = OpenAiCompatibleClient::new("", Duration::from_millis(200))
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        let services = Services {
            llm: Arc::new(llm),
            memory: Arc::new(LocalSemanticMemory::new(Arc::new(HashEmbedding::default()))),
            history: Arc::new(SqliteHistoryStore::new(db.clone())),
            checkpoints: Arc::new(SqliteCheckpointStore::new(db)),
            tickets: Arc::new(LocalTicketService::new()),
        };
        SupportOrchestrator::new(services, &HelpdeskConfig::default())
    }

    async fn transcript(input: &str) -> (String, usize) {
        let orchestrator = orchestrator();
        let session = Session::new(&orchestrator, "user_123", "thread_1", TurnConfig::default());
        let mut output = Vec::new();
        let turns = session.run(input.as_bytes(), &mut output).await.unwrap();
        (String::from_utf8(output).unwrap(), turns)
    }

    #[tokio::test]
    async fn test_exit_command_stops_session() {
        let (out, turns) = transcript("hello\n\n  EXIT \nhello\n").await;
        assert_eq!(turns, 1);
        assert_eq!(
            out.matches("MakTek: Hello! How can I assist you with MakTek support today?")
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_eof_ends_session() {
        let (out, turns) = transcript("I need a human agent").await;
        assert_eq!(turns, 1);
        assert!(out.contains("MakTek: I'm sorry I couldn't help with that. Support ticket #TICKET-"));
    }

    #[tokio::test]
    async fn test_rejected_message_gets_friendly_reply() {
        let long = "a".repeat(5000);
        let (out, _) = transcript(&format!("{}\nquit\n", long)).await;
        assert!(out.contains("MakTek: Your message is a bit long for me."));
    }
}
