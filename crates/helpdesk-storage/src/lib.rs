//! Durable conversation storage: SQLite message history and per-thread
//! checkpoints.
//!
//! Provides a WAL-mode SQLite database with migrations, synchronous
//! repositories over it, and async store traits that the dialogue
//! orchestrator consumes.

pub mod checkpoint;
pub mod db;
pub mod history;
pub mod migrations;
pub mod store;

pub use checkpoint::CheckpointRepository;
pub use db::Database;
pub use history::HistoryRepository;
pub use store::{CheckpointStore, HistoryStore, SqliteCheckpointStore, SqliteHistoryStore};
