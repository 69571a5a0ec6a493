//! Helpdesk console binary - composition root.
//!
//! 1. Load configuration from TOML (CLI flags override)
//! 2. Open SQLite history and checkpoint storage
//! 3. Build the embedder and semantic memory backend
//! 4. Connect the language model and ticketing services
//! 5. Run the interactive session on stdin/stdout

mod cli;
mod session;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;

use helpdesk_chat::{LocalTicketService, OpenAiCompatibleClient, Services, SupportOrchestrator};
use helpdesk_core::config::{EmbeddingBackend, HelpdeskConfig, MemoryBackend};
use helpdesk_core::types::TurnConfig;
use helpdesk_storage::{Database, SqliteCheckpointStore, SqliteHistoryStore};
use helpdesk_vector::{
    DynEmbeddingService, HashEmbedding, HttpEmbeddingService, LocalSemanticMemory,
    RemoteSemanticMemory, SemanticMemory,
};

use cli::CliArgs;
use session::Session;

/// Resolve `~/` prefixed paths against the user's home directory.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") || data_dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

/// Read a secret from the named environment variable; empty when unset.
fn secret(var: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| {
        tracing::warn!(var, "API key not set; requests needing it will fail");
        String::new()
    })
}

fn build_embedder(
    config: &HelpdeskConfig,
) -> Result<Arc<dyn DynEmbeddingService>, Box<dyn std::error::Error>> {
    let embedding = &config.embedding;
    let embedder: Arc<dyn DynEmbeddingService> = match embedding.backend {
        EmbeddingBackend::Hash => Arc::new(HashEmbedding::new(embedding.dimensions)),
        EmbeddingBackend::Http => Arc::new(HttpEmbeddingService::new(
            &embedding.base_url,
            secret(&embedding.api_key_env),
            &embedding.model,
            embedding.dimensions,
            std::time::Duration::from_secs(embedding.timeout_secs),
        )?),
    };
    Ok(embedder)
}

fn build_memory(
    config: &HelpdeskConfig,
    embedder: Arc<dyn DynEmbeddingService>,
    data_dir: &Path,
) -> Result<Arc<dyn SemanticMemory>, Box<dyn std::error::Error>> {
    let memory = &config.memory;
    let store: Arc<dyn SemanticMemory> = match memory.backend {
        MemoryBackend::Local if memory.snapshot_file.is_empty() => {
            tracing::info!("Using in-memory semantic memory (no snapshot)");
            Arc::new(LocalSemanticMemory::new(embedder))
        }
        MemoryBackend::Local => {
            let path = data_dir.join(&memory.snapshot_file);
            tracing::info!(path = %path.display(), "Using local semantic memory");
            Arc::new(LocalSemanticMemory::with_snapshot(embedder, path)?)
        }
        MemoryBackend::Remote => {
            tracing::info!(url = %memory.remote_url, "Using remote semantic memory");
            Arc::new(RemoteSemanticMemory::new(
                &memory.remote_url,
                secret(&memory.remote_api_key_env),
                embedder,
                memory.timeout(),
            )?)
        }
    };
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let loaded = HelpdeskConfig::load(&config_file);
    let mut config = loaded.as_ref().cloned().unwrap_or_default();
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    let log_level = args
        .resolve_log_level()
        .unwrap_or_else(|| config.general.log_level.clone());

    // Tracing. Logs go to stderr so the conversation owns stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting helpdesk v{}", env!("CARGO_PKG_VERSION"));
    match &loaded {
        Ok(_) => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Err(e) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Config not loaded; using defaults"
        ),
    }
    config.validate()?;

    // Storage.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let db_path = data_dir.join(&config.storage.database_file);
    let db = Arc::new(Database::new(&db_path)?);
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    // Memory.
    let embedder = build_embedder(&config)?;
    let memory = build_memory(&config, embedder, &data_dir)?;

    // Language model.
    let llm = OpenAiCompatibleClient::new(secret(&config.llm.api_key_env), config.llm.timeout())?
        .with_base_url(&config.llm.base_url)
        .with_model(&config.llm.default_model)
        .with_temperature(config.llm.temperature);

    let services = Services {
        llm: Arc::new(llm),
        memory,
        history: Arc::new(SqliteHistoryStore::new(Arc::clone(&db))),
        checkpoints: Arc::new(SqliteCheckpointStore::new(db)),
        tickets: Arc::new(LocalTicketService::new()),
    };
    let orchestrator = SupportOrchestrator::new(services, &config);

    let turn_config = TurnConfig {
        model: args.model.clone(),
        max_generation_attempts: None,
    };
    let session = Session::new(
        &orchestrator,
        args.resolve_user(),
        args.resolve_thread(),
        turn_config,
    );
    tracing::info!(thread_id = session.thread_id(), "Session started");
    println!("MakTek support. Type 'quit' or 'exit' to leave.");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = session.run(stdin, tokio::io::stdout()) => {
            let turns = result?;
            tracing::info!(turns, "Session ended");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
        }
    }

    Ok(())
}
