//! CLI argument definitions for the helpdesk console.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// MakTek support assistant: an interactive console session.
#[derive(Parser, Debug)]
#[command(name = "helpdesk", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Data directory for the SQLite database and memory snapshot.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// User identifier; scopes history and recall.
    #[arg(short = 'u', long = "user")]
    pub user: Option<String>,

    /// Thread to resume. A new thread is started when omitted.
    #[arg(short = 't', long = "thread")]
    pub thread: Option<String>,

    /// Model override for every turn in this session.
    #[arg(short = 'm', long = "model")]
    pub model: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > HELPDESK_CONFIG env var > ~/.helpdesk/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("HELPDESK_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Returns `None` if not overridden (use config value).
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    pub fn resolve_log_level(&self) -> Option<String> {
        self.log_level.clone()
    }

    /// Priority: --user flag > HELPDESK_USER env var > "guest".
    pub fn resolve_user(&self) -> String {
        if let Some(ref u) = self.user {
            return u.clone();
        }
        std::env::var("HELPDESK_USER").unwrap_or_else(|_| "guest".to_string())
    }

    pub fn resolve_thread(&self) -> String {
        self.thread
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".helpdesk").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".helpdesk").join("config.toml");
    }
    PathBuf::from("config.toml")
}
