use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the sync and launch engine.
/// Every module returns `Result<T, ServerError>`.
#[derive(Debug, Error)]
pub enum ServerError {
    // ── Configuration ───────────────────────────────────
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Transport ───────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Transport error for {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("Changelog for workshop item {id} has no title")]
    MissingDisplayName { id: String },

    // ── External tool ───────────────────────────────────
    #[error("SteamCMD failed for [{}]: {reason}", ids.join(", "))]
    FetchTool { ids: Vec<String>, reason: String },

    // ── Filesystem conflicts ────────────────────────────
    #[error("Filesystem conflict at {path:?}: {reason}")]
    Conflict { path: PathBuf, reason: String },

    // ── Process spawning ────────────────────────────────
    #[error("Failed to spawn {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    /// Wraps an IO error together with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ServerError::Io {
            path: path.into(),
            source,
        }
    }

    /// Transport-class failures are isolated per mod id and never abort a run.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ServerError::Http(_)
                | ServerError::DownloadFailed { .. }
                | ServerError::Transport { .. }
        )
    }
}

impl From<std::io::Error> for ServerError {
    fn from(source: std::io::Error) -> Self {
        ServerError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}
