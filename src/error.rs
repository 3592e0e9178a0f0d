use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("No agents available")]
    NoAgents,

    #[error("No agents found matching {requested:?}. Available agents: {available}")]
    NoMatchingAgents {
        requested: Vec<String>,
        available: String,
    },

    #[error("No evaluation results available")]
    NoResults,

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Agent {agent} failed: {message}")]
    AgentFailed { agent: String, message: String },

    #[error("Could not parse a score from: {0}")]
    ScoreParse(String),

    #[error("Backup '{0}' not found")]
    BackupNotFound(String),

    #[error("Backup manifest not found for '{0}'")]
    ManifestMissing(String),

    #[error("Path escapes the working directory: {0}")]
    PathOutsideRoot(PathBuf),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Short failure reason recorded on failed responses.
    pub fn reason(&self) -> String {
        match self {
            Error::Timeout(_) => "timeout".to_string(),
            Error::AgentFailed { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
