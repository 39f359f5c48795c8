use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Missing required configuration: {}", display_paths(.paths))]
    ConfigMissing { paths: Vec<PathBuf> },

    #[error("Invalid schedule {expression:?}: {reason}")]
    ScheduleSyntaxInvalid { expression: String, reason: String },

    #[error("Failed to start {target}: {source}")]
    HandoffFailure {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Settings error: {0:#}")]
    Settings(#[from] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
