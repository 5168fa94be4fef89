use std::path::PathBuf;

use thiserror::Error;

use crate::scene::VisualId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SceneError {
    #[error("visual {0:?} does not exist in the scene")]
    UnknownVisual(VisualId),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PresenceError {
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error("server sent a non-finite position ({x}, {y}) for session {session_id}")]
    NonFinitePosition { session_id: String, x: f32, y: f32 },
    #[error("no remote entity is registered for session {0}")]
    UnknownSession(String),
    #[error("a remote entity is already registered for session {0}")]
    DuplicateSession(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config json at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config value {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
