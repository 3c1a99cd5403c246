use thiserror::Error;

/// Playback failures. Always surfaced to the caller, never retried here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlayerError {
    #[error("Failed to attach {url}: {message}")]
    Attach { url: String, message: String },

    #[error("Playback engine error: {0}")]
    Engine(String),

    #[error("Session controller disconnected")]
    Disconnected,
}
