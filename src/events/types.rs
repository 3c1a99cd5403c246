use crate::models::{ContentIdentity, PlaybackUnit};
use crate::player::SessionState;
use crate::utils::PlayerError;
use serde::{Deserialize, Serialize};

/// What a transient on-screen message is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    Restore,
    PlayPause,
    Seek,
    Volume,
    Completion,
    Advancing,
    Error,
}

/// Transient display text. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    pub fn new(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn error(error: &PlayerError) -> Self {
        Self::new(NotificationKind::Error, error.to_string())
    }
}

/// Everything the session controller reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutput {
    StateChanged(SessionState),
    Notification(Notification),
    /// The current unit finished and `unit` is next; the owner should supply its source.
    AdvanceTo {
        identity: ContentIdentity,
        unit: PlaybackUnit,
    },
    PlaybackFailed(PlayerError),
}

impl SessionOutput {
    pub fn notification(&self) -> Option<&Notification> {
        match self {
            SessionOutput::Notification(notification) => Some(notification),
            _ => None,
        }
    }
}
