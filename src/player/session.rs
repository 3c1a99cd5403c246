use super::traits::EngineBinding;
use crate::models::ContentIdentity;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Attaching,
    Ready,
    Playing,
    Paused,
    Ended,
    Advancing,
}

/// A media source to bind, and what it plays.
#[derive(Debug, Clone)]
pub struct SourceRequest {
    pub source: String,
    pub identity: ContentIdentity,
    pub autoplay: bool,
}

impl SourceRequest {
    pub fn new(source: impl Into<String>, identity: ContentIdentity) -> Self {
        Self {
            source: source.into(),
            identity,
            autoplay: false,
        }
    }

    pub fn with_autoplay(mut self, autoplay: bool) -> Self {
        self.autoplay = autoplay;
        self
    }
}

/// State for one attach cycle of one unit.
#[derive(Debug)]
pub struct PlaybackSession {
    pub identity: ContentIdentity,
    pub source: String,
    pub autoplay: bool,
    /// Restore has been attempted for this attach
    pub restored: bool,
    /// Restore load issued but not yet answered; saves would clobber the stored position
    pub awaiting_restore: bool,
    pub playing: bool,
    pub duration: Option<f64>,
    pub position: f64,
    token: CancellationToken,
    binding: Option<EngineBinding>,
}

impl PlaybackSession {
    pub fn new(request: SourceRequest, token: CancellationToken) -> Self {
        Self {
            identity: request.identity,
            source: request.source,
            autoplay: request.autoplay,
            restored: false,
            awaiting_restore: false,
            playing: false,
            duration: None,
            position: 0.0,
            token,
            binding: None,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn bind(&mut self, binding: EngineBinding) {
        self.binding = Some(binding);
    }

    pub fn take_binding(&mut self) -> Option<EngineBinding> {
        self.binding.take()
    }

    /// `(position, duration)` if both are usable for a save.
    pub fn progress(&self) -> Option<(f64, f64)> {
        let duration = self.duration?;
        (duration.is_finite() && duration > 0.0 && self.position.is_finite())
            .then_some((self.position, duration))
    }

    /// A save now reflects a real position: restore has settled and playback data exists.
    pub fn saveable_progress(&self) -> Option<(f64, f64)> {
        if self.awaiting_restore {
            return None;
        }
        self.progress()
    }
}
