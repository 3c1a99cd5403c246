use super::controller::Message;
use crate::utils::PlayerError;
use tokio::sync::mpsc::WeakUnboundedSender;
use tokio_util::sync::CancellationToken;

/// Signals from the playback engine about the attached media.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    MediaAttached,
    MetadataReady { duration: f64 },
    TimeAdvanced { position: f64 },
    Playing,
    Paused,
    Ended,
    FatalError(String),
    NonFatalError(String),
}

/// Event sender handed to the engine for one attach cycle.
///
/// Once the cycle ends (source change or unmount) every emit is dropped, so an engine that
/// keeps a stale sender cannot reach the controller.
#[derive(Debug, Clone)]
pub struct EngineEvents {
    token: CancellationToken,
    sender: WeakUnboundedSender<Message>,
}

impl EngineEvents {
    pub(crate) fn new(token: CancellationToken, sender: WeakUnboundedSender<Message>) -> Self {
        Self { token, sender }
    }

    /// Returns false once the cycle has ended or the controller is gone.
    pub fn emit(&self, event: EngineEvent) -> bool {
        if self.token.is_cancelled() {
            return false;
        }
        let Some(sender) = self.sender.upgrade() else {
            return false;
        };
        sender
            .send(Message::Engine {
                token: self.token.clone(),
                event,
            })
            .is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Opaque handle for an attached source, returned to the engine on detach.
#[derive(Debug, PartialEq, Eq)]
pub struct EngineBinding {
    pub id: u64,
    pub source: String,
}

impl EngineBinding {
    pub fn new(id: u64, source: impl Into<String>) -> Self {
        Self {
            id,
            source: source.into(),
        }
    }
}

/// Streaming engine (adaptive bitrate or native playback) driving the media sink.
pub trait PlaybackEngine: Send {
    fn attach(&mut self, source: &str, events: EngineEvents) -> Result<EngineBinding, PlayerError>;
    fn detach(&mut self, binding: EngineBinding);
}

/// The element that renders media.
pub trait MediaSink: Send {
    fn clear_source(&mut self);
    fn play(&mut self) -> Result<(), PlayerError>;
    fn pause(&mut self);
    fn seek(&mut self, seconds: f64);
    fn set_muted(&mut self, muted: bool);
    fn set_volume(&mut self, volume: f64);
}
