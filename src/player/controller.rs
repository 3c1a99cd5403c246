use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::progress_tracker::ProgressTracker;
use super::session::{PlaybackSession, SessionState, SourceRequest};
use super::traits::{EngineEvent, EngineEvents, MediaSink, PlaybackEngine};
use super::writer::ProgressWriter;
use crate::config::Config;
use crate::events::{Notification, NotificationKind, SessionOutput};
use crate::models::{PlaybackUnit, ThumbnailCue, WatchProgressRecord};
use crate::services::{EpisodeNavigator, ProgressSync, ThumbnailIndex, ThumbnailLoader};
use crate::utils::{PlayerError, format_offset, format_position};

/// Commands that can be sent to the session controller
#[derive(Debug)]
pub enum SessionInput {
    /// Bind a new media source, replacing the current one
    SetSource(SourceRequest),
    /// Units of the current title, in any order
    SetPlaylist(Vec<PlaybackUnit>),
    SetPlaylistMode(bool),
    /// WebVTT thumbnail track for hover previews
    SetThumbnailTrack(Option<String>),
    TogglePlayback,
    SeekBy(f64),
    SetMuted(bool),
    SetVolume(f64),
    VisibilityHidden,
    PageUnload,
    /// Tear down, drain pending writes, then stop the event loop
    Unmount { respond_to: oneshot::Sender<()> },
}

/// Everything the event loop consumes: caller input plus results of its own async work.
#[derive(Debug)]
pub(crate) enum Message {
    Input(SessionInput),
    Engine {
        token: CancellationToken,
        event: EngineEvent,
    },
    Restored {
        token: CancellationToken,
        record: Option<WatchProgressRecord>,
    },
    ThumbnailsLoaded {
        token: CancellationToken,
        url: String,
        index: ThumbnailIndex,
    },
}

#[derive(Debug)]
struct ThumbnailTrack {
    url: Option<String>,
    token: CancellationToken,
}

/// Controller that owns the engine binding and the session state, and processes inputs
pub struct SessionController {
    receiver: mpsc::UnboundedReceiver<Message>,
    sender: mpsc::WeakUnboundedSender<Message>,
    outputs: mpsc::UnboundedSender<SessionOutput>,
    state_tx: watch::Sender<SessionState>,
    preview_tx: watch::Sender<Arc<ThumbnailIndex>>,

    engine: Box<dyn PlaybackEngine>,
    sink: Box<dyn MediaSink>,
    sync: ProgressSync,
    writer: ProgressWriter,
    thumbnails: ThumbnailLoader,
    tracker: ProgressTracker,
    navigator: EpisodeNavigator,

    state: SessionState,
    session: Option<PlaybackSession>,
    track: ThumbnailTrack,
    default_autoplay: bool,
    playlist_mode: bool,
    /// Left by a playlist advance; consumed by the next metadata-ready
    force_autoplay: bool,
    volume: f64,
}

impl SessionController {
    /// Create a controller and its handle. Must be called within a tokio runtime.
    pub fn new(
        config: &Config,
        sync: ProgressSync,
        engine: Box<dyn PlaybackEngine>,
        sink: Box<dyn MediaSink>,
    ) -> (SessionHandle, SessionController) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (preview_tx, preview_rx) = watch::channel(Arc::new(ThumbnailIndex::default()));

        let controller = SessionController {
            receiver,
            sender: sender.downgrade(),
            outputs: output_tx,
            state_tx,
            preview_tx,
            engine,
            sink,
            writer: ProgressWriter::spawn(sync.clone()),
            sync,
            thumbnails: ThumbnailLoader::from_config(&config.thumbnails),
            tracker: ProgressTracker::new(&config.progress),
            navigator: EpisodeNavigator::default(),
            state: SessionState::Idle,
            session: None,
            track: ThumbnailTrack {
                url: None,
                token: CancellationToken::new(),
            },
            default_autoplay: config.playback.autoplay,
            playlist_mode: config.playback.playlist_mode,
            force_autoplay: false,
            volume: 1.0,
        };
        let handle = SessionHandle {
            sender,
            outputs: Arc::new(Mutex::new(Some(output_rx))),
            state: state_rx,
            previews: preview_rx,
            seek_step: config.playback.seek_step_seconds,
        };

        (handle, controller)
    }

    /// Run the controller event loop until unmount or until every handle is dropped
    pub async fn run(mut self) {
        debug!("SessionController event loop started");

        loop {
            let Some(message) = self.receiver.recv().await else {
                self.unmount().await;
                break;
            };

            match message {
                Message::Input(input) => {
                    if self.handle_input(input).await.is_break() {
                        break;
                    }
                }
                Message::Engine { token, event } => {
                    if token.is_cancelled() {
                        trace!("Dropping engine event from a released source: {:?}", event);
                    } else {
                        self.handle_engine_event(event);
                    }
                }
                Message::Restored { token, record } => self.apply_restore(&token, record),
                Message::ThumbnailsLoaded { token, url, index } => {
                    if token.is_cancelled() {
                        debug!("Discarding thumbnails for replaced track {}", url);
                    } else {
                        debug!("Loaded {} thumbnail cues from {}", index.len(), url);
                        self.preview_tx.send_replace(Arc::new(index));
                    }
                }
            }
        }

        debug!("SessionController event loop terminated");
    }

    async fn handle_input(&mut self, input: SessionInput) -> ControlFlow<()> {
        match input {
            SessionInput::SetSource(request) => self.set_source(request),
            SessionInput::SetPlaylist(units) => {
                trace!("Playlist set with {} units", units.len());
                self.navigator = EpisodeNavigator::new(units);
            }
            SessionInput::SetPlaylistMode(enabled) => self.playlist_mode = enabled,
            SessionInput::SetThumbnailTrack(url) => self.set_thumbnail_track(url),
            SessionInput::TogglePlayback => self.toggle_playback(),
            SessionInput::SeekBy(delta) => self.seek_by(delta),
            SessionInput::SetMuted(muted) => {
                self.sink.set_muted(muted);
                self.notify(
                    NotificationKind::Volume,
                    if muted { "Muted" } else { "Unmuted" },
                );
            }
            SessionInput::SetVolume(volume) => self.set_volume(volume),
            SessionInput::VisibilityHidden => self.flush("visibility hidden"),
            SessionInput::PageUnload => self.flush("page unload"),
            SessionInput::Unmount { respond_to } => {
                self.unmount().await;
                let _ = respond_to.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::MediaAttached => trace!("Engine attached media"),
            EngineEvent::MetadataReady { duration } => self.on_metadata_ready(duration),
            EngineEvent::TimeAdvanced { position } => self.on_time_advanced(position),
            EngineEvent::Playing => {
                if let Some(session) = self.session.as_mut() {
                    session.playing = true;
                    self.set_state(SessionState::Playing);
                }
            }
            EngineEvent::Paused => {
                if let Some(session) = self.session.as_mut() {
                    session.playing = false;
                    if matches!(self.state, SessionState::Ready | SessionState::Playing) {
                        self.set_state(SessionState::Paused);
                    }
                    self.flush("pause");
                }
            }
            EngineEvent::Ended => self.on_ended(),
            EngineEvent::FatalError(details) => self.report_failure(PlayerError::Engine(details)),
            EngineEvent::NonFatalError(details) => warn!("Recoverable playback error: {}", details),
        }
    }

    /// Release the current binding, then attach `request`.
    fn set_source(&mut self, request: SourceRequest) {
        self.release_session();

        if request.source.trim().is_empty() {
            debug!("Empty source for {}, staying idle", request.identity);
            self.set_state(SessionState::Idle);
            return;
        }

        info!("Attaching {} for {}", request.source, request.identity);
        let token = CancellationToken::new();
        let mut session = PlaybackSession::new(request, token.clone());
        session.autoplay |= self.default_autoplay;
        self.tracker.reset_save_timer();
        self.set_state(SessionState::Attaching);

        let events = EngineEvents::new(token, self.sender.clone());
        match self.engine.attach(&session.source, events) {
            Ok(binding) => session.bind(binding),
            Err(e) => self.report_failure(e),
        }
        self.session = Some(session);
    }

    /// Cancel pending work for the current source, free the engine and sink, and keep its
    /// progress.
    fn release_session(&mut self) {
        self.sink.clear_source();

        let Some(mut session) = self.session.take() else {
            return;
        };
        session.token().cancel();
        if let Some(binding) = session.take_binding() {
            trace!("Detaching engine binding {}", binding.id);
            self.engine.detach(binding);
        }
        if let Some((position, duration)) = session.saveable_progress() {
            self.writer.save(session.identity, position, duration);
        }
    }

    fn on_metadata_ready(&mut self, duration: f64) {
        if self.state == SessionState::Attaching {
            self.set_state(SessionState::Ready);
        }

        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.duration = Some(duration);

        if session.autoplay || self.force_autoplay {
            session.autoplay = false;
            self.force_autoplay = false;
            if let Err(e) = self.sink.play() {
                warn!("Autoplay was refused: {}", e);
            }
        }

        if session.restored {
            return;
        }
        session.restored = true;
        session.awaiting_restore = true;

        let Some(sender) = self.sender.upgrade() else {
            return;
        };
        let token = session.token().clone();
        let identity = session.identity.clone();
        let sync = self.sync.clone();
        tokio::spawn(async move {
            let record = sync.load(&identity).await;
            let _ = sender.send(Message::Restored { token, record });
        });
    }

    fn apply_restore(&mut self, token: &CancellationToken, record: Option<WatchProgressRecord>) {
        if token.is_cancelled() {
            debug!("Discarding restore for a replaced source");
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.awaiting_restore = false;

        let Some(record) = record else {
            debug!("No stored progress for {}", session.identity);
            return;
        };
        let duration = session
            .duration
            .or(record.duration_seconds.map(|d| d as f64))
            .unwrap_or_default();
        if !self.tracker.should_resume(&record, duration) {
            debug!(
                "Not resuming {} at {}s of {:.0}s",
                session.identity, record.position_seconds, duration
            );
            return;
        }

        let position = record.position_seconds as f64;
        info!("Resuming {} at {}s", session.identity, record.position_seconds);
        self.sink.seek(position);
        session.position = position;
        self.notify(
            NotificationKind::Restore,
            format!("Resumed from {}", format_position(position)),
        );
    }

    fn on_time_advanced(&mut self, position: f64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.position = position;

        if !self.tracker.should_save_progress() {
            return;
        }
        if let Some((position, duration)) = session.saveable_progress() {
            self.writer.save(session.identity.clone(), position, duration);
            self.tracker.mark_saved();
        }
    }

    /// Save now, ignoring the throttle window.
    fn flush(&mut self, reason: &str) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let Some((position, duration)) = session.saveable_progress() else {
            trace!("Nothing to flush on {}", reason);
            return;
        };
        debug!("Flushing progress for {} on {}", session.identity, reason);
        self.writer.save(session.identity.clone(), position, duration);
        self.tracker.mark_saved();
    }

    fn on_ended(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.playing = false;
        // Later flushes must read as finished, whatever the last tick said
        if let Some(duration) = session.duration {
            session.position = duration;
        }
        let identity = session.identity.clone();

        // Finished units drop out of continue-watching
        self.writer.delete(identity.clone());

        let next = if self.playlist_mode {
            identity
                .unit_id
                .as_ref()
                .and_then(|unit| self.navigator.next_after(unit))
                .cloned()
        } else {
            None
        };

        match next {
            Some(unit) => {
                info!("{} finished, advancing to {}", identity, unit.id);
                self.force_autoplay = true;
                self.set_state(SessionState::Advancing);
                self.emit(SessionOutput::AdvanceTo {
                    identity: identity.for_unit(unit.id.clone(), None),
                    unit: unit.clone(),
                });
                self.notify(
                    NotificationKind::Advancing,
                    format!("Up next: {}", unit.label()),
                );
            }
            None => {
                info!("{} finished", identity);
                self.set_state(SessionState::Ended);
                self.notify(NotificationKind::Completion, "Playback finished");
            }
        }
    }

    fn toggle_playback(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        if session.playing {
            self.sink.pause();
            self.notify(NotificationKind::PlayPause, "Paused");
        } else {
            match self.sink.play() {
                Ok(()) => self.notify(NotificationKind::PlayPause, "Playing"),
                Err(e) => self.report_failure(e),
            }
        }
    }

    fn seek_by(&mut self, delta: f64) {
        if !delta.is_finite() {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let mut target = (session.position + delta).max(0.0);
        if let Some(duration) = session.duration.filter(|d| d.is_finite() && *d > 0.0) {
            target = target.min(duration);
        }
        self.sink.seek(target);
        session.position = target;
        self.notify(NotificationKind::Seek, format_offset(delta));
    }

    fn set_volume(&mut self, volume: f64) {
        if !volume.is_finite() {
            return;
        }
        self.volume = volume.clamp(0.0, 1.0);
        self.sink.set_volume(self.volume);
        self.notify(
            NotificationKind::Volume,
            format!("Volume {}%", (self.volume * 100.0).round()),
        );
    }

    fn set_thumbnail_track(&mut self, url: Option<String>) {
        let url = url.filter(|u| !u.trim().is_empty());
        if url == self.track.url {
            return;
        }

        self.track.token.cancel();
        self.track = ThumbnailTrack {
            url: url.clone(),
            token: CancellationToken::new(),
        };
        self.preview_tx
            .send_replace(Arc::new(ThumbnailIndex::default()));

        let (Some(url), Some(sender)) = (url, self.sender.upgrade()) else {
            return;
        };
        let token = self.track.token.clone();
        let loader = self.thumbnails.clone();
        tokio::spawn(async move {
            let index = loader.load(&url).await;
            let _ = sender.send(Message::ThumbnailsLoaded { token, url, index });
        });
    }

    async fn unmount(&mut self) {
        info!("Unmounting playback session");
        self.release_session();
        self.track.token.cancel();
        self.writer.close().await;
        self.set_state(SessionState::Idle);
    }

    /// Playback failures are reported, never retried, and leave the state unchanged.
    fn report_failure(&self, error: PlayerError) {
        error!("Playback failed: {}", error);
        self.emit(SessionOutput::Notification(Notification::error(&error)));
        self.emit(SessionOutput::PlaybackFailed(error));
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        debug!("Session state {:?} -> {:?}", self.state, state);
        self.state = state;
        self.state_tx.send_replace(state);
        self.emit(SessionOutput::StateChanged(state));
    }

    fn notify(&self, kind: NotificationKind, message: impl Into<String>) {
        self.emit(SessionOutput::Notification(Notification::new(kind, message)));
    }

    fn emit(&self, output: SessionOutput) {
        let _ = self.outputs.send(output);
    }
}

/// Handle for communicating with the session controller
#[derive(Debug, Clone)]
pub struct SessionHandle {
    sender: mpsc::UnboundedSender<Message>,
    outputs: Arc<Mutex<Option<mpsc::UnboundedReceiver<SessionOutput>>>>,
    state: watch::Receiver<SessionState>,
    previews: watch::Receiver<Arc<ThumbnailIndex>>,
    seek_step: f64,
}

impl SessionHandle {
    /// Take the output receiver (can only be done once)
    pub fn take_output_receiver(&self) -> Option<mpsc::UnboundedReceiver<SessionOutput>> {
        self.outputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn send(&self, input: SessionInput) -> Result<(), PlayerError> {
        self.sender
            .send(Message::Input(input))
            .map_err(|_| PlayerError::Disconnected)
    }

    pub fn set_source(&self, request: SourceRequest) -> Result<(), PlayerError> {
        self.send(SessionInput::SetSource(request))
    }

    pub fn set_playlist(&self, units: Vec<PlaybackUnit>) -> Result<(), PlayerError> {
        self.send(SessionInput::SetPlaylist(units))
    }

    pub fn set_playlist_mode(&self, enabled: bool) -> Result<(), PlayerError> {
        self.send(SessionInput::SetPlaylistMode(enabled))
    }

    pub fn set_thumbnail_track(&self, url: Option<String>) -> Result<(), PlayerError> {
        self.send(SessionInput::SetThumbnailTrack(url))
    }

    pub fn toggle_playback(&self) -> Result<(), PlayerError> {
        self.send(SessionInput::TogglePlayback)
    }

    pub fn seek_by(&self, delta: f64) -> Result<(), PlayerError> {
        self.send(SessionInput::SeekBy(delta))
    }

    pub fn seek_forward(&self) -> Result<(), PlayerError> {
        self.seek_by(self.seek_step)
    }

    pub fn seek_backward(&self) -> Result<(), PlayerError> {
        self.seek_by(-self.seek_step)
    }

    pub fn set_muted(&self, muted: bool) -> Result<(), PlayerError> {
        self.send(SessionInput::SetMuted(muted))
    }

    pub fn set_volume(&self, volume: f64) -> Result<(), PlayerError> {
        self.send(SessionInput::SetVolume(volume))
    }

    pub fn visibility_hidden(&self) -> Result<(), PlayerError> {
        self.send(SessionInput::VisibilityHidden)
    }

    pub fn page_unload(&self) -> Result<(), PlayerError> {
        self.send(SessionInput::PageUnload)
    }

    /// Tear the session down and wait until pending progress writes have landed
    pub async fn unmount(&self) -> Result<(), PlayerError> {
        let (respond_to, response) = oneshot::channel();
        self.send(SessionInput::Unmount { respond_to })?;
        response.await.map_err(|_| PlayerError::Disconnected)
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Preview frame for a hover at `seconds`, from the current thumbnail track
    pub fn preview_at(&self, seconds: f64) -> Option<ThumbnailCue> {
        self.previews.borrow().lookup(seconds).cloned()
    }

    pub fn watch_previews(&self) -> watch::Receiver<Arc<ThumbnailIndex>> {
        self.previews.clone()
    }
}
