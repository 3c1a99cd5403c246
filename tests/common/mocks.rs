use std::sync::{Arc, Mutex};
use watchpoint::player::{EngineBinding, EngineEvents, MediaSink, PlaybackEngine};
use watchpoint::utils::PlayerError;

#[derive(Debug, Default)]
pub struct EngineLog {
    pub attached: Vec<EngineBinding>,
    pub detached: Vec<u64>,
    pub events: Vec<EngineEvents>,
    pub fail_next_attach: Option<String>,
    next_id: u64,
}

/// Records attaches and keeps every event sender it was handed
#[derive(Debug, Default)]
pub struct MockEngine {
    log: Arc<Mutex<EngineLog>>,
}

impl MockEngine {
    pub fn log(&self) -> Arc<Mutex<EngineLog>> {
        self.log.clone()
    }
}

impl PlaybackEngine for MockEngine {
    fn attach(&mut self, source: &str, events: EngineEvents) -> Result<EngineBinding, PlayerError> {
        let mut log = self.log.lock().unwrap();
        if let Some(message) = log.fail_next_attach.take() {
            return Err(PlayerError::Attach {
                url: source.to_string(),
                message,
            });
        }

        log.next_id += 1;
        let id = log.next_id;
        log.events.push(events);
        log.attached.push(EngineBinding::new(id, source));
        Ok(EngineBinding::new(id, source))
    }

    fn detach(&mut self, binding: EngineBinding) {
        let mut log = self.log.lock().unwrap();
        log.attached.retain(|b| b.id != binding.id);
        log.detached.push(binding.id);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    ClearSource,
    Play,
    Pause,
    Seek(f64),
    Muted(bool),
    Volume(f64),
}

#[derive(Debug, Default)]
pub struct SinkLog {
    pub calls: Vec<SinkCall>,
    pub refuse_play: bool,
}

impl SinkLog {
    pub fn seeks(&self) -> Vec<f64> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                SinkCall::Seek(position) => Some(*position),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &SinkCall) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }
}

#[derive(Debug, Default)]
pub struct MockSink {
    log: Arc<Mutex<SinkLog>>,
}

impl MockSink {
    pub fn log(&self) -> Arc<Mutex<SinkLog>> {
        self.log.clone()
    }
}

impl MediaSink for MockSink {
    fn clear_source(&mut self) {
        self.log.lock().unwrap().calls.push(SinkCall::ClearSource);
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        let mut log = self.log.lock().unwrap();
        log.calls.push(SinkCall::Play);
        if log.refuse_play {
            return Err(PlayerError::Engine("play() was refused".to_string()));
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.log.lock().unwrap().calls.push(SinkCall::Pause);
    }

    fn seek(&mut self, seconds: f64) {
        self.log.lock().unwrap().calls.push(SinkCall::Seek(seconds));
    }

    fn set_muted(&mut self, muted: bool) {
        self.log.lock().unwrap().calls.push(SinkCall::Muted(muted));
    }

    fn set_volume(&mut self, volume: f64) {
        self.log.lock().unwrap().calls.push(SinkCall::Volume(volume));
    }
}
