use crate::config::ProgressConfig;
use crate::constants::RESTORE_TAIL_GUARD_SECONDS;
use crate::models::WatchProgressRecord;
use std::time::Duration;
use tokio::time::Instant;

/// Playback progress throttling and restore policy.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    /// Last time a periodic save was issued
    last_progress_save: Option<Instant>,
    save_interval: Duration,
    near_end_seconds: u64,
    min_progress_seconds: u64,
}

impl ProgressTracker {
    pub fn new(config: &ProgressConfig) -> Self {
        Self {
            last_progress_save: None,
            save_interval: config.save_interval(),
            near_end_seconds: config.near_end_seconds,
            min_progress_seconds: config.min_progress_seconds,
        }
    }

    /// Whether the periodic save window has elapsed
    pub fn should_save_progress(&self) -> bool {
        self.last_progress_save
            .is_none_or(|last| last.elapsed() >= self.save_interval)
    }

    pub fn mark_saved(&mut self) {
        self.last_progress_save = Some(Instant::now());
    }

    /// Start a fresh window, e.g. when new media is attached
    pub fn reset_save_timer(&mut self) {
        self.last_progress_save = Some(Instant::now());
    }

    /// Check if a stored record is worth seeking to.
    ///
    /// Positions near the start, inside the near-end window, or within the tail guard are
    /// treated as "start from zero".
    pub fn should_resume(&self, record: &WatchProgressRecord, duration: f64) -> bool {
        let position = record.position_seconds as f64;

        if !duration.is_finite() || duration <= 0.0 {
            return false;
        }
        if record.position_seconds < self.min_progress_seconds as i64 {
            return false;
        }
        if duration - position <= self.near_end_seconds as f64 {
            return false;
        }

        position < duration - RESTORE_TAIL_GUARD_SECONDS
    }

    pub fn save_interval(&self) -> Duration {
        self.save_interval
    }
}
