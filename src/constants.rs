// Playback progress tuning. Config defaults come from here.

/// Within this many seconds of the end, a unit counts as finished.
pub const DEFAULT_NEAR_END_SECONDS: u64 = 5;

/// Minimum gap between periodic progress writes.
pub const DEFAULT_SAVE_INTERVAL_SECONDS: u64 = 10;

/// Positions below this are not worth storing or restoring.
pub const DEFAULT_MIN_PROGRESS_SECONDS: u64 = 5;

/// A restored position must leave at least this much media to play.
pub const RESTORE_TAIL_GUARD_SECONDS: f64 = 3.0;
