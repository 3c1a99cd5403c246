pub mod playlist_navigator;
pub mod progress_sync;
pub mod thumbnails;

pub use playlist_navigator::EpisodeNavigator;
pub use progress_sync::{ColumnCapability, ProgressSync, SaveOutcome, SkipReason, SyncError};
pub use thumbnails::{ThumbnailIndex, ThumbnailLoader};
