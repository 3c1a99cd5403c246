mod identifiers;
mod identity;
mod playlist;
mod progress;
mod thumbnail;

pub use identifiers::{ContentId, MAX_KEY_LEN, SeasonId, UnitId, UserId};
pub use identity::ContentIdentity;
pub use playlist::PlaybackUnit;
pub use progress::WatchProgressRecord;
pub use thumbnail::{Region, ThumbnailCue};
