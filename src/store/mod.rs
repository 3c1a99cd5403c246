mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod rest;
pub mod sqlite;
mod traits;

pub use error::StoreError;
#[cfg(any(test, feature = "test-utils"))]
pub use memory::{MemoryStore, OpKind, StoreOp};
pub use rest::RestStore;
pub use sqlite::SqliteStore;
pub use traits::{Filter, OrderBy, RemoteStore, Row};

/// Column names of the watch-progress table.
pub mod columns {
    pub const USER_ID: &str = "user_id";
    pub const CONTENT_ID: &str = "content_id";
    pub const UNIT_ID: &str = "unit_id";
    pub const POSITION_SECONDS: &str = "position_seconds";
    pub const DURATION_SECONDS: &str = "duration_seconds";
    pub const UPDATED_AT: &str = "updated_at";
}

pub const DEFAULT_TABLE: &str = "watch_progress";
