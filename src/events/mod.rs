pub mod types;

pub use types::{Notification, NotificationKind, SessionOutput};
