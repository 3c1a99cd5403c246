pub mod errors;
pub mod format;

pub use errors::PlayerError;
pub use format::{format_duration, format_offset, format_position};
