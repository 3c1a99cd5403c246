//! Watch-progress synchronization and playback session control for a video player widget.

pub mod config;
pub mod constants;
pub mod db;
pub mod events;
pub mod models;
pub mod player;
pub mod services;
pub mod store;
pub mod utils;

pub use config::Config;
pub use player::{SessionController, SessionHandle};
pub use services::ProgressSync;
