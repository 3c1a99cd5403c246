pub mod watch_progress;

pub use watch_progress::{
    ActiveModel as WatchProgressActiveModel, Column as WatchProgressColumn,
    Entity as WatchProgress, Model as WatchProgressModel,
};
