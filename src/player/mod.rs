pub mod controller;
pub mod progress_tracker;
pub mod session;
pub mod traits;
pub mod writer;

pub use controller::{SessionController, SessionHandle, SessionInput};
pub use progress_tracker::ProgressTracker;
pub use session::{PlaybackSession, SessionState, SourceRequest};
pub use traits::{EngineBinding, EngineEvent, EngineEvents, MediaSink, PlaybackEngine};
pub use writer::ProgressWriter;
