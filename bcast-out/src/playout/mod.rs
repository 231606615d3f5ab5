//! Output scheduling: lifecycle, frame pool, video and audio delivery

pub mod audio;
pub mod mode;
pub mod output;
pub mod pool;
pub mod priority;
pub mod scheduler;
pub mod serializer;
pub mod session;
pub mod stats;
pub mod video;

pub use mode::select_display_mode;
pub use output::Output;
pub use pool::FramePool;
pub use scheduler::{OutputScheduler, PREROLL_MINIMUM};
pub use serializer::{Operation, OperationHandler, OperationSerializer, StopHandle};
pub use session::Session;
pub use stats::{OutputStats, StatsSnapshot};
