pub mod engine;
pub mod handle;
pub mod reloader;
pub mod status;

pub use engine::{CommittedState, Outcome, ReloadEngine};
pub use handle::{EngineCommand, EngineHandle};
pub use reloader::{CommandReloader, ConfigReloader, NoopReloader, ReloadError};
pub use status::{ReloadState, ReloadStatus, ReloadStatusHandle};
