// Install module: queue state, the scheduler and the platform installers

pub mod archive;
pub mod platform;
pub mod queue;
pub mod scheduler;

pub use archive::ArchiveInstaller;
pub use platform::{Installation, PlatformInstaller};
pub use queue::{ItemState, Queue, QueueItem};
pub use scheduler::{ExistingFileStrategy, InstallSteps, QueueObserver, Scheduler, SchedulerOptions};
