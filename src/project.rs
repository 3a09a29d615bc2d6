//! Project configuration tracking and snapshot publishing.
//!
//! - [`ProjectConfigurationFilePathStore`]: project file → configuration file
//!   associations, with change broadcast.
//! - [`ProjectConfigurationMonitor`]: tells the Razor server about those
//!   associations once it is ready.
//! - [`ProjectSnapshotPublisher`]: debounced, atomic writes of project
//!   snapshots to their configuration files.

pub mod file_exists_cache;
pub mod monitor;
pub mod publisher;
pub mod store;

pub use file_exists_cache::{Clock, FileExistsCache, SystemClock};
pub use monitor::ProjectConfigurationMonitor;
pub use publisher::{ProjectSnapshot, ProjectSnapshotPublisher, PublishOutcome};
pub use store::{ProjectConfigurationChange, ProjectConfigurationFilePathStore};
