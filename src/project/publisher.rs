//! Debounced, atomic publishing of project snapshots.
//!
//! The Razor server reads a serialized project snapshot from the project's
//! configuration file. Project changes arrive in bursts (a build touches many
//! documents), so writes are coalesced per project: an enqueue starts a delay
//! window, later enqueues in that window replace the pending snapshot, and only
//! the latest one is written when the window closes.
//!
//! Writes go to a uniquely named temporary file next to the target, then the
//! existing file is deleted and the temporary one renamed over it, so the
//! server never reads a partially written snapshot.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use ulid::Ulid;

use super::file_exists_cache::FileExistsCache;
use super::store::ProjectConfigurationFilePathStore;

const LOG_TARGET: &str = "razor_bridge::project";

/// Serialized state of one project. The payload is opaque to the publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSnapshot {
    pub project_file_path: String,
    pub payload: Vec<u8>,
    /// Whether every document of the project has been processed. An
    /// unprocessed snapshot does not overwrite an existing configuration file.
    pub documents_processed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Written(PathBuf),
    /// No configuration file is associated with the project.
    NoConfigurationFile,
    /// The snapshot is incomplete and an earlier one is already on disk.
    SkippedUnprocessed,
}

pub struct ProjectSnapshotPublisher {
    store: Arc<ProjectConfigurationFilePathStore>,
    file_exists: Arc<FileExistsCache>,
    delay: Duration,
    /// Latest snapshot per project awaiting its delay window.
    pending: DashMap<String, ProjectSnapshot>,
}

impl ProjectSnapshotPublisher {
    pub fn new(
        store: Arc<ProjectConfigurationFilePathStore>,
        file_exists: Arc<FileExistsCache>,
        delay: Duration,
    ) -> Self {
        Self {
            store,
            file_exists,
            delay,
            pending: DashMap::new(),
        }
    }

    /// Number of projects with a snapshot waiting to be written.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Schedule `snapshot` for publishing after the delay window.
    ///
    /// Replaces a snapshot of the same project that has not been written yet.
    pub fn enqueue(self: &Arc<Self>, snapshot: ProjectSnapshot) {
        let project = snapshot.project_file_path.clone();
        if self.pending.insert(project.clone(), snapshot).is_some() {
            log::debug!(target: LOG_TARGET, "Superseded pending snapshot of {}", project);
            return;
        }

        let publisher = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(publisher.delay).await;
            let Some((_, snapshot)) = publisher.pending.remove(&project) else {
                return;
            };
            if let Err(e) = publisher.publish(&snapshot).await {
                log::error!(
                    target: LOG_TARGET,
                    "Failed to publish snapshot of {}: {}",
                    project,
                    e
                );
            }
        });
    }

    /// Write `snapshot` now, bypassing the delay window.
    pub async fn publish(&self, snapshot: &ProjectSnapshot) -> io::Result<PublishOutcome> {
        let Some(configuration_file_path) = self.store.try_get(&snapshot.project_file_path) else {
            log::debug!(
                target: LOG_TARGET,
                "No configuration file for {}, not publishing",
                snapshot.project_file_path
            );
            return Ok(PublishOutcome::NoConfigurationFile);
        };
        let path = PathBuf::from(configuration_file_path);

        // An existing file from an earlier session beats a half-built snapshot.
        if !snapshot.documents_processed && self.file_exists.exists(&path).await {
            log::debug!(
                target: LOG_TARGET,
                "Documents of {} not processed yet, keeping {}",
                snapshot.project_file_path,
                path.display()
            );
            return Ok(PublishOutcome::SkippedUnprocessed);
        }

        write_atomically(&path, &snapshot.payload).await?;
        self.file_exists.record(&path, true);
        log::debug!(
            target: LOG_TARGET,
            "Published snapshot of {} to {}",
            snapshot.project_file_path,
            path.display()
        );
        Ok(PublishOutcome::Written(path))
    }
}

/// Write to a temporary sibling, delete `path`, then rename.
async fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no file name"))?
        .to_string_lossy();
    let temp_path = path.with_file_name(format!("{}.{}.temp", file_name, Ulid::new()));

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&temp_path, contents).await?;

    let result = async {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        tokio::fs::rename(&temp_path, path).await
    }
    .await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(&temp_path).await;
    }
    result
}
