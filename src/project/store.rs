//! Project file → configuration file associations.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;

const LOG_TARGET: &str = "razor_bridge::project";

/// Capacity of the change channel. A lagging subscriber loses the oldest
/// changes and is told how many it missed.
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// A new, changed or removed association. `configuration_file_path` is `None`
/// on removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfigurationChange {
    pub project_file_path: String,
    pub configuration_file_path: Option<String>,
}

/// At most one configuration file per project.
///
/// Updates are idempotent: setting the current value again, or removing an
/// unknown project, broadcasts nothing.
pub struct ProjectConfigurationFilePathStore {
    mappings: Mutex<HashMap<String, String>>,
    changes: broadcast::Sender<ProjectConfigurationChange>,
}

impl Default for ProjectConfigurationFilePathStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectConfigurationFilePathStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            mappings: Mutex::new(HashMap::new()),
            changes,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProjectConfigurationChange> {
        self.changes.subscribe()
    }

    /// Returns whether the association changed.
    pub fn set(&self, project_file_path: &str, configuration_file_path: &str) -> bool {
        let mut mappings = self.lock();
        if mappings.get(project_file_path).map(String::as_str) == Some(configuration_file_path) {
            return false;
        }
        mappings.insert(
            project_file_path.to_string(),
            configuration_file_path.to_string(),
        );
        log::debug!(
            target: LOG_TARGET,
            "{} now configured by {}",
            project_file_path,
            configuration_file_path
        );
        // Sent under the lock so subscribers observe changes in store order.
        let _ = self.changes.send(ProjectConfigurationChange {
            project_file_path: project_file_path.to_string(),
            configuration_file_path: Some(configuration_file_path.to_string()),
        });
        true
    }

    /// Returns whether an association was removed.
    pub fn remove(&self, project_file_path: &str) -> bool {
        let mut mappings = self.lock();
        if mappings.remove(project_file_path).is_none() {
            return false;
        }
        log::debug!(target: LOG_TARGET, "{} unloaded", project_file_path);
        let _ = self.changes.send(ProjectConfigurationChange {
            project_file_path: project_file_path.to_string(),
            configuration_file_path: None,
        });
        true
    }

    pub fn try_get(&self, project_file_path: &str) -> Option<String> {
        self.lock().get(project_file_path).cloned()
    }

    /// Every association, sorted by project path.
    pub fn mappings(&self) -> Vec<(String, String)> {
        let mut mappings: Vec<_> = self
            .lock()
            .iter()
            .map(|(project, config)| (project.clone(), config.clone()))
            .collect();
        mappings.sort();
        mappings
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        match self.mappings.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
