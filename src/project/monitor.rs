//! Forwards project configuration associations to the Razor server.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::store::{ProjectConfigurationChange, ProjectConfigurationFilePathStore};
use crate::bridge::LanguageServerPool;
use crate::protocol::MonitorProjectConfigurationFilePathParams;

const LOG_TARGET: &str = "razor_bridge::project";

const MONITOR_METHOD: &str = "razor/monitorProjectConfigurationFilePath";

/// Sends `razor/monitorProjectConfigurationFilePath` for every store change.
///
/// Nothing is sent before the Razor server reports `razor/serverReady`;
/// [`server_ready`](Self::server_ready) then replays every known association,
/// which covers changes made while the server was starting.
pub struct ProjectConfigurationMonitor {
    store: Arc<ProjectConfigurationFilePathStore>,
    pool: Arc<LanguageServerPool>,
    razor_server_name: String,
    ready: watch::Sender<bool>,
}

impl ProjectConfigurationMonitor {
    pub fn new(
        store: Arc<ProjectConfigurationFilePathStore>,
        pool: Arc<LanguageServerPool>,
        razor_server_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            pool,
            razor_server_name: razor_server_name.into(),
            ready: watch::Sender::new(false),
        }
    }

    pub fn store(&self) -> &Arc<ProjectConfigurationFilePathStore> {
        &self.store
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Resolves once the Razor server is ready.
    pub async fn wait_until_ready(&self) {
        let mut ready = self.ready.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = ready.wait_for(|ready| *ready).await;
    }

    /// Release the ready gate and replay all associations.
    ///
    /// Only the first call replays; the server reports readiness once.
    pub fn server_ready(&self) {
        if self.ready.send_replace(true) {
            log::debug!(target: LOG_TARGET, "Duplicate server ready notification");
            return;
        }
        let mappings = self.store.mappings();
        log::debug!(
            target: LOG_TARGET,
            "Razor server ready, replaying {} project configuration(s)",
            mappings.len()
        );
        for (project, configuration) in mappings {
            self.forward(&ProjectConfigurationChange {
                project_file_path: project,
                configuration_file_path: Some(configuration),
            });
        }
    }

    /// Start forwarding store changes; the task ends when the store is dropped.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let mut changes = self.store.subscribe();
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        if monitor.is_ready() {
                            monitor.forward(&change);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        log::warn!(
                            target: LOG_TARGET,
                            "Missed {} project configuration change(s), replaying",
                            missed
                        );
                        if monitor.is_ready() {
                            for (project, configuration) in monitor.store.mappings() {
                                monitor.forward(&ProjectConfigurationChange {
                                    project_file_path: project,
                                    configuration_file_path: Some(configuration),
                                });
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn forward(&self, change: &ProjectConfigurationChange) {
        let Some(razor) = self.pool.get(&self.razor_server_name) else {
            log::warn!(
                target: LOG_TARGET,
                "Cannot monitor {}: Razor server {} not running",
                change.project_file_path,
                self.razor_server_name
            );
            return;
        };
        let params = MonitorProjectConfigurationFilePathParams {
            project_file_path: change.project_file_path.clone(),
            configuration_file_path: change.configuration_file_path.clone(),
        };
        let result = serde_json::to_value(params)
            .map_err(std::io::Error::from)
            .and_then(|params| razor.send_notification(MONITOR_METHOD, params));
        if let Err(e) = result {
            log::error!(
                target: LOG_TARGET,
                "Failed to monitor {}: {}",
                change.project_file_path,
                e
            );
        }
    }
}
