//! Wiring of every bridge component.

use std::io;
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use url::Url;

use super::message_target::RazorMessageTarget;
use crate::bridge::{
    DownstreamMessageHandler, IncomingMessageHandler, LanguageServerConnection,
    LanguageServerPool, StdioConnection, VirtualDocumentPublisher,
};
use crate::config::{BridgeSettings, ClientSettingsManager, ServerConfig};
use crate::document::{DocumentChangeListener, DocumentManager, DocumentSynchronizer};
use crate::mapping::{
    ClassificationSource, DocumentExcerptService, RazorServerMappingProvider,
    RazorSpanMappingService, SemanticTokensClassifier,
};
use crate::project::{
    FileExistsCache, ProjectConfigurationFilePathStore, ProjectConfigurationMonitor,
    ProjectSnapshotPublisher, SystemClock,
};

const LOG_TARGET: &str = "razor_bridge::bridge";

/// Owns the document model, the downstream pool and the project pipeline, and
/// connects them.
///
/// Construction wires listeners only; [`start`](Self::start) spawns the
/// configured language servers and background tasks and must run inside a
/// tokio runtime.
pub struct RazorBridge {
    settings: BridgeSettings,
    client_settings: ClientSettingsManager,
    documents: Arc<DocumentManager>,
    synchronizer: Arc<DocumentSynchronizer>,
    pool: Arc<LanguageServerPool>,
    /// Held so the manager's weak listener reference stays alive.
    virtual_publisher: Arc<VirtualDocumentPublisher>,
    project_store: Arc<ProjectConfigurationFilePathStore>,
    monitor: Arc<ProjectConfigurationMonitor>,
    snapshot_publisher: Arc<ProjectSnapshotPublisher>,
    span_mapping: Arc<RazorSpanMappingService>,
    excerpts: DocumentExcerptService,
    message_target: Arc<RazorMessageTarget>,
    /// Servers this bridge launched, for shutdown.
    launched: Mutex<Vec<Arc<StdioConnection>>>,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
}

impl RazorBridge {
    pub fn new(settings: BridgeSettings) -> Self {
        let client_settings = ClientSettingsManager::new(settings.editor.clone());
        let documents = Arc::new(DocumentManager::new());
        let pool = Arc::new(LanguageServerPool::new());

        let virtual_publisher = Arc::new(VirtualDocumentPublisher::new(pool.clone(), &settings));
        let listener: Arc<dyn DocumentChangeListener> = virtual_publisher.clone();
        documents.subscribe(&listener);
        // Final listener: waiters resume only after didOpen/didChange went out.
        let synchronizer =
            DocumentSynchronizer::attach(documents.clone(), settings.synchronization.timeout());

        let project_store = Arc::new(ProjectConfigurationFilePathStore::new());
        let monitor = Arc::new(ProjectConfigurationMonitor::new(
            project_store.clone(),
            pool.clone(),
            settings.razor_server_name.clone(),
        ));
        let file_exists = Arc::new(FileExistsCache::new(
            Arc::new(SystemClock),
            settings.publisher.file_exists_cache_ttl(),
        ));
        let snapshot_publisher = Arc::new(ProjectSnapshotPublisher::new(
            project_store.clone(),
            file_exists,
            settings.publisher.delay(),
        ));

        let span_mapping = Arc::new(RazorSpanMappingService::new(
            documents.clone(),
            Arc::new(RazorServerMappingProvider::new(
                pool.clone(),
                settings.razor_server_name.clone(),
            )),
        ));
        let classifier: Arc<dyn ClassificationSource> = Arc::new(SemanticTokensClassifier::new(
            pool.clone(),
            settings.csharp_server_name.clone(),
        ));
        let excerpts =
            DocumentExcerptService::new(documents.clone(), span_mapping.clone(), classifier);

        let message_target = Arc::new(RazorMessageTarget::new(
            settings.clone(),
            client_settings.clone(),
            documents.clone(),
            synchronizer.clone(),
            pool.clone(),
            span_mapping.clone(),
            monitor.clone(),
        ));

        Self {
            settings,
            client_settings,
            documents,
            synchronizer,
            pool,
            virtual_publisher,
            project_store,
            monitor,
            snapshot_publisher,
            span_mapping,
            excerpts,
            message_target,
            launched: Mutex::new(Vec::new()),
            monitor_task: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn client_settings(&self) -> &ClientSettingsManager {
        &self.client_settings
    }

    pub fn documents(&self) -> &Arc<DocumentManager> {
        &self.documents
    }

    pub fn synchronizer(&self) -> &Arc<DocumentSynchronizer> {
        &self.synchronizer
    }

    pub fn pool(&self) -> &Arc<LanguageServerPool> {
        &self.pool
    }

    pub fn virtual_document_publisher(&self) -> &Arc<VirtualDocumentPublisher> {
        &self.virtual_publisher
    }

    pub fn project_store(&self) -> &Arc<ProjectConfigurationFilePathStore> {
        &self.project_store
    }

    pub fn project_monitor(&self) -> &Arc<ProjectConfigurationMonitor> {
        &self.monitor
    }

    pub fn snapshot_publisher(&self) -> &Arc<ProjectSnapshotPublisher> {
        &self.snapshot_publisher
    }

    pub fn span_mapping(&self) -> &Arc<RazorSpanMappingService> {
        &self.span_mapping
    }

    pub fn excerpts(&self) -> &DocumentExcerptService {
        &self.excerpts
    }

    /// Handler for messages from the Razor server.
    pub fn message_target(&self) -> Arc<RazorMessageTarget> {
        self.message_target.clone()
    }

    /// Add an already connected server to the pool.
    pub fn register_server(&self, server: Arc<dyn LanguageServerConnection>) {
        self.pool.register(server);
    }

    /// Start the project monitor and launch every configured server.
    ///
    /// Downstream servers are launched before the Razor server so that its
    /// first requests find them. A server that fails to start is logged and
    /// skipped; requests for its language are then answered empty.
    pub async fn start(&self, root_uri: Option<&Url>) -> io::Result<()> {
        {
            let mut task = match self.monitor_task.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if task.is_none() {
                *task = Some(self.monitor.start());
            }
        }

        let downstream: Arc<dyn IncomingMessageHandler> = Arc::new(DownstreamMessageHandler);
        for (name, config) in &self.settings.language_servers {
            if let Err(e) = self
                .launch(name, config, downstream.clone(), root_uri)
                .await
            {
                log::error!(target: LOG_TARGET, "Failed to start {}: {}", name, e);
            }
        }

        if let Some(config) = &self.settings.razor_server {
            let handler: Arc<dyn IncomingMessageHandler> = self.message_target.clone();
            self.launch(&self.settings.razor_server_name, config, handler, root_uri)
                .await?;
        }
        Ok(())
    }

    async fn launch(
        &self,
        name: &str,
        config: &ServerConfig,
        handler: Arc<dyn IncomingMessageHandler>,
        root_uri: Option<&Url>,
    ) -> io::Result<()> {
        let connection = StdioConnection::spawn(name, config, handler)?;
        connection
            .initialize(initialize_params(config, root_uri))
            .await?;
        self.pool.register(connection.clone());
        match self.launched.lock() {
            Ok(mut launched) => launched.push(connection),
            Err(poisoned) => poisoned.into_inner().push(connection),
        }
        Ok(())
    }

    /// Shut down every launched server and stop background tasks.
    pub async fn shutdown(&self) {
        let launched = match self.launched.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for connection in &launched {
            self.pool.remove(connection.name());
        }
        let results = join_all(launched.iter().map(|connection| connection.shutdown())).await;
        for (connection, result) in launched.iter().zip(results) {
            if let Err(e) = result {
                log::warn!(
                    target: LOG_TARGET,
                    "Shutting down {} failed: {}",
                    connection.name(),
                    e
                );
            }
        }
        let task = match self.monitor_task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            task.abort();
        }
    }
}

fn initialize_params(config: &ServerConfig, root_uri: Option<&Url>) -> Value {
    json!({
        "processId": std::process::id(),
        "rootUri": root_uri,
        "capabilities": {
            "textDocument": {
                "synchronization": { "dynamicRegistration": false },
                "codeAction": { "resolveSupport": { "properties": ["edit"] } },
                "semanticTokens": {
                    "requests": { "range": true, "full": { "delta": true } },
                    "tokenTypes": [],
                    "tokenModifiers": [],
                    "formats": ["relative"]
                }
            },
            "workspace": { "configuration": true }
        },
        "initializationOptions": config.initialization_options,
    })
}
