//! Shared preamble for delegated requests.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower_lsp_server::jsonrpc::Result;
use url::Url;

use super::{LOG_TARGET, RazorMessageTarget, downstream_failure};
use crate::bridge::LanguageServerConnection;
use crate::document::{SyncOutcome, VirtualDocumentKind};

impl RazorMessageTarget {
    /// Wait until the `kind` projection of `host_uri` reflects `version`.
    ///
    /// Unknown documents fail fast without registering a waiter. A tracked
    /// document whose projection the Razor server has not produced yet gets
    /// the shorter creation timeout to see its first update.
    pub(super) async fn synchronize(
        &self,
        host_uri: &Url,
        kind: VirtualDocumentKind,
        version: i32,
        cancel: &CancellationToken,
        reject_on_newer_parallel_request: bool,
    ) -> SyncOutcome {
        let awaiting_creation = self
            .documents
            .try_get_document(host_uri)
            .is_some_and(|doc| doc.virtual_document(kind).is_none());
        if awaiting_creation {
            let created = self
                .synchronizer
                .wait_for_virtual_document(
                    host_uri,
                    kind,
                    self.settings.synchronization.creation_timeout(),
                    cancel,
                )
                .await;
            if !created.is_synchronized() {
                return self.log_sync_failure(host_uri, kind, version, created);
            }
        }
        let outcome = self
            .synchronizer
            .try_synchronize(
                host_uri,
                kind,
                version,
                cancel,
                reject_on_newer_parallel_request,
            )
            .await;
        self.log_sync_failure(host_uri, kind, version, outcome)
    }

    fn log_sync_failure(
        &self,
        host_uri: &Url,
        kind: VirtualDocumentKind,
        version: i32,
        outcome: SyncOutcome,
    ) -> SyncOutcome {
        if let Some(reason) = outcome.failure() {
            log::debug!(
                target: LOG_TARGET,
                "{} projection of {} not at version {} ({:?}, last known {:?})",
                kind,
                host_uri,
                version,
                reason,
                outcome.last_known_version()
            );
        }
        outcome
    }

    /// The single server delegated to for `kind`, if it is running and
    /// `supports` its capabilities.
    pub(super) fn delegate_server(
        &self,
        kind: VirtualDocumentKind,
        supports: impl Fn(&Value) -> bool,
    ) -> Option<Arc<dyn LanguageServerConnection>> {
        let name = self.server_name(kind);
        let Some(server) = self.pool.get(name) else {
            log::debug!(target: LOG_TARGET, "{} server {} not running", kind, name);
            return None;
        };
        if !supports(&server.capabilities()) {
            log::debug!(target: LOG_TARGET, "{} lacks the capability, skipping", name);
            return None;
        }
        Some(server)
    }

    /// Send `method` to `server`; `Ok(None)` for a null result or a
    /// non-cancellation failure.
    pub(super) async fn forward(
        &self,
        server: &dyn LanguageServerConnection,
        method: &str,
        params: Value,
        cancel: &CancellationToken,
    ) -> Result<Option<Value>> {
        match server.send_request(method, params, cancel).await {
            Ok(Value::Null) => Ok(None),
            Ok(result) => Ok(Some(result)),
            Err(e) => downstream_failure(method, server.name(), e, None),
        }
    }
}
