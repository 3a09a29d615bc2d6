//! Handler for the custom messages of the Razor language server.
//!
//! Buffer updates arrive as notifications and are applied inline, in arrival
//! order. Everything else is a request delegated to the C# or HTML server:
//! resolve the host document, wait until the projection has caught up with the
//! host version the Razor server computed against, re-address the request to
//! the virtual document, forward it, and return the answer.
//!
//! A request that cannot be answered safely (unknown document, projection out
//! of sync, downstream failure) gets an empty result rather than an RPC error,
//! so the Razor server can retry once the projection catches up.

mod code_action;
mod completion;
mod configuration;
mod delegation;
mod formatting;
mod map_spans;
mod semantic_tokens;
mod update_buffer;

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower_lsp_server::jsonrpc;
use url::Url;

use crate::bridge::{IncomingMessageHandler, LanguageServerPool};
use crate::config::{BridgeSettings, ClientSettingsManager};
use crate::document::{DocumentManager, DocumentSynchronizer, VirtualDocumentKind};
use crate::mapping::RazorSpanMappingService;
use crate::project::ProjectConfigurationMonitor;

use semantic_tokens::SemanticTokensMethod;

const LOG_TARGET: &str = "razor_bridge::delegation";

pub struct RazorMessageTarget {
    settings: BridgeSettings,
    client_settings: ClientSettingsManager,
    documents: Arc<DocumentManager>,
    synchronizer: Arc<DocumentSynchronizer>,
    pool: Arc<LanguageServerPool>,
    span_mapping: Arc<RazorSpanMappingService>,
    monitor: Arc<ProjectConfigurationMonitor>,
}

impl RazorMessageTarget {
    pub fn new(
        settings: BridgeSettings,
        client_settings: ClientSettingsManager,
        documents: Arc<DocumentManager>,
        synchronizer: Arc<DocumentSynchronizer>,
        pool: Arc<LanguageServerPool>,
        span_mapping: Arc<RazorSpanMappingService>,
        monitor: Arc<ProjectConfigurationMonitor>,
    ) -> Self {
        Self {
            settings,
            client_settings,
            documents,
            synchronizer,
            pool,
            span_mapping,
            monitor,
        }
    }

    /// Whether `razor/serverReady` has been received.
    pub fn is_server_ready(&self) -> bool {
        self.monitor.is_ready()
    }

    fn server_name(&self, kind: VirtualDocumentKind) -> &str {
        match kind {
            VirtualDocumentKind::CSharp => &self.settings.csharp_server_name,
            VirtualDocumentKind::Html => &self.settings.html_server_name,
        }
    }

    fn content_type(&self, kind: VirtualDocumentKind) -> &str {
        match kind {
            VirtualDocumentKind::CSharp => &self.settings.csharp_content_type,
            VirtualDocumentKind::Html => &self.settings.html_content_type,
        }
    }
}

#[async_trait]
impl IncomingMessageHandler for RazorMessageTarget {
    async fn handle_request(
        &self,
        method: &str,
        params: Value,
        cancel: CancellationToken,
    ) -> jsonrpc::Result<Value> {
        log::debug!(target: LOG_TARGET, "{} request", method);
        match method {
            "razor/rangeFormatting" => {
                to_value(self.range_formatting_impl(parse(params)?, &cancel).await?)
            }
            "razor/onTypeFormatting" => {
                to_value(self.on_type_formatting_impl(parse(params)?, &cancel).await?)
            }
            "razor/codeAction" => self.code_action_impl(parse(params)?, &cancel).await,
            "razor/resolveCodeAction" => {
                self.resolve_code_action_impl(parse(params)?, &cancel)
                    .await
            }
            "razor/semanticTokensRange" => to_value(
                self.semantic_tokens_impl(parse(params)?, SemanticTokensMethod::Range, &cancel)
                    .await?,
            ),
            "razor/semanticTokens" => to_value(
                self.semantic_tokens_impl(parse(params)?, SemanticTokensMethod::Full, &cancel)
                    .await?,
            ),
            "razor/semanticTokensDelta" => to_value(
                self.semantic_tokens_impl(parse(params)?, SemanticTokensMethod::Delta, &cancel)
                    .await?,
            ),
            "razor/completion" => self.completion_impl(parse(params)?, &cancel).await,
            "razor/mapSpans" => to_value(self.map_spans_impl(parse(params)?, &cancel).await?),
            "workspace/configuration" => self.configuration_impl(params),
            _ => Err(jsonrpc::Error::method_not_found()),
        }
    }

    async fn handle_notification(&self, method: &str, params: Value) {
        match method {
            "razor/updateCSharpBuffer" => {
                self.update_buffer_notification(VirtualDocumentKind::CSharp, params)
            }
            "razor/updateHtmlBuffer" => {
                self.update_buffer_notification(VirtualDocumentKind::Html, params)
            }
            "razor/serverReady" => self.monitor.server_ready(),
            _ => log::debug!(target: LOG_TARGET, "Ignoring notification {}", method),
        }
    }
}

fn parse<T: DeserializeOwned>(params: Value) -> jsonrpc::Result<T> {
    serde_json::from_value(params).map_err(|e| jsonrpc::Error::invalid_params(e.to_string()))
}

fn to_value<T: Serialize>(value: T) -> jsonrpc::Result<Value> {
    serde_json::to_value(value).map_err(|e| {
        log::error!(target: LOG_TARGET, "Failed to serialize response: {}", e);
        jsonrpc::Error::internal_error()
    })
}

/// Resolve a host document path as sent by the Razor server.
///
/// Accepts URIs (`file:///...`, `untitled:...`) and plain absolute paths.
pub(crate) fn host_document_uri(path: &str) -> Option<Url> {
    // A Windows drive letter parses as a one-letter scheme.
    if let Ok(uri) = Url::parse(path)
        && uri.scheme().len() > 1
    {
        return Some(uri);
    }
    Url::from_file_path(path).ok()
}

/// Map a failed downstream request: cancellation propagates, anything else is
/// logged and answered with `fallback`.
fn downstream_failure<T>(method: &str, server: &str, e: io::Error, fallback: T) -> jsonrpc::Result<T> {
    if e.kind() == io::ErrorKind::Interrupted {
        return Err(jsonrpc::Error::request_cancelled());
    }
    log::warn!(
        target: LOG_TARGET,
        "{} to {} failed: {}",
        method,
        server,
        e
    );
    Ok(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("file:///app/Pages/Index.razor", Some("file:///app/Pages/Index.razor"))]
    #[case("/app/Pages/Index.razor", Some("file:///app/Pages/Index.razor"))]
    #[case("untitled:Untitled-1", Some("untitled:Untitled-1"))]
    #[case("Pages/Index.razor", None)]
    fn host_document_uri_accepts_uris_and_absolute_paths(
        #[case] path: &str,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(
            host_document_uri(path).map(|uri| uri.to_string()).as_deref(),
            expected
        );
    }

    #[test]
    fn interrupted_downstream_request_is_reported_as_cancelled() {
        let error = io::Error::new(io::ErrorKind::Interrupted, "cancelled");
        let result = downstream_failure("textDocument/codeAction", "csharp", error, ());
        assert_eq!(result, Err(jsonrpc::Error::request_cancelled()));
    }

    #[test]
    fn other_downstream_failures_fall_back() {
        let error = io::Error::new(io::ErrorKind::BrokenPipe, "exited");
        let result = downstream_failure("textDocument/codeAction", "csharp", error, 7);
        assert_eq!(result, Ok(7));
    }
}
