//! `razor/semanticTokensRange`, `razor/semanticTokens` and
//! `razor/semanticTokensDelta`.
//!
//! Semantic tokens are only delegated to the C# server. A projection that is
//! out of sync is answered with `tokens: null` and the last version it reached,
//! which tells the Razor server to ask again later instead of coloring with
//! stale offsets.

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower_lsp_server::jsonrpc::{Error, Result};

use super::{LOG_TARGET, RazorMessageTarget, host_document_uri};
use crate::bridge::capabilities::{
    supports_semantic_tokens_delta, supports_semantic_tokens_full, supports_semantic_tokens_range,
};
use crate::document::VirtualDocumentKind;
use crate::protocol::{SemanticTokensRequest, SemanticTokensResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SemanticTokensMethod {
    Range,
    Full,
    Delta,
}

impl SemanticTokensMethod {
    fn downstream_method(self) -> &'static str {
        match self {
            SemanticTokensMethod::Range => "textDocument/semanticTokens/range",
            SemanticTokensMethod::Full => "textDocument/semanticTokens/full",
            SemanticTokensMethod::Delta => "textDocument/semanticTokens/full/delta",
        }
    }

    fn is_supported(self, capabilities: &Value) -> bool {
        match self {
            SemanticTokensMethod::Range => supports_semantic_tokens_range(capabilities),
            SemanticTokensMethod::Full => supports_semantic_tokens_full(capabilities),
            SemanticTokensMethod::Delta => supports_semantic_tokens_delta(capabilities),
        }
    }
}

impl RazorMessageTarget {
    pub(crate) async fn semantic_tokens_impl(
        &self,
        request: SemanticTokensRequest,
        method: SemanticTokensMethod,
        cancel: &CancellationToken,
    ) -> Result<SemanticTokensResponse> {
        match method {
            SemanticTokensMethod::Range if request.range.is_none() => {
                return Err(Error::invalid_params("range is required"));
            }
            SemanticTokensMethod::Delta if request.previous_result_id.is_none() => {
                return Err(Error::invalid_params("previousResultId is required"));
            }
            _ => {}
        }

        let Some(host_uri) = host_document_uri(&request.text_document.uri) else {
            return Ok(SemanticTokensResponse::out_of_sync(None));
        };

        let kind = VirtualDocumentKind::CSharp;
        let reject = self
            .settings
            .synchronization
            .reject_on_newer_parallel_request
            .semantic_tokens;
        let outcome = self
            .synchronize(
                &host_uri,
                kind,
                request.required_host_document_version,
                cancel,
                reject,
            )
            .await;
        let last_known_version = outcome.last_known_version();
        let Some(snapshot) = outcome.into_snapshot() else {
            return Ok(SemanticTokensResponse::out_of_sync(last_known_version));
        };
        let synced_version = i64::from(
            snapshot
                .host_document_version()
                .unwrap_or(request.required_host_document_version),
        );
        let empty = SemanticTokensResponse {
            result_id: None,
            tokens: None,
            edits: None,
            is_finalized: true,
            host_document_sync_version: synced_version,
        };

        let Some(server) = self.delegate_server(kind, |caps| method.is_supported(caps)) else {
            return Ok(empty);
        };
        let mut downstream = json!({ "textDocument": { "uri": snapshot.uri() } });
        match method {
            SemanticTokensMethod::Range => downstream["range"] = json!(request.range),
            SemanticTokensMethod::Delta => {
                downstream["previousResultId"] = json!(request.previous_result_id)
            }
            SemanticTokensMethod::Full => {}
        }

        let Some(result) = self
            .forward(server.as_ref(), method.downstream_method(), downstream, cancel)
            .await?
        else {
            return Ok(empty);
        };
        let tokens = match result.get("data") {
            Some(data) => match serde_json::from_value::<Vec<u32>>(data.clone()) {
                Ok(tokens) => Some(tokens),
                Err(e) => {
                    log::warn!(
                        target: LOG_TARGET,
                        "Malformed semantic tokens from {}: {}",
                        server.name(),
                        e
                    );
                    return Ok(empty);
                }
            },
            None => None,
        };

        Ok(SemanticTokensResponse {
            result_id: result
                .get("resultId")
                .and_then(Value::as_str)
                .map(str::to_string),
            tokens,
            edits: result.get("edits").cloned(),
            // Servers that compute tokens in stages mark partial results.
            is_finalized: result
                .get("isFinalized")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            host_document_sync_version: synced_version,
        })
    }
}
