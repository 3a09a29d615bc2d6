//! `razor/rangeFormatting` and `razor/onTypeFormatting`.

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower_lsp_server::jsonrpc::Result;
use tower_lsp_server::ls_types::TextEdit;

use super::{LOG_TARGET, RazorMessageTarget, host_document_uri};
use crate::bridge::capabilities::{supports_on_type_formatting, supports_range_formatting};
use crate::document::VirtualDocumentKind;
use crate::protocol::{FormattingResponse, OnTypeFormattingParams, RangeFormattingParams};

impl RazorMessageTarget {
    pub(crate) async fn range_formatting_impl(
        &self,
        params: RangeFormattingParams,
        cancel: &CancellationToken,
    ) -> Result<FormattingResponse> {
        // Razor constructs are formatted by the Razor server itself.
        let Some(kind) = params.kind.virtual_kind() else {
            return Ok(FormattingResponse::default());
        };
        let request = |uri: &url::Url| {
            json!({
                "textDocument": { "uri": uri },
                "range": params.projected_range,
                "options": params.options,
            })
        };
        self.format(
            kind,
            &params.host_document_file_path,
            params.host_document_version,
            "textDocument/rangeFormatting",
            supports_range_formatting,
            request,
            cancel,
        )
        .await
    }

    pub(crate) async fn on_type_formatting_impl(
        &self,
        params: OnTypeFormattingParams,
        cancel: &CancellationToken,
    ) -> Result<FormattingResponse> {
        let Some(kind) = params.kind.virtual_kind() else {
            return Ok(FormattingResponse::default());
        };
        let request = |uri: &url::Url| {
            json!({
                "textDocument": { "uri": uri },
                "position": params.projected_position,
                "ch": params.trigger_character,
                "options": params.options,
            })
        };
        self.format(
            kind,
            &params.host_document_file_path,
            params.host_document_version,
            "textDocument/onTypeFormatting",
            supports_on_type_formatting,
            request,
            cancel,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn format(
        &self,
        kind: VirtualDocumentKind,
        host_document_file_path: &str,
        host_document_version: i32,
        method: &str,
        supports: fn(&Value) -> bool,
        request: impl Fn(&url::Url) -> Value,
        cancel: &CancellationToken,
    ) -> Result<FormattingResponse> {
        let Some(host_uri) = host_document_uri(host_document_file_path) else {
            return Ok(FormattingResponse::default());
        };
        let reject = self
            .settings
            .synchronization
            .reject_on_newer_parallel_request
            .formatting;
        let Some(snapshot) = self
            .synchronize(&host_uri, kind, host_document_version, cancel, reject)
            .await
            .into_snapshot()
        else {
            return Ok(FormattingResponse::default());
        };
        let Some(server) = self.delegate_server(kind, supports) else {
            return Ok(FormattingResponse::default());
        };

        let Some(result) = self
            .forward(server.as_ref(), method, request(snapshot.uri()), cancel)
            .await?
        else {
            return Ok(FormattingResponse::default());
        };
        match serde_json::from_value::<Vec<TextEdit>>(result) {
            Ok(edits) => Ok(FormattingResponse { edits }),
            Err(e) => {
                log::warn!(
                    target: LOG_TARGET,
                    "Malformed {} response from {}: {}",
                    method,
                    server.name(),
                    e
                );
                Ok(FormattingResponse::default())
            }
        }
    }
}
