//! `razor/completion`: completion in a projection, passed through as-is.

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower_lsp_server::jsonrpc::Result;

use super::{RazorMessageTarget, host_document_uri};
use crate::bridge::capabilities::supports_completion;
use crate::protocol::CompletionRequest;

impl RazorMessageTarget {
    pub(crate) async fn completion_impl(
        &self,
        request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let Some(kind) = request.projected_kind.virtual_kind() else {
            return Ok(Value::Null);
        };
        let Some(host_uri) = host_document_uri(&request.host_document_file_path) else {
            return Ok(Value::Null);
        };
        let reject = self
            .settings
            .synchronization
            .reject_on_newer_parallel_request
            .completion;
        let Some(snapshot) = self
            .synchronize(&host_uri, kind, request.host_document_version, cancel, reject)
            .await
            .into_snapshot()
        else {
            return Ok(Value::Null);
        };
        let Some(server) = self.delegate_server(kind, supports_completion) else {
            return Ok(Value::Null);
        };

        let mut params = json!({
            "textDocument": { "uri": snapshot.uri() },
            "position": request.projected_position,
        });
        if let Some(context) = request.context {
            params["context"] = context;
        }
        Ok(self
            .forward(server.as_ref(), "textDocument/completion", params, cancel)
            .await?
            .unwrap_or(Value::Null))
    }
}
