//! `razor/codeAction` and `razor/resolveCodeAction`.
//!
//! Both fan out to every server of the projection's content type that can
//! provide *and* resolve code actions; servers that provide actions they
//! cannot resolve would hand the editor unusable entries.

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower_lsp_server::jsonrpc::Result;

use super::{LOG_TARGET, RazorMessageTarget, host_document_uri};
use crate::bridge::capabilities::supports_code_action_resolve;
use crate::bridge::{dispatch_collect_all, dispatch_first_win};
use crate::protocol::{CodeActionRequest, ResolveCodeActionRequest};

impl RazorMessageTarget {
    pub(crate) async fn code_action_impl(
        &self,
        request: CodeActionRequest,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let no_actions = Value::Array(Vec::new());
        let Some(kind) = request.language_kind.virtual_kind() else {
            return Ok(no_actions);
        };
        let mut params = request.code_action_params;
        let Some(host_uri) = params
            .pointer("/textDocument/uri")
            .and_then(Value::as_str)
            .and_then(host_document_uri)
        else {
            return Err(tower_lsp_server::jsonrpc::Error::invalid_params(
                "codeActionParams.textDocument.uri is required",
            ));
        };

        let reject = self
            .settings
            .synchronization
            .reject_on_newer_parallel_request
            .code_actions;
        let Some(snapshot) = self
            .synchronize(&host_uri, kind, request.host_document_version, cancel, reject)
            .await
            .into_snapshot()
        else {
            return Ok(no_actions);
        };
        if let Some(uri) = params.pointer_mut("/textDocument/uri") {
            *uri = Value::String(snapshot.uri().to_string());
        }

        let servers = self
            .pool
            .servers_for(self.content_type(kind), supports_code_action_resolve);
        if servers.is_empty() {
            log::debug!(target: LOG_TARGET, "No {} server resolves code actions", kind);
            return Ok(no_actions);
        }
        let result = dispatch_collect_all(
            servers,
            |server| {
                let params = params.clone();
                let cancel = cancel.clone();
                async move {
                    server
                        .send_request("textDocument/codeAction", params, &cancel)
                        .await
                }
            },
            &self.settings.code_action_priorities,
            cancel,
        )
        .await;

        result.into_response("razor/codeAction", no_actions, |responses| {
            let actions = responses
                .into_iter()
                .flat_map(|response| match response {
                    Value::Array(actions) => actions,
                    _ => Vec::new(),
                })
                .collect();
            Ok(Value::Array(actions))
        })
    }

    pub(crate) async fn resolve_code_action_impl(
        &self,
        request: ResolveCodeActionRequest,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let Some(kind) = request.language_kind.virtual_kind() else {
            return Ok(Value::Null);
        };
        let servers = self
            .pool
            .servers_for(self.content_type(kind), supports_code_action_resolve);
        let code_action = request.code_action;
        let result = dispatch_first_win(
            servers,
            |server| {
                let code_action = code_action.clone();
                let cancel = cancel.clone();
                async move {
                    server
                        .send_request("codeAction/resolve", code_action, &cancel)
                        .await
                }
            },
            |resolved: &Value| !resolved.is_null(),
            cancel,
        )
        .await;
        result.into_response("razor/resolveCodeAction", Value::Null, Ok)
    }
}
