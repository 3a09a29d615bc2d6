//! `razor/updateCSharpBuffer` and `razor/updateHtmlBuffer`.

use serde_json::Value;

use super::{LOG_TARGET, RazorMessageTarget, host_document_uri, parse};
use crate::document::{UpdateState, UpdateVirtualDocumentError, VirtualDocumentKind};
use crate::protocol::UpdateBufferRequest;

impl RazorMessageTarget {
    pub(super) fn update_buffer_notification(&self, kind: VirtualDocumentKind, params: Value) {
        match parse::<UpdateBufferRequest>(params) {
            Ok(request) => self.update_buffer_impl(kind, request),
            Err(e) => log::warn!(
                target: LOG_TARGET,
                "Malformed {} buffer update: {}",
                kind,
                e.message
            ),
        }
    }

    pub(crate) fn update_buffer_impl(&self, kind: VirtualDocumentKind, request: UpdateBufferRequest) {
        let Some(host_uri) = host_document_uri(&request.host_document_file_path) else {
            log::warn!(
                target: LOG_TARGET,
                "Cannot resolve {} buffer update target {}",
                kind,
                request.host_document_file_path
            );
            return;
        };
        let Some(version) = request.host_document_version else {
            log::debug!(
                target: LOG_TARGET,
                "{} buffer update for {} without a host version",
                kind,
                host_uri
            );
            return;
        };
        let state = UpdateState {
            previous_was_empty: request.previous_was_empty,
        };
        match self
            .documents
            .try_update_virtual_document(&host_uri, kind, &request.changes, version, state)
        {
            Ok(_) => {}
            // The editor may have closed the document while the update was in flight.
            Err(UpdateVirtualDocumentError::DocumentNotFound(_)) => {
                log::debug!(
                    target: LOG_TARGET,
                    "{} buffer update for closed document {}",
                    kind,
                    host_uri
                );
            }
            Err(UpdateVirtualDocumentError::Update(e)) => {
                log::warn!(
                    target: LOG_TARGET,
                    "Rejected {} buffer update for {} at version {}: {}",
                    kind,
                    host_uri,
                    version,
                    e
                );
            }
        }
    }
}
