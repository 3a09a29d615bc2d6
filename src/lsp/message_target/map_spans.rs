//! `razor/mapSpans`: generated spans to Razor locations.

use tokio_util::sync::CancellationToken;
use tower_lsp_server::jsonrpc::Result;

use super::{RazorMessageTarget, downstream_failure, host_document_uri};
use crate::protocol::{MapSpansRequest, MapSpansResponse, MappedSpan};

impl RazorMessageTarget {
    pub(crate) async fn map_spans_impl(
        &self,
        request: MapSpansRequest,
        cancel: &CancellationToken,
    ) -> Result<MapSpansResponse> {
        let unmapped = MapSpansResponse {
            mapped_spans: vec![MappedSpan::default(); request.spans.len()],
        };
        let (Some(kind), Some(host_uri)) = (
            request.kind.virtual_kind(),
            host_document_uri(&request.host_document_file_path),
        ) else {
            return Ok(unmapped);
        };

        match self
            .span_mapping
            .map_spans(&host_uri, kind, &request.spans, cancel)
            .await
        {
            Ok(mapped_spans) => Ok(MapSpansResponse { mapped_spans }),
            Err(e) => downstream_failure(
                "razor/mapToDocumentRanges",
                &self.settings.razor_server_name,
                e,
                unmapped,
            ),
        }
    }
}
