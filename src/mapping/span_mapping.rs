//! Span-level mapping from generated documents back to Razor files.

use std::io;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tower_lsp_server::ls_types::Range;
use url::Url;

use super::provider::DocumentMappingProvider;
use crate::document::{DocumentManager, VirtualDocumentKind};
use crate::protocol::MappedSpan;
use crate::text::{PositionMapper, TextSpan};

const LOG_TARGET: &str = "razor_bridge::mapping";

/// Maps spans of a virtual document to file/range/span triples in the Razor
/// document that produced it.
///
/// The result always has one entry per input span. Spans that cannot be mapped
/// (unknown document, outside every mapped region) produce an empty
/// [`MappedSpan`].
pub struct RazorSpanMappingService {
    documents: Arc<DocumentManager>,
    provider: Arc<dyn DocumentMappingProvider>,
}

impl RazorSpanMappingService {
    pub fn new(documents: Arc<DocumentManager>, provider: Arc<dyn DocumentMappingProvider>) -> Self {
        Self {
            documents,
            provider,
        }
    }

    pub fn documents(&self) -> &Arc<DocumentManager> {
        &self.documents
    }

    pub fn provider(&self) -> &Arc<dyn DocumentMappingProvider> {
        &self.provider
    }

    pub async fn map_spans(
        &self,
        host_uri: &Url,
        kind: VirtualDocumentKind,
        spans: &[TextSpan],
        cancel: &CancellationToken,
    ) -> io::Result<Vec<MappedSpan>> {
        let unmapped = || vec![MappedSpan::default(); spans.len()];

        let Some(document) = self.documents.try_get_document(host_uri) else {
            log::debug!(target: LOG_TARGET, "No document {} to map spans of", host_uri);
            return Ok(unmapped());
        };
        let Some(generated) = document.virtual_document(kind) else {
            return Ok(unmapped());
        };

        // Positions are only meaningful for spans that exist in the generated text.
        let generated_mapper = PositionMapper::new(generated.text());
        let projected: Vec<(usize, Range)> = spans
            .iter()
            .enumerate()
            .filter_map(|(i, span)| Some((i, generated_mapper.span_to_range(*span)?)))
            .collect();
        if projected.is_empty() {
            return Ok(unmapped());
        }

        let ranges: Vec<Range> = projected.iter().map(|(_, range)| *range).collect();
        let Some(mapped) = self
            .provider
            .map_to_document_ranges(kind.into(), host_uri, &ranges, cancel)
            .await?
        else {
            return Ok(unmapped());
        };

        let file_path = host_file_path(host_uri);
        let host_mapper = document.text().map(PositionMapper::new);
        let mut result = unmapped();
        for ((index, _), range) in projected.iter().zip(mapped.ranges) {
            let Some(range) = range else {
                continue;
            };
            result[*index] = MappedSpan {
                file_path: file_path.clone(),
                range: Some(range),
                span: host_mapper
                    .as_ref()
                    .and_then(|mapper| mapper.range_to_span(range)),
            };
        }
        Ok(result)
    }
}

/// The host document's file system path, falling back to the URI text for
/// non-file schemes.
pub(crate) fn host_file_path(uri: &Url) -> String {
    match uri.to_file_path() {
        Ok(path) => path.to_string_lossy().into_owned(),
        Err(()) => uri.to_string(),
    }
}
