//! Range mapping providers.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tower_lsp_server::ls_types::Range;
use url::Url;

use super::source_map::SourceMap;
use crate::bridge::LanguageServerPool;
use crate::document::{DocumentManager, VirtualDocumentKind};
use crate::protocol::{MapToDocumentRangesParams, MapToDocumentRangesResponse, RazorLanguageKind};
use crate::text::PositionMapper;

const LOG_TARGET: &str = "razor_bridge::mapping";

/// Razor ranges for a batch of projected ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedRanges {
    /// Same length and order as the request; `None` where unmappable.
    pub ranges: Vec<Option<Range>>,
    pub host_document_version: Option<i32>,
}

/// Maps ranges of a generated document back into its Razor document.
#[async_trait]
pub trait DocumentMappingProvider: Send + Sync {
    /// `Ok(None)` when the document is unknown to the provider.
    async fn map_to_document_ranges(
        &self,
        kind: RazorLanguageKind,
        host_uri: &Url,
        projected_ranges: &[Range],
        cancel: &CancellationToken,
    ) -> io::Result<Option<MappedRanges>>;
}

/// Asks the Razor server through `razor/mapToDocumentRanges`.
///
/// The server is looked up in the pool on every call, so the provider can be
/// built before the Razor server is started.
pub struct RazorServerMappingProvider {
    pool: Arc<LanguageServerPool>,
    server_name: String,
}

impl RazorServerMappingProvider {
    pub fn new(pool: Arc<LanguageServerPool>, server_name: impl Into<String>) -> Self {
        Self {
            pool,
            server_name: server_name.into(),
        }
    }
}

#[async_trait]
impl DocumentMappingProvider for RazorServerMappingProvider {
    async fn map_to_document_ranges(
        &self,
        kind: RazorLanguageKind,
        host_uri: &Url,
        projected_ranges: &[Range],
        cancel: &CancellationToken,
    ) -> io::Result<Option<MappedRanges>> {
        let Some(razor) = self.pool.get(&self.server_name) else {
            log::debug!(target: LOG_TARGET, "Razor server {} not running", self.server_name);
            return Ok(None);
        };
        let params = serde_json::to_value(MapToDocumentRangesParams {
            kind,
            razor_document_uri: host_uri.to_string(),
            projected_ranges: projected_ranges.to_vec(),
        })?;
        let result = razor
            .send_request("razor/mapToDocumentRanges", params, cancel)
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let response: MapToDocumentRangesResponse = serde_json::from_value(result)?;
        let ranges = response.mapped_ranges();
        if ranges.len() != projected_ranges.len() {
            log::warn!(
                target: LOG_TARGET,
                "Razor server mapped {} of {} ranges for {}",
                ranges.len(),
                projected_ranges.len(),
                host_uri
            );
        }
        Ok(Some(MappedRanges {
            ranges,
            host_document_version: response.host_document_version,
        }))
    }
}

/// Maps through locally held [`SourceMap`]s.
///
/// Needs the Razor text of the host document, so it only maps documents whose
/// editor content has been supplied to the [`DocumentManager`].
pub struct SourceMapMappingProvider {
    documents: Arc<DocumentManager>,
    source_maps: DashMap<(Url, VirtualDocumentKind), SourceMap>,
}

impl SourceMapMappingProvider {
    pub fn new(documents: Arc<DocumentManager>) -> Self {
        Self {
            documents,
            source_maps: DashMap::new(),
        }
    }

    pub fn set_source_map(&self, host_uri: &Url, kind: VirtualDocumentKind, source_map: SourceMap) {
        self.source_maps.insert((host_uri.clone(), kind), source_map);
    }

    pub fn remove_source_maps(&self, host_uri: &Url) {
        self.source_maps.retain(|(uri, _), _| uri != host_uri);
    }
}

#[async_trait]
impl DocumentMappingProvider for SourceMapMappingProvider {
    async fn map_to_document_ranges(
        &self,
        kind: RazorLanguageKind,
        host_uri: &Url,
        projected_ranges: &[Range],
        _cancel: &CancellationToken,
    ) -> io::Result<Option<MappedRanges>> {
        let Some(document) = self.documents.try_get_document(host_uri) else {
            return Ok(None);
        };
        let Some(virtual_kind) = kind.virtual_kind() else {
            // Razor ranges are already in Razor coordinates.
            return Ok(Some(MappedRanges {
                ranges: projected_ranges.iter().copied().map(Some).collect(),
                host_document_version: Some(document.version()),
            }));
        };
        let (Some(host_text), Some(generated)) =
            (document.text(), document.virtual_document(virtual_kind))
        else {
            return Ok(None);
        };
        let Some(source_map) = self
            .source_maps
            .get(&(host_uri.clone(), virtual_kind))
            .map(|entry| entry.value().clone())
        else {
            return Ok(None);
        };

        let generated_mapper = PositionMapper::new(generated.text());
        let host_mapper = PositionMapper::new(host_text);
        let ranges = projected_ranges
            .iter()
            .map(|range| {
                let span = generated_mapper.range_to_span(*range)?;
                let original = source_map.map_to_original(span)?;
                host_mapper.span_to_range(original)
            })
            .collect();

        Ok(Some(MappedRanges {
            ranges,
            host_document_version: generated.host_document_version(),
        }))
    }
}
