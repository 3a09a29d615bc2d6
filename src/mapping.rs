//! Translation between generated (C#/HTML) and Razor coordinates.
//!
//! Ranges are mapped by a [`DocumentMappingProvider`]: in production the Razor
//! server, which owns the source mappings of the generated code.
//! [`RazorSpanMappingService`] works on spans of a generated document and
//! [`DocumentExcerptService`] builds classified previews of the Razor text
//! behind a generated span.

pub mod classification;
pub mod excerpt;
pub mod provider;
pub mod source_map;
pub mod span_mapping;

pub use classification::{DecodedToken, SemanticTokensClassifier, decode_semantic_tokens};
pub use excerpt::{
    ClassificationSource, ClassifiedSpan, DocumentExcerptService, ExcerptMode, ExcerptResult,
};
pub use provider::{
    DocumentMappingProvider, MappedRanges, RazorServerMappingProvider, SourceMapMappingProvider,
};
pub use source_map::{SourceMap, SourceMapping};
pub use span_mapping::RazorSpanMappingService;
