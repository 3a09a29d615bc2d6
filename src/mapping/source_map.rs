//! Source mapping tables between Razor text and generated code.

use serde::{Deserialize, Serialize};

use crate::text::TextSpan;

/// One region copied verbatim from the Razor source into generated code,
/// e.g. the `Model.Name` of `@Model.Name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMapping {
    pub original_span: TextSpan,
    pub generated_span: TextSpan,
}

/// Mappings of one generated document.
///
/// A span maps only when it lies wholly inside a single mapped region; its
/// offset within the region is preserved on the other side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    mappings: Vec<SourceMapping>,
}

impl SourceMap {
    pub fn new(mut mappings: Vec<SourceMapping>) -> Self {
        mappings.sort_by_key(|m| m.generated_span.start);
        Self { mappings }
    }

    pub fn mappings(&self) -> &[SourceMapping] {
        &self.mappings
    }

    /// Generated span -> Razor span.
    pub fn map_to_original(&self, generated: TextSpan) -> Option<TextSpan> {
        self.mappings
            .iter()
            .find(|m| m.generated_span.contains_span(&generated))
            .and_then(|m| translate(generated, m.generated_span, m.original_span))
    }

    /// Razor span -> generated span.
    pub fn map_to_generated(&self, original: TextSpan) -> Option<TextSpan> {
        self.mappings
            .iter()
            .find(|m| m.original_span.contains_span(&original))
            .and_then(|m| translate(original, m.original_span, m.generated_span))
    }
}

fn translate(span: TextSpan, from: TextSpan, to: TextSpan) -> Option<TextSpan> {
    let mapped = TextSpan::new(to.start + (span.start - from.start), span.length);
    to.contains_span(&mapped).then_some(mapped)
}
