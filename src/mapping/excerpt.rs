//! Classified previews of the Razor text behind a generated C# span.
//!
//! Used for peek/tooltip style displays: the C# server finds a location in the
//! generated document, and the editor wants to show the Razor line(s) it came
//! from, colored like C# where the text is C# and plain elsewhere.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::classification::TEXT_CLASSIFICATION;
use super::span_mapping::RazorSpanMappingService;
use crate::document::{DocumentManager, VirtualDocumentKind, VirtualDocumentSnapshot};
use crate::text::{PositionMapper, TextSpan};

const LOG_TARGET: &str = "razor_bridge::mapping";

/// Lines shown above and below the mapped span in [`ExcerptMode::Tooltip`].
const TOOLTIP_CONTEXT_LINES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcerptMode {
    /// Only the line(s) holding the span.
    SingleLine,
    /// The span's lines plus surrounding context.
    Tooltip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedSpan {
    pub span: TextSpan,
    pub classification: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcerptResult {
    /// Razor text of the excerpt.
    pub content: String,
    /// The mapped span, relative to `content`.
    pub mapped_span: TextSpan,
    /// Contiguous classification of all of `content`.
    pub classified_spans: Vec<ClassifiedSpan>,
    pub document_uri: Url,
    /// The mapped span, in the Razor document.
    pub span: TextSpan,
}

/// Classifies generated code.
#[async_trait]
pub trait ClassificationSource: Send + Sync {
    /// Classified spans, in generated-document offsets, for tokens within
    /// `span`. Tokens may extend past `span`; callers clip.
    async fn classify(
        &self,
        document: &VirtualDocumentSnapshot,
        span: TextSpan,
        cancel: &CancellationToken,
    ) -> io::Result<Vec<ClassifiedSpan>>;
}

pub struct DocumentExcerptService {
    documents: Arc<DocumentManager>,
    mapping: Arc<RazorSpanMappingService>,
    classifier: Arc<dyn ClassificationSource>,
}

impl DocumentExcerptService {
    pub fn new(
        documents: Arc<DocumentManager>,
        mapping: Arc<RazorSpanMappingService>,
        classifier: Arc<dyn ClassificationSource>,
    ) -> Self {
        Self {
            documents,
            mapping,
            classifier,
        }
    }

    /// Excerpt of the Razor text behind `generated_span` of the C# projection.
    ///
    /// `Ok(None)` when the document, its Razor text, or a mapping for the span
    /// is unavailable.
    pub async fn try_excerpt(
        &self,
        host_uri: &Url,
        generated_span: TextSpan,
        mode: ExcerptMode,
        cancel: &CancellationToken,
    ) -> io::Result<Option<ExcerptResult>> {
        let Some(document) = self.documents.try_get_document(host_uri) else {
            return Ok(None);
        };
        let (Some(razor_text), Some(generated)) = (
            document.text(),
            document.virtual_document(VirtualDocumentKind::CSharp),
        ) else {
            return Ok(None);
        };

        let mapped = self
            .mapping
            .map_spans(host_uri, VirtualDocumentKind::CSharp, &[generated_span], cancel)
            .await?;
        let Some((razor_span, razor_range)) = mapped
            .into_iter()
            .next()
            .and_then(|m| Some((m.span?, m.range?)))
        else {
            return Ok(None);
        };

        let mapper = PositionMapper::new(razor_text);
        let context = match mode {
            ExcerptMode::SingleLine => 0,
            ExcerptMode::Tooltip => TOOLTIP_CONTEXT_LINES,
        };
        let last_line = mapper.line_count().saturating_sub(1) as u32;
        let first = razor_range.start.line.saturating_sub(context);
        let last = razor_range.end.line.saturating_add(context).min(last_line);
        let Some(excerpt_span) = line_span(&mapper, first, last) else {
            return Ok(None);
        };
        let Some(content) = mapper.slice(excerpt_span) else {
            return Ok(None);
        };
        let mapped_span = TextSpan::new(razor_span.start - excerpt_span.start, razor_span.length);

        let tokens = match self.classifier.classify(generated, generated_span, cancel).await {
            Ok(tokens) => tokens,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Err(e),
            Err(e) => {
                log::warn!(
                    target: LOG_TARGET,
                    "Classifying excerpt of {} failed: {}",
                    host_uri,
                    e
                );
                Vec::new()
            }
        };
        let classified_spans = stitch(excerpt_span.length, mapped_span, generated_span, tokens);

        Ok(Some(ExcerptResult {
            content: content.to_string(),
            mapped_span,
            classified_spans,
            document_uri: host_uri.clone(),
            span: razor_span,
        }))
    }
}

/// UTF-16 span from the start of line `first` to the end of line `last`,
/// excluding the final terminator.
fn line_span(mapper: &PositionMapper<'_>, first: u32, last: u32) -> Option<TextSpan> {
    let start = mapper.line_byte_range(first as usize)?.start;
    let end = mapper.line_byte_range(last as usize)?.end;
    Some(TextSpan::from_bounds(
        mapper.byte_to_utf16_offset(start)?,
        mapper.byte_to_utf16_offset(end)?,
    ))
}

/// Cover `[0, length)` with classified spans: generated tokens shifted onto
/// `mapped_span`, and plain text everywhere else.
fn stitch(
    length: usize,
    mapped_span: TextSpan,
    generated_span: TextSpan,
    mut tokens: Vec<ClassifiedSpan>,
) -> Vec<ClassifiedSpan> {
    tokens.sort_by_key(|token| token.span.start);

    let mut result = Vec::new();
    let mut cursor = 0;

    let region_end = mapped_span.start + mapped_span.length.min(generated_span.length);
    for token in tokens {
        let start = token.span.start.max(generated_span.start);
        let end = token.span.end().min(generated_span.end());
        if start >= end {
            continue;
        }
        let shifted_start = mapped_span.start + (start - generated_span.start);
        let shifted_end = (mapped_span.start + (end - generated_span.start)).min(region_end);
        if shifted_start < cursor || shifted_start >= shifted_end {
            // Overlaps an earlier token.
            continue;
        }
        push_span(&mut result, TextSpan::from_bounds(cursor, shifted_start), TEXT_CLASSIFICATION);
        push_span(
            &mut result,
            TextSpan::from_bounds(shifted_start, shifted_end),
            &token.classification,
        );
        cursor = shifted_end;
    }
    push_span(&mut result, TextSpan::from_bounds(cursor, length), TEXT_CLASSIFICATION);
    result
}

fn push_span(result: &mut Vec<ClassifiedSpan>, span: TextSpan, classification: &str) {
    if !span.is_empty() {
        result.push(ClassifiedSpan {
            span,
            classification: classification.to_string(),
        });
    }
}
