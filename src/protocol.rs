//! Wire types of the `razor/*` custom messages.
//!
//! Field names are camelCase on the wire. Downstream payloads that the bridge
//! only forwards (code actions, completion lists) stay as raw JSON so vendor
//! extensions survive the round trip.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use tower_lsp_server::ls_types::{FormattingOptions, Position, Range, TextEdit};

use crate::document::VirtualDocumentKind;
use crate::text::{TextChange, TextSpan};

/// Which language a Razor request is about.
///
/// Serialized as its integer value (`CSharp = 0`, `Html = 1`, `Razor = 2`);
/// the variant name is accepted as well when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RazorLanguageKind {
    CSharp,
    Html,
    Razor,
}

impl RazorLanguageKind {
    /// The projection this kind is served from; `None` for Razor itself.
    pub fn virtual_kind(self) -> Option<VirtualDocumentKind> {
        match self {
            RazorLanguageKind::CSharp => Some(VirtualDocumentKind::CSharp),
            RazorLanguageKind::Html => Some(VirtualDocumentKind::Html),
            RazorLanguageKind::Razor => None,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RazorLanguageKind::CSharp => 0,
            RazorLanguageKind::Html => 1,
            RazorLanguageKind::Razor => 2,
        }
    }
}

impl From<VirtualDocumentKind> for RazorLanguageKind {
    fn from(kind: VirtualDocumentKind) -> Self {
        match kind {
            VirtualDocumentKind::CSharp => RazorLanguageKind::CSharp,
            VirtualDocumentKind::Html => RazorLanguageKind::Html,
        }
    }
}

impl Serialize for RazorLanguageKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for RazorLanguageKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Clone, Copy)]
        struct KindVisitor;

        impl Visitor<'_> for KindVisitor {
            type Value = RazorLanguageKind;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a Razor language kind (0-2 or a variant name)")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                match v {
                    0 => Ok(RazorLanguageKind::CSharp),
                    1 => Ok(RazorLanguageKind::Html),
                    2 => Ok(RazorLanguageKind::Razor),
                    _ => Err(E::invalid_value(de::Unexpected::Unsigned(v), &self)),
                }
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
                    .and_then(|v| self.visit_u64(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                match v.to_ascii_lowercase().as_str() {
                    "csharp" => Ok(RazorLanguageKind::CSharp),
                    "html" => Ok(RazorLanguageKind::Html),
                    "razor" => Ok(RazorLanguageKind::Razor),
                    _ => Err(E::unknown_variant(v, &["CSharp", "Html", "Razor"])),
                }
            }
        }

        deserializer.deserialize_any(KindVisitor)
    }
}

/// `razor/updateCSharpBuffer` and `razor/updateHtmlBuffer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBufferRequest {
    pub host_document_file_path: String,
    pub host_document_version: Option<i32>,
    #[serde(default)]
    pub changes: Vec<TextChange>,
    #[serde(default)]
    pub previous_was_empty: Option<bool>,
}

/// `razor/rangeFormatting`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeFormattingParams {
    pub kind: RazorLanguageKind,
    pub host_document_file_path: String,
    pub projected_range: Range,
    pub options: FormattingOptions,
    #[serde(default)]
    pub host_document_version: i32,
}

/// `razor/onTypeFormatting`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnTypeFormattingParams {
    pub kind: RazorLanguageKind,
    pub host_document_file_path: String,
    pub projected_position: Position,
    pub trigger_character: String,
    pub options: FormattingOptions,
    #[serde(default)]
    pub host_document_version: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormattingResponse {
    pub edits: Vec<TextEdit>,
}

/// `razor/codeAction`. `code_action_params` is a standard `CodeActionParams`
/// addressed to the host document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeActionRequest {
    pub host_document_version: i32,
    pub language_kind: RazorLanguageKind,
    pub code_action_params: Value,
}

/// `razor/resolveCodeAction`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveCodeActionRequest {
    pub language_kind: RazorLanguageKind,
    pub code_action: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextDocumentRef {
    pub uri: String,
}

/// `razor/semanticTokensRange`, `razor/semanticTokens` and
/// `razor/semanticTokensDelta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticTokensRequest {
    pub text_document: TextDocumentRef,
    pub required_host_document_version: i32,
    #[serde(default)]
    pub range: Option<Range>,
    #[serde(default)]
    pub previous_result_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticTokensResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_id: Option<String>,
    /// `null` when the projection could not be synchronized.
    pub tokens: Option<Vec<u32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edits: Option<Value>,
    pub is_finalized: bool,
    /// Version the tokens belong to; `-1` when unknown.
    pub host_document_sync_version: i64,
}

impl SemanticTokensResponse {
    /// Answer for a projection that is not in sync.
    pub fn out_of_sync(last_known_version: Option<i32>) -> Self {
        Self {
            result_id: None,
            tokens: None,
            edits: None,
            is_finalized: false,
            host_document_sync_version: last_known_version.map_or(-1, i64::from),
        }
    }
}

/// `razor/completion`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub host_document_file_path: String,
    pub host_document_version: i32,
    pub projected_kind: RazorLanguageKind,
    pub projected_position: Position,
    #[serde(default)]
    pub context: Option<Value>,
}

/// `razor/mapSpans`: spans of a generated document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSpansRequest {
    pub host_document_file_path: String,
    pub kind: RazorLanguageKind,
    pub spans: Vec<TextSpan>,
}

/// One entry per requested span; unmapped spans carry `range: null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedSpan {
    pub file_path: String,
    pub range: Option<Range>,
    pub span: Option<TextSpan>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapSpansResponse {
    pub mapped_spans: Vec<MappedSpan>,
}

/// `razor/mapToDocumentRanges`, sent to the Razor server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapToDocumentRangesParams {
    pub kind: RazorLanguageKind,
    pub razor_document_uri: String,
    pub projected_ranges: Vec<Range>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapToDocumentRangesResponse {
    /// Unmappable ranges come back as `(-1,-1)-(-1,-1)` or `null`.
    pub ranges: Vec<Value>,
    #[serde(default)]
    pub host_document_version: Option<i32>,
}

impl MapToDocumentRangesResponse {
    /// Ranges in request order, `None` where the server could not map.
    pub fn mapped_ranges(&self) -> Vec<Option<Range>> {
        self.ranges
            .iter()
            .map(|raw| serde_json::from_value::<Range>(raw.clone()).ok())
            .collect()
    }
}

/// `razor/monitorProjectConfigurationFilePath`, sent to the Razor server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorProjectConfigurationFilePathParams {
    pub project_file_path: String,
    pub configuration_file_path: Option<String>,
}
