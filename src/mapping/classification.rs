//! Classification of generated code through downstream semantic tokens.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower_lsp_server::ls_types::Position;

use super::excerpt::{ClassificationSource, ClassifiedSpan};
use crate::bridge::LanguageServerPool;
use crate::bridge::capabilities::supports_semantic_tokens_range;
use crate::document::VirtualDocumentSnapshot;
use crate::text::{PositionMapper, TextSpan};

const LOG_TARGET: &str = "razor_bridge::mapping";

/// Classification used where no token covers the text.
pub const TEXT_CLASSIFICATION: &str = "text";

/// One semantic token with an absolute start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedToken {
    pub start: Position,
    /// Length in UTF-16 code units.
    pub length: u32,
    pub token_type: u32,
}

/// Decode LSP relative `[deltaLine, deltaStart, length, type, modifiers]`
/// tuples. A trailing partial tuple is ignored.
pub fn decode_semantic_tokens(data: &[u32]) -> Vec<DecodedToken> {
    let mut line = 0;
    let mut character = 0;
    data.chunks_exact(5)
        .map(|token| {
            if token[0] > 0 {
                line += token[0];
                character = token[1];
            } else {
                character += token[1];
            }
            DecodedToken {
                start: Position::new(line, character),
                length: token[2],
                token_type: token[3],
            }
        })
        .collect()
}

/// Classifies generated code with `textDocument/semanticTokens/range` of one
/// downstream server, naming tokens by the server's legend.
pub struct SemanticTokensClassifier {
    pool: Arc<LanguageServerPool>,
    server_name: String,
}

impl SemanticTokensClassifier {
    pub fn new(pool: Arc<LanguageServerPool>, server_name: impl Into<String>) -> Self {
        Self {
            pool,
            server_name: server_name.into(),
        }
    }
}

#[async_trait]
impl ClassificationSource for SemanticTokensClassifier {
    async fn classify(
        &self,
        document: &VirtualDocumentSnapshot,
        span: TextSpan,
        cancel: &CancellationToken,
    ) -> io::Result<Vec<ClassifiedSpan>> {
        let Some(server) = self.pool.get(&self.server_name) else {
            return Ok(Vec::new());
        };
        let capabilities = server.capabilities();
        if !supports_semantic_tokens_range(&capabilities) {
            log::debug!(
                target: LOG_TARGET,
                "{} does not provide range semantic tokens",
                self.server_name
            );
            return Ok(Vec::new());
        }
        let legend: Vec<&str> = capabilities
            .pointer("/semanticTokensProvider/legend/tokenTypes")
            .and_then(Value::as_array)
            .map(|types| types.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mapper = PositionMapper::new(document.text());
        let Some(range) = mapper.span_to_range(span) else {
            return Ok(Vec::new());
        };
        let params = json!({
            "textDocument": { "uri": document.uri() },
            "range": range,
        });
        let result = server
            .send_request("textDocument/semanticTokens/range", params, cancel)
            .await?;
        let data: Vec<u32> = match result.get("data") {
            Some(data) => serde_json::from_value(data.clone())?,
            None => return Ok(Vec::new()),
        };

        Ok(decode_semantic_tokens(&data)
            .into_iter()
            .filter_map(|token| {
                let start = mapper.position_to_offset(token.start)?;
                Some(ClassifiedSpan {
                    span: TextSpan::new(start, token.length as usize),
                    classification: legend
                        .get(token.token_type as usize)
                        .copied()
                        .unwrap_or(TEXT_CLASSIFICATION)
                        .to_string(),
                })
            })
            .collect())
    }
}
