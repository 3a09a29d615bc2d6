//! Capability predicates over raw `ServerCapabilities` JSON.
//!
//! Capabilities are kept as [`Value`] because downstream servers advertise
//! vendor extensions the typed structs would drop.

use serde_json::Value;

/// Whether `key` is advertised: `true`, or any options object.
pub fn has_provider(capabilities: &Value, key: &str) -> bool {
    match capabilities.get(key) {
        Some(Value::Bool(enabled)) => *enabled,
        Some(Value::Object(_)) => true,
        _ => false,
    }
}

/// Code actions *and* `codeAction/resolve`.
///
/// `codeActionProvider: true` does not imply resolution; only an options
/// object with `resolveProvider: true` qualifies.
pub fn supports_code_action_resolve(capabilities: &Value) -> bool {
    capabilities
        .get("codeActionProvider")
        .and_then(|provider| provider.get("resolveProvider"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

pub fn supports_range_formatting(capabilities: &Value) -> bool {
    has_provider(capabilities, "documentRangeFormattingProvider")
}

pub fn supports_on_type_formatting(capabilities: &Value) -> bool {
    has_provider(capabilities, "documentOnTypeFormattingProvider")
}

pub fn supports_completion(capabilities: &Value) -> bool {
    has_provider(capabilities, "completionProvider")
}

pub fn supports_semantic_tokens_range(capabilities: &Value) -> bool {
    semantic_tokens_option(capabilities, "range")
}

pub fn supports_semantic_tokens_full(capabilities: &Value) -> bool {
    semantic_tokens_option(capabilities, "full")
}

/// `semanticTokensProvider.full.delta == true`.
pub fn supports_semantic_tokens_delta(capabilities: &Value) -> bool {
    capabilities
        .get("semanticTokensProvider")
        .and_then(|provider| provider.get("full"))
        .and_then(|full| full.get("delta"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn semantic_tokens_option(capabilities: &Value, option: &str) -> bool {
    let Some(provider) = capabilities.get("semanticTokensProvider") else {
        return false;
    };
    match provider.get(option) {
        Some(Value::Bool(enabled)) => *enabled,
        Some(Value::Object(_)) => true,
        _ => false,
    }
}
