//! `workspace/configuration` as asked by the Razor server.
//!
//! The Razor server reads editor indentation from `vs.editor.razor` and its own
//! options from `razor`; every other section is answered with an empty object.

use serde_json::{Value, json};
use tower_lsp_server::jsonrpc::{Error, Result};

use super::RazorMessageTarget;

impl RazorMessageTarget {
    pub(crate) fn configuration_impl(&self, params: Value) -> Result<Value> {
        let Some(items) = params.get("items").and_then(Value::as_array) else {
            return Err(Error::invalid_params("items is required"));
        };
        let sections = items
            .iter()
            .map(|item| match item.get("section").and_then(Value::as_str) {
                Some("vs.editor.razor") => {
                    let editor = self.client_settings.editor_settings();
                    json!({
                        "indentWithTabs": editor.indent_with_tabs,
                        "indentSize": editor.indent_size,
                    })
                }
                Some("razor") => self.settings.razor.clone(),
                _ => json!({}),
            })
            .collect();
        Ok(Value::Array(sections))
    }
}
