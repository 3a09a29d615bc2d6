//! Setting types deserialized from the editor's JSON configuration.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level bridge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    /// How to launch the Razor language server, if the bridge spawns it.
    pub razor_server: Option<ServerConfig>,
    /// Pool name of the Razor language server.
    pub razor_server_name: String,
    /// Downstream language servers keyed by server name.
    pub language_servers: HashMap<String, ServerConfig>,
    /// Server name used for single-target C# delegation.
    pub csharp_server_name: String,
    /// Server name used for single-target HTML delegation.
    pub html_server_name: String,
    /// Content type broadcast to for multi-server C# delegation.
    pub csharp_content_type: String,
    /// Content type broadcast to for multi-server HTML delegation.
    pub html_content_type: String,
    pub synchronization: SynchronizationSettings,
    /// Server names in the order their code actions are listed.
    ///
    /// Unlisted servers follow in arrival order.
    pub code_action_priorities: Vec<String>,
    pub editor: EditorSettings,
    /// Echoed back for the `razor` section of `workspace/configuration`.
    pub razor: Value,
    pub publisher: PublisherSettings,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            razor_server: None,
            razor_server_name: "razor".to_string(),
            language_servers: HashMap::new(),
            csharp_server_name: "csharp".to_string(),
            html_server_name: "html".to_string(),
            csharp_content_type: "RazorCSharp".to_string(),
            html_content_type: "html".to_string(),
            synchronization: SynchronizationSettings::default(),
            code_action_priorities: Vec::new(),
            editor: EditorSettings::default(),
            razor: Value::Object(Default::default()),
            publisher: PublisherSettings::default(),
        }
    }
}

/// Launch configuration for one language server process.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Program followed by its arguments.
    pub cmd: Vec<String>,
    /// Content types this server handles (used for multi-server fan-out).
    pub content_types: Vec<String>,
    pub initialization_options: Option<Value>,
}

/// Timeouts and per-call-site policies for virtual document synchronization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SynchronizationSettings {
    /// Upper bound for a version wait.
    pub timeout_ms: u64,
    /// Upper bound for waiting until a virtual document exists at all.
    pub creation_timeout_ms: u64,
    pub reject_on_newer_parallel_request: RejectPolicy,
}

impl SynchronizationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn creation_timeout(&self) -> Duration {
        Duration::from_millis(self.creation_timeout_ms)
    }
}

impl Default for SynchronizationSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 2_000,
            creation_timeout_ms: 500,
            reject_on_newer_parallel_request: RejectPolicy::default(),
        }
    }
}

/// Whether an older pending synchronization fails fast when a newer one
/// arrives for the same virtual document, per request family.
///
/// Colorization and completion are re-requested continuously while typing, so
/// superseded waits are dropped. Formatting and code actions are user-invoked
/// and every request is answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RejectPolicy {
    pub formatting: bool,
    pub code_actions: bool,
    pub semantic_tokens: bool,
    pub completion: bool,
}

impl Default for RejectPolicy {
    fn default() -> Self {
        Self {
            formatting: false,
            code_actions: false,
            semantic_tokens: true,
            completion: true,
        }
    }
}

/// Editor indentation preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorSettings {
    pub indent_with_tabs: bool,
    pub indent_size: u32,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            indent_with_tabs: false,
            indent_size: 4,
        }
    }
}

/// Project snapshot publishing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublisherSettings {
    /// Coalescing window per project.
    pub delay_ms: u64,
    /// How long a cached file-existence answer stays valid.
    pub file_exists_cache_ttl_ms: u64,
}

impl PublisherSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn file_exists_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.file_exists_cache_ttl_ms)
    }
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            delay_ms: 250,
            file_exists_cache_ttl_ms: 5_000,
        }
    }
}
