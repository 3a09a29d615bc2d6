//! Configuration for the Razor bridge.
//!
//! Settings arrive as JSON (typically the `initializationOptions` the editor
//! passes along) and are deserialized into [`BridgeSettings`]. Every field has
//! a default, so an empty object yields a working configuration.

pub mod settings;

pub use settings::{
    BridgeSettings, EditorSettings, PublisherSettings, RejectPolicy, ServerConfig,
    SynchronizationSettings,
};

use std::sync::{Arc, RwLock};

use serde_json::Value;

/// Parse settings from a JSON value, falling back to defaults on error.
///
/// A malformed configuration is logged and ignored rather than refusing to
/// start; the editor keeps working with default server names and timeouts.
pub fn load_settings(value: Option<Value>) -> BridgeSettings {
    let Some(value) = value else {
        return BridgeSettings::default();
    };
    match serde_json::from_value::<BridgeSettings>(value) {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!(
                target: "razor_bridge::config",
                "Invalid bridge settings, using defaults: {}",
                e
            );
            BridgeSettings::default()
        }
    }
}

/// Shared, updatable view of the editor-side settings.
///
/// The editor owns indentation preferences; the bridge only echoes them back
/// when the Razor server asks through `workspace/configuration`.
#[derive(Debug, Clone, Default)]
pub struct ClientSettingsManager {
    editor: Arc<RwLock<EditorSettings>>,
}

impl ClientSettingsManager {
    pub fn new(editor: EditorSettings) -> Self {
        Self {
            editor: Arc::new(RwLock::new(editor)),
        }
    }

    pub fn editor_settings(&self) -> EditorSettings {
        match self.editor.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, editor: EditorSettings) {
        let mut guard = match self.editor.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = editor;
    }
}
