//! Mirrors virtual documents into downstream language servers.
//!
//! The C# and HTML servers only see virtual documents through the standard
//! text synchronization notifications. This listener turns document manager
//! events into `didOpen` / `didChange` (full sync) / `didClose`.
//!
//! Versions are tracked per server and per virtual URI, starting at 1 on
//! `didOpen` and incremented on every `didChange`.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::json;
use url::Url;

use super::connection::LanguageServerConnection;
use super::pool::LanguageServerPool;
use crate::config::BridgeSettings;
use crate::document::{
    DocumentChangeListener, LspDocumentChangeEvent, LspDocumentChangeKind, VirtualDocumentKind,
    VirtualDocumentSnapshot,
};

const LOG_TARGET: &str = "razor_bridge::bridge";

/// Downstream servers a projection kind is mirrored into: every server
/// serving the kind's content type, plus the named single-target server.
#[derive(Debug, Clone)]
struct KindRoute {
    server_name: String,
    content_type: String,
}

pub struct VirtualDocumentPublisher {
    pool: Arc<LanguageServerPool>,
    csharp: KindRoute,
    html: KindRoute,
    /// (server name, virtual URI) -> last sent version.
    document_versions: DashMap<(String, Url), i32>,
}

impl VirtualDocumentPublisher {
    pub fn new(pool: Arc<LanguageServerPool>, settings: &BridgeSettings) -> Self {
        Self {
            pool,
            csharp: KindRoute {
                server_name: settings.csharp_server_name.clone(),
                content_type: settings.csharp_content_type.clone(),
            },
            html: KindRoute {
                server_name: settings.html_server_name.clone(),
                content_type: settings.html_content_type.clone(),
            },
            document_versions: DashMap::new(),
        }
    }

    /// Version last sent to `server_name` for `virtual_uri`, if open there.
    pub fn document_version(&self, server_name: &str, virtual_uri: &Url) -> Option<i32> {
        self.document_versions
            .get(&(server_name.to_string(), virtual_uri.clone()))
            .map(|v| *v)
    }

    fn route(&self, kind: VirtualDocumentKind) -> &KindRoute {
        match kind {
            VirtualDocumentKind::CSharp => &self.csharp,
            VirtualDocumentKind::Html => &self.html,
        }
    }

    fn targets(&self, kind: VirtualDocumentKind) -> Vec<Arc<dyn LanguageServerConnection>> {
        let route = self.route(kind);
        self.pool
            .all()
            .into_iter()
            .filter(|server| server.name() == route.server_name || server.serves(&route.content_type))
            .collect()
    }

    fn publish(&self, snapshot: &VirtualDocumentSnapshot) {
        for server in self.targets(snapshot.kind()) {
            let key = (server.name().to_string(), snapshot.uri().clone());
            let (method, params) = match self.document_versions.get_mut(&key) {
                Some(mut version) => {
                    *version += 1;
                    (
                        "textDocument/didChange",
                        json!({
                            "textDocument": { "uri": snapshot.uri(), "version": *version },
                            "contentChanges": [{ "text": snapshot.text() }],
                        }),
                    )
                }
                None => {
                    self.document_versions.insert(key.clone(), 1);
                    (
                        "textDocument/didOpen",
                        json!({
                            "textDocument": {
                                "uri": snapshot.uri(),
                                "languageId": snapshot.kind().language_id(),
                                "version": 1,
                                "text": snapshot.text(),
                            }
                        }),
                    )
                }
            };

            if let Err(e) = server.send_notification(method, params) {
                log::warn!(
                    target: LOG_TARGET,
                    "{} for {} to {} failed: {}",
                    method,
                    snapshot.uri(),
                    server.name(),
                    e
                );
                if method == "textDocument/didOpen" {
                    self.document_versions.remove(&key);
                }
            }
        }
    }

    fn close_all(&self, host_uri: &Url) {
        let virtual_uris: Vec<Url> = VirtualDocumentKind::ALL
            .iter()
            .map(|kind| crate::document::virtual_document_uri(host_uri, *kind))
            .collect();
        let opened: Vec<(String, Url)> = self
            .document_versions
            .iter()
            .filter(|entry| virtual_uris.contains(&entry.key().1))
            .map(|entry| entry.key().clone())
            .collect();

        for key in opened {
            self.document_versions.remove(&key);
            let (server_name, uri) = key;
            let Some(server) = self.pool.get(&server_name) else {
                continue;
            };
            if let Err(e) = server.send_notification(
                "textDocument/didClose",
                json!({ "textDocument": { "uri": uri } }),
            ) {
                log::warn!(
                    target: LOG_TARGET,
                    "didClose for {} to {} failed: {}",
                    uri,
                    server_name,
                    e
                );
            }
        }
    }
}

impl DocumentChangeListener for VirtualDocumentPublisher {
    fn changed(&self, event: &LspDocumentChangeEvent) {
        match event.kind {
            LspDocumentChangeKind::VirtualDocumentChanged => {
                if let Some(snapshot) = &event.virtual_new {
                    self.publish(snapshot);
                }
            }
            LspDocumentChangeKind::Removed => {
                if let Some(host_uri) = event.host_uri() {
                    self.close_all(host_uri);
                }
            }
            LspDocumentChangeKind::Added
            | LspDocumentChangeKind::HostVersionChanged
            | LspDocumentChangeKind::VirtualDocumentDesynchronized => {}
        }
    }
}
