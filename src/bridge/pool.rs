//! Registry of downstream language servers.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use indexmap::IndexMap;
use serde_json::Value;

use super::connection::LanguageServerConnection;

const LOG_TARGET: &str = "razor_bridge::bridge";

/// Named downstream servers, in registration order.
#[derive(Default)]
pub struct LanguageServerPool {
    servers: RwLock<IndexMap<String, Arc<dyn LanguageServerConnection>>>,
}

impl LanguageServerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a server, replacing any server registered under the same name.
    pub fn register(&self, server: Arc<dyn LanguageServerConnection>) {
        let name = server.name().to_string();
        log::debug!(
            target: LOG_TARGET,
            "Registering server {} for {:?}",
            name,
            server.content_types()
        );
        if self.write().insert(name.clone(), server).is_some() {
            log::warn!(target: LOG_TARGET, "Replaced existing server {}", name);
        }
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn LanguageServerConnection>> {
        self.write().shift_remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn LanguageServerConnection>> {
        self.read().get(name).cloned()
    }

    pub fn all(&self) -> Vec<Arc<dyn LanguageServerConnection>> {
        self.read().values().cloned().collect()
    }

    /// Servers handling `content_type` whose capabilities satisfy `predicate`.
    ///
    /// Servers without the capability are silently left out.
    pub fn servers_for(
        &self,
        content_type: &str,
        predicate: impl Fn(&Value) -> bool,
    ) -> Vec<Arc<dyn LanguageServerConnection>> {
        self.read()
            .values()
            .filter(|server| server.serves(content_type))
            .filter(|server| {
                let eligible = predicate(&server.capabilities());
                if !eligible {
                    log::debug!(
                        target: LOG_TARGET,
                        "Skipping {}: capability not advertised",
                        server.name()
                    );
                }
                eligible
            })
            .cloned()
            .collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexMap<String, Arc<dyn LanguageServerConnection>>> {
        match self.servers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<String, Arc<dyn LanguageServerConnection>>> {
        match self.servers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
