//! In-process language servers for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use razor_bridge::BridgeSettings;
use razor_bridge::bridge::LanguageServerConnection;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Answers requests from a per-method table and records everything it gets.
pub struct FakeServer {
    name: String,
    content_types: Vec<String>,
    capabilities: Value,
    responses: Mutex<HashMap<String, Value>>,
    requests: Mutex<Vec<(String, Value)>>,
    notifications: Mutex<Vec<(String, Value)>>,
    /// Methods of requests and notifications together, in arrival order.
    received: Mutex<Vec<String>>,
}

impl FakeServer {
    pub fn new(name: &str, content_types: &[&str], capabilities: Value) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            content_types: content_types.iter().map(|ct| ct.to_string()).collect(),
            capabilities,
            responses: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn respond(&self, method: &str, result: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(method.to_string(), result);
    }

    /// Params of every `method` request received, in order.
    pub fn requests(&self, method: &str) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every method received, requests and notifications interleaved as
    /// they arrived.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    pub fn notifications(&self, method: &str) -> Vec<Value> {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }
}

#[async_trait]
impl LanguageServerConnection for FakeServer {
    fn name(&self) -> &str {
        &self.name
    }

    fn content_types(&self) -> &[String] {
        &self.content_types
    }

    fn capabilities(&self) -> Value {
        self.capabilities.clone()
    }

    async fn send_request(
        &self,
        method: &str,
        params: Value,
        _cancel: &CancellationToken,
    ) -> io::Result<Value> {
        self.received.lock().unwrap().push(method.to_string());
        self.requests
            .lock()
            .unwrap()
            .push((method.to_string(), params));
        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(method)
            .cloned()
            .unwrap_or(Value::Null))
    }

    fn send_notification(&self, method: &str, params: Value) -> io::Result<()> {
        self.received.lock().unwrap().push(method.to_string());
        self.notifications
            .lock()
            .unwrap()
            .push((method.to_string(), params));
        Ok(())
    }
}

/// Default settings with a short synchronization timeout.
pub fn test_settings() -> BridgeSettings {
    let mut settings = BridgeSettings::default();
    settings.synchronization.timeout_ms = 200;
    settings
}

/// Poll `condition` until it holds or a second has passed.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 1s");
}
