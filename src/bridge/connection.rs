//! The seam between the bridge and a language server process.

use std::io;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower_lsp_server::jsonrpc;

/// One language server reachable over JSON-RPC.
///
/// [`StdioConnection`](super::StdioConnection) is the production
/// implementation; tests substitute in-process fakes.
#[async_trait]
pub trait LanguageServerConnection: Send + Sync {
    /// Unique server name, used for single-target delegation and priorities.
    fn name(&self) -> &str;

    /// Content types served, used for multi-server fan-out.
    fn content_types(&self) -> &[String];

    /// `ServerCapabilities` returned by `initialize`, as raw JSON.
    ///
    /// `Value::Null` until the handshake completes.
    fn capabilities(&self) -> Value;

    /// Send a request and wait for its result.
    ///
    /// Cancelling `cancel` abandons the request; implementations forward
    /// `$/cancelRequest` and return [`io::ErrorKind::Interrupted`].
    async fn send_request(
        &self,
        method: &str,
        params: Value,
        cancel: &CancellationToken,
    ) -> io::Result<Value>;

    /// Queue a notification. Notifications to one server keep their order.
    fn send_notification(&self, method: &str, params: Value) -> io::Result<()>;

    fn serves(&self, content_type: &str) -> bool {
        self.content_types().iter().any(|ct| ct == content_type)
    }
}

/// Handles messages a language server sends to us.
///
/// Requests may run concurrently. Notifications are awaited in arrival order
/// before the next message is read, so their side effects are ordered.
#[async_trait]
pub trait IncomingMessageHandler: Send + Sync {
    async fn handle_request(
        &self,
        method: &str,
        params: Value,
        cancel: CancellationToken,
    ) -> jsonrpc::Result<Value>;

    async fn handle_notification(&self, method: &str, params: Value);
}
