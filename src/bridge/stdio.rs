//! JSON-RPC connection to a language server over stdio.
//!
//! One writer task owns the output stream and drains an unbounded queue, so
//! sends never block and keep FIFO order. One reader task routes responses to
//! their waiting requests, spawns a task per incoming request, and awaits
//! incoming notifications inline so their effects land in arrival order.

use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tower_lsp_server::jsonrpc;

use super::connection::{IncomingMessageHandler, LanguageServerConnection};
use super::transport::{read_message, write_message};
use crate::config::ServerConfig;

const LOG_TARGET: &str = "razor_bridge::bridge";

type PendingRequests = DashMap<i64, oneshot::Sender<Result<Value, Value>>>;

pub struct StdioConnection {
    name: String,
    content_types: Vec<String>,
    capabilities: RwLock<Value>,
    next_id: AtomicI64,
    pending: Arc<PendingRequests>,
    outgoing: mpsc::UnboundedSender<Value>,
    child: Mutex<Option<Child>>,
}

impl StdioConnection {
    /// Launch `config.cmd` and connect to its stdio.
    pub fn spawn(
        name: impl Into<String>,
        config: &ServerConfig,
        handler: Arc<dyn IncomingMessageHandler>,
    ) -> io::Result<Arc<Self>> {
        let name = name.into();
        let (program, args) = config.cmd.split_first().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("empty command for server {name}"),
            )
        })?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("child stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("child stdout not captured"))?;

        log::info!(target: LOG_TARGET, "Started {} ({})", name, program);
        let connection = Self::connect(name, config.content_types.clone(), stdout, stdin, handler);
        if let Ok(mut slot) = connection.child.lock() {
            *slot = Some(child);
        }
        Ok(connection)
    }

    /// Connect over an arbitrary byte stream pair.
    pub fn connect<R, W>(
        name: impl Into<String>,
        content_types: Vec<String>,
        reader: R,
        writer: W,
        handler: Arc<dyn IncomingMessageHandler>,
    ) -> Arc<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let name = name.into();
        let (outgoing, rx) = mpsc::unbounded_channel();
        let pending: Arc<PendingRequests> = Arc::new(DashMap::new());

        tokio::spawn(run_writer(name.clone(), writer, rx));
        tokio::spawn(run_reader(
            name.clone(),
            BufReader::new(reader),
            pending.clone(),
            outgoing.clone(),
            handler,
        ));

        Arc::new(Self {
            name,
            content_types,
            capabilities: RwLock::new(Value::Null),
            next_id: AtomicI64::new(1),
            pending,
            outgoing,
            child: Mutex::new(None),
        })
    }

    /// Run the `initialize` handshake and record the server's capabilities.
    pub async fn initialize(&self, params: Value) -> io::Result<Value> {
        let result = self
            .send_request("initialize", params, &CancellationToken::new())
            .await?;
        let capabilities = result.get("capabilities").cloned().unwrap_or(Value::Null);
        match self.capabilities.write() {
            Ok(mut guard) => *guard = capabilities,
            Err(poisoned) => *poisoned.into_inner() = capabilities,
        }
        self.send_notification("initialized", json!({}))?;
        log::debug!(target: LOG_TARGET, "{} initialized", self.name);
        Ok(result)
    }

    /// Polite `shutdown` + `exit`.
    pub async fn shutdown(&self) -> io::Result<()> {
        self.send_request("shutdown", Value::Null, &CancellationToken::new())
            .await?;
        self.send_notification("exit", Value::Null)
    }

    fn enqueue(&self, message: Value) -> io::Result<()> {
        self.outgoing
            .send(message)
            .map_err(|_| connection_closed(&self.name))
    }
}

#[async_trait]
impl LanguageServerConnection for StdioConnection {
    fn name(&self) -> &str {
        &self.name
    }

    fn content_types(&self) -> &[String] {
        &self.content_types
    }

    fn capabilities(&self) -> Value {
        match self.capabilities.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn send_request(
        &self,
        method: &str,
        params: Value,
        cancel: &CancellationToken,
    ) -> io::Result<Value> {
        if cancel.is_cancelled() {
            return Err(interrupted(method));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        let _guard = AbandonGuard {
            pending: &self.pending,
            outgoing: &self.outgoing,
            id,
        };

        self.enqueue(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::debug!(target: LOG_TARGET, "{} request {} ({}) cancelled", self.name, id, method);
                Err(interrupted(method))
            }
            response = rx => match response {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(error)) => Err(io::Error::other(format!(
                    "{} failed {}: {}",
                    self.name,
                    method,
                    error.get("message").and_then(Value::as_str).unwrap_or("unknown error")
                ))),
                Err(_) => Err(connection_closed(&self.name)),
            },
        }
    }

    fn send_notification(&self, method: &str, params: Value) -> io::Result<()> {
        self.enqueue(json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        }))
    }
}

/// Forwards `$/cancelRequest` when a request is dropped before its response.
struct AbandonGuard<'a> {
    pending: &'a PendingRequests,
    outgoing: &'a mpsc::UnboundedSender<Value>,
    id: i64,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        // The reader removes the entry when a response arrives.
        if self.pending.remove(&self.id).is_some() {
            let _ = self.outgoing.send(json!({
                "jsonrpc": "2.0",
                "method": "$/cancelRequest",
                "params": { "id": self.id },
            }));
        }
    }
}

fn interrupted(method: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Interrupted, format!("{method} cancelled"))
}

fn connection_closed(name: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::BrokenPipe,
        format!("connection to {name} closed"),
    )
}

async fn run_writer<W>(name: String, mut writer: W, mut rx: mpsc::UnboundedReceiver<Value>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = rx.recv().await {
        if let Err(e) = write_message(&mut writer, &message).await {
            log::error!(target: LOG_TARGET, "Write to {} failed: {}", name, e);
            break;
        }
    }
}

async fn run_reader<R>(
    name: String,
    mut reader: BufReader<R>,
    pending: Arc<PendingRequests>,
    outgoing: mpsc::UnboundedSender<Value>,
    handler: Arc<dyn IncomingMessageHandler>,
) where
    R: AsyncRead + Unpin,
{
    let incoming: Arc<DashMap<String, CancellationToken>> = Arc::new(DashMap::new());

    loop {
        let message = match read_message(&mut reader).await {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(e) => {
                log::error!(target: LOG_TARGET, "Read from {} failed: {}", name, e);
                break;
            }
        };

        let id = message.get("id").cloned();
        let method = message.get("method").and_then(Value::as_str).map(str::to_string);
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        match (method, id) {
            (Some(method), Some(id)) => {
                let token = CancellationToken::new();
                let key = id.to_string();
                incoming.insert(key.clone(), token.clone());
                let handler = handler.clone();
                let outgoing = outgoing.clone();
                let incoming = incoming.clone();
                tokio::spawn(async move {
                    let result = handler.handle_request(&method, params, token).await;
                    incoming.remove(&key);
                    let response = match result {
                        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
                        Err(error) => json!({ "jsonrpc": "2.0", "id": id, "error": error }),
                    };
                    let _ = outgoing.send(response);
                });
            }
            (Some(method), None) if method == "$/cancelRequest" => {
                if let Some(id) = params.get("id")
                    && let Some((_, token)) = incoming.remove(&id.to_string())
                {
                    token.cancel();
                }
            }
            (Some(method), None) => handler.handle_notification(&method, params).await,
            (None, Some(id)) => {
                let Some(id) = id.as_i64() else {
                    log::warn!(target: LOG_TARGET, "{} sent response with foreign id {}", name, id);
                    continue;
                };
                let Some((_, tx)) = pending.remove(&id) else {
                    log::debug!(target: LOG_TARGET, "{} answered abandoned request {}", name, id);
                    continue;
                };
                let outcome = match message.get("error") {
                    Some(error) => Err(error.clone()),
                    None => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
                };
                let _ = tx.send(outcome);
            }
            (None, None) => {
                log::warn!(target: LOG_TARGET, "{} sent malformed message", name);
            }
        }
    }

    log::info!(target: LOG_TARGET, "Connection to {} closed", name);
    // Dropping the senders fails every outstanding request.
    pending.clear();
    for entry in incoming.iter() {
        entry.value().cancel();
    }
}

/// Answers the handful of client requests C# and HTML servers make.
#[derive(Debug, Default)]
pub struct DownstreamMessageHandler;

#[async_trait]
impl IncomingMessageHandler for DownstreamMessageHandler {
    async fn handle_request(
        &self,
        method: &str,
        params: Value,
        _cancel: CancellationToken,
    ) -> jsonrpc::Result<Value> {
        match method {
            "workspace/configuration" => {
                let items = params
                    .get("items")
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                Ok(Value::Array(vec![Value::Null; items]))
            }
            "window/workDoneProgress/create"
            | "client/registerCapability"
            | "client/unregisterCapability" => Ok(Value::Null),
            "workspace/applyEdit" => Ok(json!({ "applied": false })),
            _ => Err(jsonrpc::Error::method_not_found()),
        }
    }

    async fn handle_notification(&self, method: &str, params: Value) {
        if method == "window/logMessage"
            && let Some(message) = params.get("message").and_then(Value::as_str)
        {
            log::debug!(target: LOG_TARGET, "downstream: {}", message);
        }
    }
}
