//! Client for the Roslyn language server process
//!
//! Handles spawning, stdio JSON-RPC communication, and lifecycle of the
//! server. Requests issued for context refreshes are cancellable: observing
//! the token removes the pending entry, tells the server via
//! `$/cancelRequest`, and resolves to [`BridgeError::Cancelled`], so a
//! superseded request can never deliver a result.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time::timeout;
use url::Url;

use super::cancel::CancelToken;
use super::document::{language_id_for_path, DocumentTracker, DocumentUri};
use super::protocol::{
    error_codes, IdGenerator, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    JsonRpcResponseOut,
};
use super::types::*;
use crate::config::ServerConfig;
use crate::context::ProjectContextProvider;
use crate::error::{BridgeError, Result};
use crate::event::{EventEmitter, ServerState, ServerStateChange};

/// Pending request awaiting response
struct PendingRequest {
    tx: oneshot::Sender<Result<serde_json::Value>>,
}

/// Map a JSON-RPC error from the server onto the bridge taxonomy. A
/// cancelled request may race its own `$/cancelRequest` and come back as a
/// server-side error instead of being dropped locally.
fn rpc_error(code: i32, message: String) -> BridgeError {
    if code == error_codes::REQUEST_CANCELLED {
        BridgeError::Cancelled
    } else {
        BridgeError::Rpc { code, message }
    }
}

/// Client for a single Roslyn language server process.
pub struct RoslynClient {
    /// Server process handle
    process: Option<Child>,
    /// Channel to send outgoing frames to the writer task
    request_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    /// Pending requests by ID
    pending: Arc<RwLock<HashMap<i64, PendingRequest>>>,
    id_gen: IdGenerator,
    /// Workspace root URI
    root_uri: String,
    /// Workspace name for status events
    workspace_label: String,
    /// Handshake request timeout
    timeout_secs: u64,
    /// Whether server is initialized
    initialized: bool,
    /// Server capabilities
    capabilities: ServerCapabilities,
    /// Lifecycle state - shared with reader task
    server_state: Arc<RwLock<ServerState>>,
    /// Lifecycle events - shared with reader task
    events: EventEmitter<ServerStateChange>,
    /// didOpen/didClose bookkeeping
    documents: StdMutex<DocumentTracker>,
}

impl RoslynClient {
    /// Spawn the language server and run the initialize handshake.
    ///
    /// Lifecycle events go out on `events`; subscribe before calling this
    /// to observe the `Started` and `ProjectInitializationStarted`
    /// transitions the handshake itself produces.
    pub async fn spawn(
        config: &ServerConfig,
        workspace_root: &Path,
        events: EventEmitter<ServerStateChange>,
    ) -> Result<Self> {
        tracing::info!(
            "spawning language server: {} {:?} in {}",
            config.command,
            config.args,
            workspace_root.display()
        );

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .current_dir(workspace_root)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| BridgeError::Io(format!("failed to spawn {}: {}", config.command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::Io("failed to get stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Io("failed to get stdout".into()))?;

        let pending: Arc<RwLock<HashMap<i64, PendingRequest>>> =
            Arc::new(RwLock::new(HashMap::new()));
        let server_state = Arc::new(RwLock::new(ServerState::Stopped));

        let workspace_label = workspace_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| workspace_root.display().to_string());

        let (request_tx, request_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        // Reader task also needs request_tx to answer server-to-client requests.
        let pending_clone = pending.clone();
        let state_clone = server_state.clone();
        let events_clone = events.clone();
        let request_tx_clone = request_tx.clone();
        let label_clone = workspace_label.clone();
        tokio::spawn(async move {
            Self::reader_loop(
                stdout,
                pending_clone,
                state_clone,
                events_clone,
                request_tx_clone,
                label_clone,
            )
            .await;
        });

        tokio::spawn(async move {
            Self::writer_loop(stdin, request_rx).await;
        });

        let root_uri = Url::from_file_path(workspace_root)
            .map(String::from)
            .unwrap_or_else(|_| format!("file://{}", workspace_root.display()));

        let mut client = Self {
            process: Some(child),
            request_tx: Some(request_tx),
            pending,
            id_gen: IdGenerator::new(),
            root_uri,
            workspace_label,
            timeout_secs: config.timeout_secs,
            initialized: false,
            capabilities: ServerCapabilities::default(),
            server_state,
            events,
            documents: StdMutex::new(DocumentTracker::new()),
        };

        client.initialize(config.init_options.clone()).await?;

        client.set_state(ServerState::Started).await;
        // Roslyn starts loading projects right after the handshake; the
        // projectInitializationComplete notification ends this phase.
        client.set_state(ServerState::ProjectInitializationStarted).await;

        Ok(client)
    }

    async fn set_state(&self, state: ServerState) {
        *self.server_state.write().await = state;
        self.events.emit(ServerStateChange {
            state,
            workspace_label: self.workspace_label.clone(),
        });
    }

    /// Reader loop - decodes frames from the server's stdout
    async fn reader_loop(
        stdout: ChildStdout,
        pending: Arc<RwLock<HashMap<i64, PendingRequest>>>,
        server_state: Arc<RwLock<ServerState>>,
        events: EventEmitter<ServerStateChange>,
        request_tx: mpsc::UnboundedSender<Vec<u8>>,
        workspace_label: String,
    ) {
        let mut reader = BufReader::new(stdout);

        loop {
            // Read headers until empty line
            let mut content_length: Option<usize> = None;
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        tracing::debug!("language server reader: EOF");
                        return;
                    }
                    Ok(_) => {
                        if line.trim().is_empty() {
                            break;
                        }
                        if let Some(len) = super::protocol::content_length(&line) {
                            content_length = Some(len);
                        }
                    }
                    Err(e) => {
                        tracing::error!("language server reader error: {}", e);
                        return;
                    }
                }
            }

            let content_len = match content_length {
                Some(len) => len,
                None => {
                    tracing::warn!("message missing Content-Length header");
                    continue;
                }
            };

            let mut content = vec![0u8; content_len];
            if let Err(e) = reader.read_exact(&mut content).await {
                tracing::error!("failed to read message body: {}", e);
                continue;
            }

            // Server-to-client requests (id + method) need a response back.
            if let Ok(server_request) = serde_json::from_slice::<ServerRequest>(&content) {
                Self::handle_server_request(&server_request, &request_tx);
                continue;
            }

            // Response to one of our requests?
            if let Ok(response) = serde_json::from_slice::<JsonRpcResponse>(&content) {
                if let Some(id) = response.id {
                    let mut pending = pending.write().await;
                    if let Some(req) = pending.remove(&id) {
                        let result = response
                            .into_result()
                            .map_err(|e| rpc_error(e.code, e.message));
                        let _ = req.tx.send(result);
                    } else {
                        // Cancelled or timed-out request; already resolved locally.
                        tracing::debug!("response for unknown request id {}", id);
                    }
                    continue;
                }
            }

            match serde_json::from_slice::<IncomingNotification>(&content) {
                Ok(notification) => {
                    Self::handle_notification(&notification, &server_state, &events, &workspace_label)
                        .await;
                }
                Err(_) => {
                    tracing::warn!(
                        "unparseable message from server: {}",
                        String::from_utf8_lossy(&content[..content.len().min(200)])
                    );
                }
            }
        }
    }

    /// Handle server-to-client request (requires response)
    fn handle_server_request(request: &ServerRequest, request_tx: &mpsc::UnboundedSender<Vec<u8>>) {
        tracing::debug!("server request: {}", request.method);

        let response = match request.method.as_str() {
            "workspace/configuration" => {
                // One entry per requested item; we have no settings to give.
                let len = request
                    .params
                    .as_ref()
                    .and_then(|p| p.get("items"))
                    .and_then(|i| i.as_array())
                    .map(|a| a.len())
                    .unwrap_or(0);
                JsonRpcResponseOut::success(
                    request.id.clone(),
                    serde_json::Value::Array(vec![serde_json::Value::Null; len]),
                )
            }
            "window/workDoneProgress/create"
            | "client/registerCapability"
            | "window/showMessageRequest" => JsonRpcResponseOut::success_null(request.id.clone()),
            other => {
                // Respond anyway so the server is never left waiting.
                tracing::warn!("unknown server request: {}", other);
                JsonRpcResponseOut::success_null(request.id.clone())
            }
        };

        if let Ok(encoded) = response.encode() {
            let _ = request_tx.send(encoded);
        }
    }

    /// Handle incoming notification from server
    async fn handle_notification(
        notification: &IncomingNotification,
        server_state: &Arc<RwLock<ServerState>>,
        events: &EventEmitter<ServerStateChange>,
        workspace_label: &str,
    ) {
        match notification.method.as_str() {
            PROJECT_INITIALIZATION_COMPLETE => {
                tracing::info!("project initialization complete");
                *server_state.write().await = ServerState::ProjectInitializationComplete;
                events.emit(ServerStateChange {
                    state: ServerState::ProjectInitializationComplete,
                    workspace_label: workspace_label.to_string(),
                });
            }
            "window/logMessage" | "window/showMessage" => {
                if let Some(msg) = notification
                    .params
                    .as_ref()
                    .and_then(|p| p.get("message"))
                    .and_then(|v| v.as_str())
                {
                    tracing::debug!("server message: {}", msg);
                }
            }
            "textDocument/publishDiagnostics" => {
                tracing::trace!("diagnostics received");
            }
            "$/progress" => {
                tracing::trace!("progress notification");
            }
            other => {
                tracing::trace!("unhandled notification: {}", other);
            }
        }
    }

    /// Writer loop - writes frames to the server's stdin
    async fn writer_loop(mut stdin: ChildStdin, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) {
        while let Some(data) = rx.recv().await {
            if let Err(e) = stdin.write_all(&data).await {
                tracing::error!("language server writer error: {}", e);
                break;
            }
            if let Err(e) = stdin.flush().await {
                tracing::error!("language server flush error: {}", e);
                break;
            }
        }
        tracing::debug!("language server writer loop ended");
    }

    /// Encode a request, register it in the pending map, and hand it to the
    /// writer. The caller decides how to wait.
    async fn issue_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(i64, oneshot::Receiver<Result<serde_json::Value>>)> {
        let tx = self.request_tx.as_ref().ok_or(BridgeError::NotRunning)?;

        let id = self.id_gen.next();
        let request = JsonRpcRequest::new(id, method, params);
        let encoded = request
            .encode()
            .map_err(|e| BridgeError::Parse(e.to_string()))?;

        let (response_tx, response_rx) = oneshot::channel();
        self.pending
            .write()
            .await
            .insert(id, PendingRequest { tx: response_tx });

        tx.send(encoded)
            .map_err(|e| BridgeError::Channel(e.to_string()))?;

        Ok((id, response_rx))
    }

    /// Send a request and wait with the configured timeout.
    async fn send_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let (_id, response_rx) = self.issue_request(method, params).await?;

        timeout(Duration::from_secs(self.timeout_secs), response_rx)
            .await
            .map_err(|_| BridgeError::Timeout(self.timeout_secs))?
            .map_err(|_| BridgeError::Channel("response channel closed".into()))?
    }

    /// Send a request that waits until the server answers or the token
    /// fires. No timeout: a hung request stalls until superseded.
    async fn send_request_cancellable(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        mut token: CancelToken,
    ) -> Result<serde_json::Value> {
        if token.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }

        let (id, response_rx) = self.issue_request(method, params).await?;

        tokio::select! {
            response = response_rx => {
                response.map_err(|_| BridgeError::Channel("response channel closed".into()))?
            }
            _ = token.cancelled() => {
                self.pending.write().await.remove(&id);
                let _ = self.send_notification_raw(JsonRpcNotification::cancel(id));
                Err(BridgeError::Cancelled)
            }
        }
    }

    /// Send a notification (no response expected)
    async fn send_notification(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<()> {
        self.send_notification_raw(JsonRpcNotification::new(method, params))
    }

    fn send_notification_raw(&self, notification: JsonRpcNotification) -> Result<()> {
        let tx = self.request_tx.as_ref().ok_or(BridgeError::NotRunning)?;
        let encoded = notification
            .encode()
            .map_err(|e| BridgeError::Parse(e.to_string()))?;
        tx.send(encoded)
            .map_err(|e| BridgeError::Channel(e.to_string()))
    }

    /// Initialize the server
    async fn initialize(&mut self, init_options: serde_json::Value) -> Result<()> {
        let params = serde_json::json!({
            "processId": std::process::id(),
            "rootUri": self.root_uri,
            "capabilities": {
                "textDocument": {
                    "synchronization": { "didSave": false }
                },
                "workspace": {
                    "workspaceFolders": false
                }
            },
            "initializationOptions": init_options
        });

        tracing::debug!("sending initialize");
        let result = self.send_request("initialize", Some(params)).await?;

        if let Ok(init_result) = serde_json::from_value::<InitializeResult>(result) {
            self.capabilities = init_result.capabilities;
            if let Some(info) = init_result.server_info {
                tracing::info!(
                    "language server initialized: {} {}",
                    info.name,
                    info.version.unwrap_or_default()
                );
            }
        }

        self.send_notification("initialized", Some(serde_json::json!({})))
            .await?;
        self.initialized = true;

        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    pub fn workspace_label(&self) -> &str {
        &self.workspace_label
    }

    pub async fn server_state(&self) -> ServerState {
        *self.server_state.read().await
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe_server_events(
        &self,
    ) -> tokio::sync::broadcast::Receiver<ServerStateChange> {
        self.events.subscribe()
    }

    // ========== Project Contexts ==========

    /// textDocument/_vs_getProjectContexts
    pub async fn project_contexts(
        &self,
        document: &DocumentUri,
        token: CancelToken,
    ) -> Result<ProjectContextList> {
        if !self.initialized {
            return Err(BridgeError::NotInitialized);
        }

        let params = GetProjectContextsParams {
            text_document: TextDocumentIdentifier::new(document.as_str()),
        };
        let params = serde_json::to_value(params).map_err(|e| BridgeError::Parse(e.to_string()))?;

        let result = self
            .send_request_cancellable(GET_PROJECT_CONTEXTS, Some(params), token)
            .await?;

        serde_json::from_value(result).map_err(|e| BridgeError::Parse(e.to_string()))
    }

    // ========== Document Sync ==========

    /// Open a document on the server (textDocument/didOpen). Idempotent.
    pub async fn open_document(&self, path: &Path, text: &str) -> Result<DocumentUri> {
        let uri = DocumentUri::from_path(path)?;
        let language_id = language_id_for_path(path);

        {
            let mut docs = self.documents.lock().unwrap();
            if docs.is_open(&uri) {
                return Ok(uri);
            }
            docs.mark_open(&uri, language_id, text);
        }

        let params = serde_json::json!({
            "textDocument": {
                "uri": uri.as_str(),
                "languageId": language_id,
                "version": 1,
                "text": text
            }
        });
        self.send_notification("textDocument/didOpen", Some(params))
            .await?;

        Ok(uri)
    }

    /// Push changed content (textDocument/didChange, full sync). A no-op
    /// when the content matches what the server already has.
    pub async fn change_document(&self, uri: &DocumentUri, text: &str) -> Result<()> {
        let version = {
            let mut docs = self.documents.lock().unwrap();
            if !docs.needs_sync(uri, text) {
                return Ok(());
            }
            match docs.update_version(uri, text) {
                Some(version) => version,
                None => {
                    tracing::warn!("didChange for document that is not open: {}", uri);
                    return Ok(());
                }
            }
        };

        let params = serde_json::json!({
            "textDocument": { "uri": uri.as_str(), "version": version },
            "contentChanges": [{ "text": text }]
        });
        self.send_notification("textDocument/didChange", Some(params))
            .await
    }

    /// Close a document on the server (textDocument/didClose).
    pub async fn close_document(&self, uri: &DocumentUri) -> Result<()> {
        {
            let mut docs = self.documents.lock().unwrap();
            if !docs.is_open(uri) {
                return Ok(());
            }
            docs.mark_closed(uri);
        }

        let params = serde_json::json!({
            "textDocument": { "uri": uri.as_str() }
        });
        self.send_notification("textDocument/didClose", Some(params))
            .await
    }

    /// Whether a document is currently open on the server.
    pub fn is_document_open(&self, uri: &DocumentUri) -> bool {
        self.documents.lock().unwrap().is_open(uri)
    }

    // ========== Lifecycle ==========

    /// Shutdown the server gracefully
    pub async fn shutdown(&mut self) -> Result<()> {
        if !self.initialized {
            return Ok(());
        }

        tracing::info!("shutting down language server");

        let _ = self.send_request("shutdown", None).await;
        let _ = self.send_notification("exit", None).await;

        self.request_tx = None;

        if let Some(mut process) = self.process.take() {
            let _ = process.kill().await;
        }

        self.initialized = false;
        self.documents.lock().unwrap().clear();
        self.set_state(ServerState::Stopped).await;
        Ok(())
    }

    /// Check if the server process is still reachable
    pub fn is_running(&self) -> bool {
        self.request_tx.is_some()
    }
}

impl Drop for RoslynClient {
    fn drop(&mut self) {
        // Best-effort cleanup - can't do async in Drop
        if let Some(mut process) = self.process.take() {
            let _ = process.start_kill();
        }
    }
}

#[async_trait]
impl ProjectContextProvider for RoslynClient {
    async fn project_contexts(
        &self,
        uri: &DocumentUri,
        token: CancelToken,
    ) -> Result<ProjectContextList> {
        RoslynClient::project_contexts(self, uri, token).await
    }
}
