//! Agent-side connection: inbound method binding plus outbound client calls.
//!
//! [`AgentSideConnection`] routes the client-initiated methods to an
//! [`Agent`] implementation and wraps the agent-initiated methods as thin
//! request/notification calls on the underlying [`Session`]. File-system and
//! terminal calls are pre-flight checked against the capability snapshot
//! captured at `initialize`, so a declared-unsupported call fails locally
//! without touching the transport.

use std::sync::{Arc, Weak};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::agent::Agent;
use super::context::PromptContext;
use super::types::{
    CancelNotification, CreateTerminalRequest, CreateTerminalResponse, InitializeRequest,
    LoadSessionRequest, NewSessionRequest, PromptRequest, ReadTextFileRequest,
    ReadTextFileResponse, RequestPermissionRequest, RequestPermissionResponse,
    SessionNotification, TerminalExitStatus, TerminalOutputResponse, TerminalRequest,
    WriteTextFileRequest,
};
use crate::rpc::envelope::RpcError;
use crate::session::capabilities::{CapabilitySnapshot, ClientCapabilities};
use crate::session::{NotificationHandler, RequestHandler, Session, SessionConfig};
use crate::transport::Transport;
use crate::worker::WorkerPool;
use crate::Result;

/// One agent-side ACP connection over one protocol session.
pub struct AgentSideConnection {
    session: Arc<Session>,
    agent: Arc<dyn Agent>,
    capabilities: CapabilitySnapshot,
}

impl AgentSideConnection {
    /// Create a connection serving `agent` and bind its method handlers.
    #[must_use]
    pub fn new(
        agent: Arc<dyn Agent>,
        config: SessionConfig,
        pool: Arc<dyn WorkerPool>,
    ) -> Arc<Self> {
        let conn = Arc::new(Self {
            session: Session::new(config, pool),
            agent,
            capabilities: CapabilitySnapshot::new(),
        });
        conn.bind_handlers();
        conn
    }

    /// The underlying session.
    #[must_use]
    pub fn session(&self) -> Arc<Session> {
        Arc::clone(&self.session)
    }

    /// The capability snapshot captured at `initialize`, when negotiated.
    #[must_use]
    pub fn client_capabilities(&self) -> Option<&ClientCapabilities> {
        self.capabilities.get()
    }

    /// Start `transport` with this connection as dispatcher and attach it to
    /// the session.
    ///
    /// # Errors
    ///
    /// Propagates the transport's start failure.
    pub async fn start(&self, transport: Arc<dyn Transport>) -> Result<()> {
        transport.start(self.session()).await?;
        self.session.attach(transport);
        Ok(())
    }

    // ── Outbound client calls ─────────────────────────────────────────────────

    /// Send a `session/update` streaming notification.
    ///
    /// # Errors
    ///
    /// Propagates the session's notification send failure.
    pub async fn session_update(&self, notification: SessionNotification) -> Result<()> {
        self.session
            .send_notification("session/update", Some(serde_json::to_value(notification)?))
            .await
    }

    /// Ask the user to approve a tool call.
    ///
    /// # Errors
    ///
    /// Propagates the request's typed outcome.
    pub async fn request_permission(
        &self,
        request: RequestPermissionRequest,
    ) -> Result<RequestPermissionResponse> {
        self.session
            .send_request(
                "session/request_permission",
                Some(serde_json::to_value(request)?),
            )
            .await
    }

    /// Read a text file through the client.
    ///
    /// # Errors
    ///
    /// [`ConduitError::CapabilityDenied`](crate::ConduitError::CapabilityDenied)
    /// when the client declared `fs.readTextFile` unsupported; otherwise the
    /// request's typed outcome.
    pub async fn read_text_file(
        &self,
        request: ReadTextFileRequest,
    ) -> Result<ReadTextFileResponse> {
        self.capabilities
            .gate("fs.readTextFile", |c| c.fs.read_text_file)?;
        self.session
            .send_request("fs/readTextFile", Some(serde_json::to_value(request)?))
            .await
    }

    /// Write a text file through the client.
    ///
    /// # Errors
    ///
    /// [`ConduitError::CapabilityDenied`](crate::ConduitError::CapabilityDenied)
    /// when the client declared `fs.writeTextFile` unsupported; otherwise the
    /// request's typed outcome.
    pub async fn write_text_file(&self, request: WriteTextFileRequest) -> Result<()> {
        self.capabilities
            .gate("fs.writeTextFile", |c| c.fs.write_text_file)?;
        let _: Value = self
            .session
            .send_request("fs/writeTextFile", Some(serde_json::to_value(request)?))
            .await?;
        Ok(())
    }

    /// Start a command in a client-owned terminal.
    ///
    /// # Errors
    ///
    /// [`ConduitError::CapabilityDenied`](crate::ConduitError::CapabilityDenied)
    /// when the client declared `terminal` unsupported; otherwise the
    /// request's typed outcome.
    pub async fn create_terminal(
        &self,
        request: CreateTerminalRequest,
    ) -> Result<CreateTerminalResponse> {
        self.terminal_request("terminal/create", request).await
    }

    /// Read the output captured by a terminal so far.
    ///
    /// # Errors
    ///
    /// Same contract as [`create_terminal`](Self::create_terminal).
    pub async fn terminal_output(&self, request: TerminalRequest) -> Result<TerminalOutputResponse> {
        self.terminal_request("terminal/output", request).await
    }

    /// Wait until a terminal's command exits.
    ///
    /// # Errors
    ///
    /// Same contract as [`create_terminal`](Self::create_terminal).
    pub async fn wait_for_terminal_exit(
        &self,
        request: TerminalRequest,
    ) -> Result<TerminalExitStatus> {
        self.terminal_request("terminal/waitForExit", request).await
    }

    /// Release a terminal and its retained output.
    ///
    /// # Errors
    ///
    /// Same contract as [`create_terminal`](Self::create_terminal).
    pub async fn release_terminal(&self, request: TerminalRequest) -> Result<()> {
        let _: Value = self.terminal_request("terminal/release", request).await?;
        Ok(())
    }

    /// Kill a terminal's command without releasing the terminal.
    ///
    /// # Errors
    ///
    /// Same contract as [`create_terminal`](Self::create_terminal).
    pub async fn kill_terminal(&self, request: TerminalRequest) -> Result<()> {
        let _: Value = self.terminal_request("terminal/kill", request).await?;
        Ok(())
    }

    async fn terminal_request<P: serde::Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        request: P,
    ) -> Result<T> {
        self.capabilities.gate("terminal", |c| c.terminal)?;
        self.session
            .send_request(method, Some(serde_json::to_value(request)?))
            .await
    }

    // ── Inbound method binding ────────────────────────────────────────────────

    fn bind_handlers(self: &Arc<Self>) {
        self.session
            .on_request("initialize", with_conn(self, |conn, params| async move {
                let request: InitializeRequest = parse_params(params)?;
                // The snapshot must exist before the response goes out, so
                // gated calls issued right after initialize see it.
                if !conn.capabilities.capture(request.client_capabilities.clone()) {
                    debug!("repeat initialize keeps the first capability snapshot");
                }
                let response = conn.agent.initialize(request).await?;
                to_result(&response)
            }));
        self.session
            .on_request("authenticate", with_conn(self, |conn, params| async move {
                conn.agent.authenticate(parse_params(params)?).await?;
                Ok(Value::Null)
            }));
        self.session
            .on_request("session/new", with_conn(self, |conn, params| async move {
                let request: NewSessionRequest = parse_params(params)?;
                let response = conn.agent.new_session(request).await?;
                to_result(&response)
            }));
        self.session
            .on_request("session/load", with_conn(self, |conn, params| async move {
                let request: LoadSessionRequest = parse_params(params)?;
                conn.agent.load_session(request).await?;
                Ok(Value::Null)
            }));
        self.session
            .on_request("session/prompt", with_conn(self, |conn, params| async move {
                let request: PromptRequest = parse_params(params)?;
                let cx = PromptContext::new(Arc::clone(&conn), request.session_id.clone());
                let response = conn.agent.prompt(request, cx).await?;
                to_result(&response)
            }));
        self.session
            .on_request("session/setMode", with_conn(self, |conn, params| async move {
                conn.agent.set_session_mode(parse_params(params)?).await?;
                Ok(Value::Null)
            }));
        self.session
            .on_request("session/setModel", with_conn(self, |conn, params| async move {
                conn.agent.set_session_model(parse_params(params)?).await?;
                Ok(Value::Null)
            }));
        self.session
            .on_notification("session/cancel", cancel_handler(self));
    }
}

/// Build a request handler holding a weak connection reference, so the
/// handler table on the session does not keep the connection alive.
fn with_conn<F, Fut>(conn: &Arc<AgentSideConnection>, f: F) -> RequestHandler
where
    F: Fn(Arc<AgentSideConnection>, Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = std::result::Result<Value, RpcError>> + Send + 'static,
{
    let weak: Weak<AgentSideConnection> = Arc::downgrade(conn);
    Arc::new(move |params| {
        let fut = weak.upgrade().map(|conn| f(conn, params));
        Box::pin(async move {
            match fut {
                Some(fut) => fut.await,
                None => Err(RpcError::internal("connection shut down")),
            }
        })
    })
}

fn cancel_handler(conn: &Arc<AgentSideConnection>) -> NotificationHandler {
    let weak = Arc::downgrade(conn);
    Arc::new(move |params| {
        let conn = weak.upgrade();
        Box::pin(async move {
            let Some(conn) = conn else { return };
            match parse_params::<CancelNotification>(params) {
                Ok(notification) => conn.agent.cancel(notification).await,
                Err(e) => debug!(error = %e.message, "malformed session/cancel dropped"),
            }
        })
    })
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> std::result::Result<T, RpcError> {
    serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| RpcError::invalid_params(e.to_string()))
}

fn to_result<T: serde::Serialize>(value: &T) -> std::result::Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal(e.to_string()))
}
