//! Session-scoped context handed to the agent's prompt handler.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use super::connection::AgentSideConnection;
use super::types::{
    ContentBlock, CreateTerminalRequest, CreateTerminalResponse, PermissionOption,
    ReadTextFileRequest, ReadTextFileResponse, RequestPermissionRequest,
    RequestPermissionResponse, SessionNotification, SessionUpdate, TerminalExitStatus,
    TerminalOutputResponse, TerminalRequest, WriteTextFileRequest,
};
use crate::Result;

/// Output of a run-to-completion command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured combined output.
    pub output: String,
    /// Whether the output was truncated by the byte limit.
    pub truncated: bool,
    /// How the command exited.
    pub exit_status: TerminalExitStatus,
}

/// Client operations scoped to one prompt turn's session.
///
/// Every call is a thin wrapper over the owning
/// [`AgentSideConnection`] with the session id filled in; the connection's
/// capability gates apply unchanged.
#[derive(Clone)]
pub struct PromptContext {
    conn: Arc<AgentSideConnection>,
    session_id: String,
}

impl PromptContext {
    pub(crate) fn new(conn: Arc<AgentSideConnection>, session_id: String) -> Self {
        Self { conn, session_id }
    }

    /// The session this turn belongs to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Stream one update to the client.
    ///
    /// # Errors
    ///
    /// Propagates the notification send failure.
    pub async fn send_update(&self, update: SessionUpdate) -> Result<()> {
        self.conn
            .session_update(SessionNotification {
                session_id: self.session_id.clone(),
                update,
            })
            .await
    }

    /// Stream a chunk of visible agent text.
    ///
    /// # Errors
    ///
    /// Propagates the notification send failure.
    pub async fn send_message(&self, text: impl Into<String>) -> Result<()> {
        self.send_update(SessionUpdate::AgentMessageChunk {
            content: ContentBlock::Text { text: text.into() },
        })
        .await
    }

    /// Stream a chunk of agent reasoning.
    ///
    /// # Errors
    ///
    /// Propagates the notification send failure.
    pub async fn send_thought(&self, text: impl Into<String>) -> Result<()> {
        self.send_update(SessionUpdate::AgentThoughtChunk {
            content: ContentBlock::Text { text: text.into() },
        })
        .await
    }

    /// Ask the user to approve a tool call.
    ///
    /// # Errors
    ///
    /// Propagates the request's typed outcome.
    pub async fn request_permission(
        &self,
        tool_call: Value,
        options: Vec<PermissionOption>,
    ) -> Result<RequestPermissionResponse> {
        self.conn
            .request_permission(RequestPermissionRequest {
                session_id: self.session_id.clone(),
                tool_call,
                options,
            })
            .await
    }

    /// Read a text file through the client.
    ///
    /// # Errors
    ///
    /// Capability-gated; see
    /// [`AgentSideConnection::read_text_file`].
    pub async fn read_text_file(
        &self,
        path: impl Into<String>,
        line: Option<u32>,
        limit: Option<u32>,
    ) -> Result<ReadTextFileResponse> {
        self.conn
            .read_text_file(ReadTextFileRequest {
                session_id: self.session_id.clone(),
                path: path.into(),
                line,
                limit,
            })
            .await
    }

    /// Write a text file through the client.
    ///
    /// # Errors
    ///
    /// Capability-gated; see
    /// [`AgentSideConnection::write_text_file`].
    pub async fn write_text_file(
        &self,
        path: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<()> {
        self.conn
            .write_text_file(WriteTextFileRequest {
                session_id: self.session_id.clone(),
                path: path.into(),
                content: content.into(),
            })
            .await
    }

    /// Start a command in a client-owned terminal.
    ///
    /// # Errors
    ///
    /// Capability-gated; see
    /// [`AgentSideConnection::create_terminal`].
    pub async fn create_terminal(
        &self,
        request: CreateTerminalRequest,
    ) -> Result<CreateTerminalResponse> {
        self.conn.create_terminal(request).await
    }

    /// Read the output a terminal captured so far.
    ///
    /// # Errors
    ///
    /// Capability-gated; see
    /// [`AgentSideConnection::terminal_output`].
    pub async fn terminal_output(&self, terminal_id: impl Into<String>) -> Result<TerminalOutputResponse> {
        self.conn
            .terminal_output(self.terminal(terminal_id))
            .await
    }

    /// Wait until a terminal's command exits.
    ///
    /// # Errors
    ///
    /// Capability-gated; see
    /// [`AgentSideConnection::wait_for_terminal_exit`].
    pub async fn wait_for_terminal_exit(
        &self,
        terminal_id: impl Into<String>,
    ) -> Result<TerminalExitStatus> {
        self.conn
            .wait_for_terminal_exit(self.terminal(terminal_id))
            .await
    }

    /// Release a terminal and its retained output.
    ///
    /// # Errors
    ///
    /// Capability-gated; see
    /// [`AgentSideConnection::release_terminal`].
    pub async fn release_terminal(&self, terminal_id: impl Into<String>) -> Result<()> {
        self.conn.release_terminal(self.terminal(terminal_id)).await
    }

    /// Kill a terminal's command without releasing the terminal.
    ///
    /// # Errors
    ///
    /// Capability-gated; see
    /// [`AgentSideConnection::kill_terminal`].
    pub async fn kill_terminal(&self, terminal_id: impl Into<String>) -> Result<()> {
        self.conn.kill_terminal(self.terminal(terminal_id)).await
    }

    /// Run a command to completion: create the terminal, wait for exit, read
    /// the final output, and release the terminal. The release is attempted
    /// even when an intermediate step fails.
    ///
    /// # Errors
    ///
    /// Capability-gated; propagates the first failing step after the release
    /// attempt.
    pub async fn run_command(&self, request: CreateTerminalRequest) -> Result<CommandOutput> {
        let created = self.create_terminal(request).await?;
        let terminal_id = created.terminal_id;

        let run = async {
            let exit_status = self.wait_for_terminal_exit(terminal_id.clone()).await?;
            let output = self.terminal_output(terminal_id.clone()).await?;
            Ok(CommandOutput {
                output: output.output,
                truncated: output.truncated,
                exit_status: output.exit_status.unwrap_or(exit_status),
            })
        };
        let outcome = run.await;

        if let Err(e) = self.release_terminal(terminal_id.clone()).await {
            warn!(terminal_id = terminal_id.as_str(), error = %e, "terminal release failed");
        }
        outcome
    }

    fn terminal(&self, terminal_id: impl Into<String>) -> TerminalRequest {
        TerminalRequest {
            session_id: self.session_id.clone(),
            terminal_id: terminal_id.into(),
        }
    }
}
