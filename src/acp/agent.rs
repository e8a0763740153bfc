//! The [`Agent`] trait an integrator implements to serve ACP clients.

use async_trait::async_trait;

use super::context::PromptContext;
use super::types::{
    AuthenticateRequest, CancelNotification, InitializeRequest, InitializeResponse,
    LoadSessionRequest, NewSessionRequest, NewSessionResponse, PromptRequest, PromptResponse,
    SetSessionModeRequest, SetSessionModelRequest,
};
use crate::rpc::envelope::RpcError;

/// Handler outcome for one agent-side method.
pub type AgentResult<T> = std::result::Result<T, RpcError>;

/// Agent-side protocol implementation.
///
/// Only `initialize`, `new_session`, and `prompt` are mandatory; the
/// remaining methods default to `METHOD_NOT_FOUND` (or a no-op for the
/// `cancel` notification), matching an agent that does not advertise them.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Negotiate versions and capabilities. The connection captures the
    /// client capability snapshot before this runs.
    async fn initialize(&self, request: InitializeRequest) -> AgentResult<InitializeResponse>;

    /// Authenticate using one of the advertised methods.
    async fn authenticate(&self, request: AuthenticateRequest) -> AgentResult<()> {
        let _ = request;
        Err(RpcError::method_not_found("authenticate"))
    }

    /// Create a fresh session.
    async fn new_session(&self, request: NewSessionRequest) -> AgentResult<NewSessionResponse>;

    /// Resume a previously created session.
    async fn load_session(&self, request: LoadSessionRequest) -> AgentResult<()> {
        let _ = request;
        Err(RpcError::method_not_found("session/load"))
    }

    /// Run one prompt turn. `cx` carries the outbound client operations
    /// scoped to the request's session.
    async fn prompt(&self, request: PromptRequest, cx: PromptContext) -> AgentResult<PromptResponse>;

    /// Switch the session's operating mode.
    async fn set_session_mode(&self, request: SetSessionModeRequest) -> AgentResult<()> {
        let _ = request;
        Err(RpcError::method_not_found("session/setMode"))
    }

    /// Switch the session's model.
    async fn set_session_model(&self, request: SetSessionModelRequest) -> AgentResult<()> {
        let _ = request;
        Err(RpcError::method_not_found("session/setModel"))
    }

    /// Stop the session's in-flight prompt turn. Notification; no response.
    async fn cancel(&self, notification: CancelNotification) {
        let _ = notification;
    }
}
