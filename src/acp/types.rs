//! ACP wire types, serialized in the protocol's camelCase convention.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::capabilities::ClientCapabilities;

/// Protocol version spoken by this crate.
pub const PROTOCOL_VERSION: u16 = 1;

/// `initialize` request params.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitializeRequest {
    /// Latest protocol version the client supports.
    pub protocol_version: u16,
    /// Capability document the client declares.
    pub client_capabilities: ClientCapabilities,
}

/// `initialize` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitializeResponse {
    /// Protocol version the agent will speak.
    pub protocol_version: u16,
    /// Capability document the agent declares.
    pub agent_capabilities: AgentCapabilities,
    /// Authentication methods the agent accepts.
    pub auth_methods: Vec<AuthMethod>,
}

/// Capabilities an agent declares back to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentCapabilities {
    /// Whether `session/load` is supported.
    pub load_session: bool,
}

/// One authentication method offered by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthMethod {
    /// Stable method identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Optional human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// `authenticate` request params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateRequest {
    /// Chosen authentication method id.
    pub method_id: String,
}

/// `session/new` request params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionRequest {
    /// Working directory for the session.
    pub cwd: String,
}

/// `session/new` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionResponse {
    /// Identifier for the created session.
    pub session_id: String,
}

/// `session/load` request params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSessionRequest {
    /// Identifier of the session to resume.
    pub session_id: String,
    /// Working directory for the session.
    pub cwd: String,
}

/// `session/setMode` request params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSessionModeRequest {
    /// Target session.
    pub session_id: String,
    /// Mode to switch to.
    pub mode_id: String,
}

/// `session/setModel` request params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSessionModelRequest {
    /// Target session.
    pub session_id: String,
    /// Model to switch to.
    pub model_id: String,
}

/// `session/cancel` notification params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelNotification {
    /// Session whose in-flight prompt should stop.
    pub session_id: String,
}

/// One block of prompt or update content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text payload.
        text: String,
    },
    /// Base64-encoded image data.
    Image {
        /// Base64 payload.
        data: String,
        /// MIME type of `data`.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

/// `session/prompt` request params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRequest {
    /// Target session.
    pub session_id: String,
    /// User prompt content.
    pub prompt: Vec<ContentBlock>,
}

/// Why a prompt turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The agent finished its turn.
    EndTurn,
    /// The model hit its token limit.
    MaxTokens,
    /// The model refused to continue.
    Refusal,
    /// The client cancelled the turn.
    Cancelled,
}

/// `session/prompt` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    /// Why the turn ended.
    pub stop_reason: StopReason,
}

/// One streamed update inside a `session/update` notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "sessionUpdate", rename_all = "snake_case")]
pub enum SessionUpdate {
    /// A chunk of the agent's visible message.
    AgentMessageChunk {
        /// The chunk content.
        content: ContentBlock,
    },
    /// A chunk of the agent's reasoning.
    AgentThoughtChunk {
        /// The chunk content.
        content: ContentBlock,
    },
}

/// `session/update` notification params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionNotification {
    /// Session the update belongs to.
    pub session_id: String,
    /// The update payload.
    pub update: SessionUpdate,
}

/// How a permission option resolves if selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOptionKind {
    /// Allow this once.
    AllowOnce,
    /// Allow for the rest of the session.
    AllowAlways,
    /// Reject this once.
    RejectOnce,
    /// Reject for the rest of the session.
    RejectAlways,
}

/// One choice offered in a permission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionOption {
    /// Stable option identifier.
    pub option_id: String,
    /// Human-readable label.
    pub name: String,
    /// Resolution semantics of the option.
    pub kind: PermissionOptionKind,
}

/// `session/request_permission` request params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPermissionRequest {
    /// Target session.
    pub session_id: String,
    /// Description of the tool call awaiting approval.
    pub tool_call: Value,
    /// Choices offered to the user.
    pub options: Vec<PermissionOption>,
}

/// How the user resolved a permission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PermissionOutcome {
    /// The prompt turn was cancelled before the user answered.
    Cancelled,
    /// The user picked an option.
    Selected {
        /// Identifier of the chosen option.
        #[serde(rename = "optionId")]
        option_id: String,
    },
}

/// `session/request_permission` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPermissionResponse {
    /// The user's decision.
    pub outcome: PermissionOutcome,
}

/// `fs/readTextFile` request params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadTextFileRequest {
    /// Target session.
    pub session_id: String,
    /// Absolute path to read.
    pub path: String,
    /// 1-based first line to include.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Maximum number of lines to include.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// `fs/readTextFile` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadTextFileResponse {
    /// The file content read.
    pub content: String,
}

/// `fs/writeTextFile` request params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteTextFileRequest {
    /// Target session.
    pub session_id: String,
    /// Absolute path to write.
    pub path: String,
    /// Full replacement content.
    pub content: String,
}

/// One environment variable for a terminal command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVariable {
    /// Variable name.
    pub name: String,
    /// Variable value.
    pub value: String,
}

/// `terminal/create` request params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTerminalRequest {
    /// Target session.
    pub session_id: String,
    /// Command to execute.
    pub command: String,
    /// Command arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory; the session's when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Extra environment variables.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVariable>,
    /// Cap on retained output bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_byte_limit: Option<u64>,
}

/// `terminal/create` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTerminalResponse {
    /// Identifier for the created terminal.
    pub terminal_id: String,
}

/// Params shared by `terminal/output`, `terminal/waitForExit`,
/// `terminal/release`, and `terminal/kill`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalRequest {
    /// Target session.
    pub session_id: String,
    /// Target terminal.
    pub terminal_id: String,
}

/// How a terminal command exited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TerminalExitStatus {
    /// Process exit code, when it exited normally.
    pub exit_code: Option<i32>,
    /// Terminating signal name, when killed.
    pub signal: Option<String>,
}

/// `terminal/output` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalOutputResponse {
    /// Output captured so far.
    pub output: String,
    /// Whether the output was truncated by the byte limit.
    pub truncated: bool,
    /// Exit status, once the command finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<TerminalExitStatus>,
}
