//! MCP server façade: binds the primitive registries onto a [`Session`].
//!
//! The server owns one session plus the tool/resource/prompt registries and
//! registers request handlers for the standard methods. Registration changes
//! fan out `notifications/*/list_changed` when the matching capability
//! declares it and a transport is attached. Tool handler failures are folded
//! into `isError` call results; only malformed params or an unresolvable
//! identifier produce an error response.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::registry::{
    PromptHandler, PromptRegistry, ResourceHandler, ResourceRegistry, ToolHandler, ToolRegistry,
};
use super::types::{
    CallToolResult, LoggingLevel, Prompt, Resource, ResourceTemplate, ServerCapabilities, Tool,
};
use crate::rpc::envelope::RpcError;
use crate::session::{RequestHandler, Session, SessionConfig};
use crate::transport::Transport;
use crate::worker::WorkerPool;
use crate::{ConduitError, Result};

#[derive(Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Deserialize)]
struct ReadResourceParams {
    uri: String,
}

#[derive(Deserialize)]
struct GetPromptParams {
    name: String,
    #[serde(default)]
    arguments: Option<Value>,
}

#[derive(Deserialize)]
struct SetLevelParams {
    level: LoggingLevel,
}

/// Tools/resources/prompts provider over one protocol session.
pub struct McpServer {
    session: Arc<Session>,
    capabilities: ServerCapabilities,
    tools: ToolRegistry,
    resources: ResourceRegistry,
    prompts: PromptRegistry,
    log_level: Mutex<LoggingLevel>,
}

impl McpServer {
    /// Create a server declaring `capabilities` and bind its method handlers.
    #[must_use]
    pub fn new(
        capabilities: ServerCapabilities,
        config: SessionConfig,
        pool: Arc<dyn WorkerPool>,
    ) -> Arc<Self> {
        let server = Arc::new(Self {
            session: Session::new(config, pool),
            capabilities,
            tools: ToolRegistry::new(),
            resources: ResourceRegistry::new(),
            prompts: PromptRegistry::new(),
            log_level: Mutex::new(LoggingLevel::Info),
        });
        server.bind_handlers();
        server
    }

    /// The underlying session.
    #[must_use]
    pub fn session(&self) -> Arc<Session> {
        Arc::clone(&self.session)
    }

    /// Declared server capabilities.
    #[must_use]
    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    /// Start `transport` with this server as dispatcher and attach it to the
    /// session.
    ///
    /// # Errors
    ///
    /// Propagates the transport's start failure.
    pub async fn start(&self, transport: Arc<dyn Transport>) -> Result<()> {
        transport.start(self.session()).await?;
        self.session.attach(transport);
        Ok(())
    }

    // ── Registrations ─────────────────────────────────────────────────────────

    /// Register a tool and fan out the list-changed notification.
    ///
    /// # Errors
    ///
    /// [`ConduitError::Registry`] when the tools capability is not declared,
    /// the name is empty, or the name is already registered.
    pub async fn add_tool(&self, tool: Tool, handler: ToolHandler) -> Result<()> {
        ensure_enabled(self.capabilities.tools.is_some(), "tools")?;
        self.tools.add(tool, handler)?;
        self.fan_out_list_changed("notifications/tools/list_changed", self.tools_list_changed())
            .await;
        Ok(())
    }

    /// Unregister a tool and fan out the list-changed notification.
    ///
    /// # Errors
    ///
    /// [`ConduitError::Registry`] when the name is unknown.
    pub async fn remove_tool(&self, name: &str) -> Result<()> {
        self.tools.remove(name)?;
        self.fan_out_list_changed("notifications/tools/list_changed", self.tools_list_changed())
            .await;
        Ok(())
    }

    /// Register an exact-URI resource and fan out the list-changed
    /// notification.
    ///
    /// # Errors
    ///
    /// [`ConduitError::Registry`] when the resources capability is not
    /// declared, a required field is empty, or the URI is already registered.
    pub async fn add_resource(&self, resource: Resource, handler: ResourceHandler) -> Result<()> {
        ensure_enabled(self.capabilities.resources.is_some(), "resources")?;
        self.resources.add(resource, handler)?;
        self.fan_out_list_changed(
            "notifications/resources/list_changed",
            self.resources_list_changed(),
        )
        .await;
        Ok(())
    }

    /// Unregister an exact-URI resource and fan out the list-changed
    /// notification.
    ///
    /// # Errors
    ///
    /// [`ConduitError::Registry`] when the URI is unknown.
    pub async fn remove_resource(&self, uri: &str) -> Result<()> {
        self.resources.remove(uri)?;
        self.fan_out_list_changed(
            "notifications/resources/list_changed",
            self.resources_list_changed(),
        )
        .await;
        Ok(())
    }

    /// Register a resource template and fan out the list-changed
    /// notification.
    ///
    /// # Errors
    ///
    /// [`ConduitError::Registry`] when the resources capability is not
    /// declared, a required field is empty, or the template is already
    /// registered.
    pub async fn add_resource_template(
        &self,
        template: ResourceTemplate,
        handler: ResourceHandler,
    ) -> Result<()> {
        ensure_enabled(self.capabilities.resources.is_some(), "resources")?;
        self.resources.add_template(template, handler)?;
        self.fan_out_list_changed(
            "notifications/resources/list_changed",
            self.resources_list_changed(),
        )
        .await;
        Ok(())
    }

    /// Unregister a resource template and fan out the list-changed
    /// notification.
    ///
    /// # Errors
    ///
    /// [`ConduitError::Registry`] when the template is unknown.
    pub async fn remove_resource_template(&self, uri_template: &str) -> Result<()> {
        self.resources.remove_template(uri_template)?;
        self.fan_out_list_changed(
            "notifications/resources/list_changed",
            self.resources_list_changed(),
        )
        .await;
        Ok(())
    }

    /// Register a prompt and fan out the list-changed notification.
    ///
    /// # Errors
    ///
    /// [`ConduitError::Registry`] when the prompts capability is not
    /// declared, the name is empty, or the name is already registered.
    pub async fn add_prompt(&self, prompt: Prompt, handler: PromptHandler) -> Result<()> {
        ensure_enabled(self.capabilities.prompts.is_some(), "prompts")?;
        self.prompts.add(prompt, handler)?;
        self.fan_out_list_changed(
            "notifications/prompts/list_changed",
            self.prompts_list_changed(),
        )
        .await;
        Ok(())
    }

    /// Unregister a prompt and fan out the list-changed notification.
    ///
    /// # Errors
    ///
    /// [`ConduitError::Registry`] when the name is unknown.
    pub async fn remove_prompt(&self, name: &str) -> Result<()> {
        self.prompts.remove(name)?;
        self.fan_out_list_changed(
            "notifications/prompts/list_changed",
            self.prompts_list_changed(),
        )
        .await;
        Ok(())
    }

    // ── Logging ───────────────────────────────────────────────────────────────

    /// The level retained from the most recent `logging/setLevel` call.
    #[must_use]
    pub fn log_level(&self) -> LoggingLevel {
        *self
            .log_level
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Emit a `notifications/message` log notification to the client.
    ///
    /// Messages below the retained level are suppressed without touching the
    /// transport, as are all messages when the logging capability is not
    /// declared.
    ///
    /// # Errors
    ///
    /// Propagates the session's notification send failure.
    pub async fn log_message(
        &self,
        level: LoggingLevel,
        logger: Option<&str>,
        data: Value,
    ) -> Result<()> {
        if !self.capabilities.logging || level < self.log_level() {
            return Ok(());
        }
        let mut params = Map::new();
        params.insert("level".into(), serde_json::to_value(level)?);
        if let Some(logger) = logger {
            params.insert("logger".into(), Value::String(logger.to_owned()));
        }
        params.insert("data".into(), data);
        self.session
            .send_notification("notifications/message", Some(Value::Object(params)))
            .await
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn tools_list_changed(&self) -> bool {
        self.capabilities.tools.is_some_and(|c| c.list_changed)
    }

    fn resources_list_changed(&self) -> bool {
        self.capabilities.resources.is_some_and(|c| c.list_changed)
    }

    fn prompts_list_changed(&self) -> bool {
        self.capabilities.prompts.is_some_and(|c| c.list_changed)
    }

    /// Send a list-changed notification when `enabled` and a transport is
    /// attached. Registration already succeeded, so delivery failures are
    /// logged rather than surfaced.
    async fn fan_out_list_changed(&self, method: &str, enabled: bool) {
        if !enabled {
            return;
        }
        match self.session.send_notification(method, None).await {
            Ok(()) | Err(ConduitError::Detached) => {}
            Err(e) => warn!(method, error = %e, "list-changed notification dropped"),
        }
    }

    fn bind_handlers(self: &Arc<Self>) {
        self.session
            .on_request("ping", with_server(self, |_server, _params| async move {
                Ok(json!({}))
            }));
        self.session
            .on_request("tools/list", with_server(self, |server, _params| async move {
                to_result(&json!({ "tools": server.tools.list() }))
            }));
        self.session
            .on_request("tools/call", with_server(self, |server, params| async move {
                let call: CallToolParams = parse_params(params)?;
                let Some(handler) = server.tools.handler(&call.name) else {
                    debug!(tool = call.name.as_str(), "call to unregistered tool");
                    return to_result(&CallToolResult::error(format!(
                        "unknown tool: {}",
                        call.name
                    )));
                };
                let result = match handler(call.arguments).await {
                    Ok(result) => result,
                    Err(e) => CallToolResult::error(e.to_string()),
                };
                to_result(&result)
            }));
        self.session
            .on_request("resources/list", with_server(self, |server, _params| async move {
                to_result(&json!({ "resources": server.resources.list() }))
            }));
        self.session.on_request(
            "resources/templates/list",
            with_server(self, |server, _params| async move {
                to_result(&json!({ "resourceTemplates": server.resources.list_templates() }))
            }),
        );
        self.session
            .on_request("resources/read", with_server(self, |server, params| async move {
                let read: ReadResourceParams = parse_params(params)?;
                let Some((handler, target)) = server.resources.resolve(&read.uri) else {
                    return Err(RpcError::invalid_params(format!(
                        "unknown resource: {}",
                        read.uri
                    )));
                };
                let result = handler(target).await?;
                to_result(&result)
            }));
        self.session
            .on_request("prompts/list", with_server(self, |server, _params| async move {
                to_result(&json!({ "prompts": server.prompts.list() }))
            }));
        self.session
            .on_request("prompts/get", with_server(self, |server, params| async move {
                let get: GetPromptParams = parse_params(params)?;
                let Some(handler) = server.prompts.handler(&get.name) else {
                    return Err(RpcError::invalid_params(format!(
                        "unknown prompt: {}",
                        get.name
                    )));
                };
                let result = handler(get.arguments).await?;
                to_result(&result)
            }));
        self.session
            .on_request("logging/setLevel", with_server(self, |server, params| async move {
                let set: SetLevelParams = parse_params(params)?;
                *server
                    .log_level
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = set.level;
                Ok(json!({}))
            }));
    }
}

/// Build a request handler holding a weak server reference, so the handler
/// table on the session does not keep the server alive.
fn with_server<F, Fut>(server: &Arc<McpServer>, f: F) -> RequestHandler
where
    F: Fn(Arc<McpServer>, Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = std::result::Result<Value, RpcError>> + Send + 'static,
{
    let weak: Weak<McpServer> = Arc::downgrade(server);
    Arc::new(move |params| {
        let fut = weak.upgrade().map(|server| f(server, params));
        Box::pin(async move {
            match fut {
                Some(fut) => fut.await,
                None => Err(RpcError::internal("server shut down")),
            }
        })
    })
}

fn ensure_enabled(enabled: bool, kind: &str) -> Result<()> {
    if enabled {
        Ok(())
    } else {
        Err(ConduitError::Registry(format!(
            "{kind} capability not declared"
        )))
    }
}

fn parse_params<T: DeserializeOwned>(params: Option<Value>) -> std::result::Result<T, RpcError> {
    serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| RpcError::invalid_params(e.to_string()))
}

fn to_result<T: Serialize>(value: &T) -> std::result::Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal(e.to_string()))
}
