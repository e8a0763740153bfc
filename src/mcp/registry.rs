//! Dynamic primitive registries with no-silent-overwrite semantics.
//!
//! Each registry maps an identifier (name, URI, or URI template) to a
//! descriptor plus handler. `add` fails on a duplicate identifier without
//! mutating state; `remove` fails on an unknown identifier. Resource lookup
//! tries exact-URI registrations first and only falls back to URI templates
//! when no exact match exists.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::BoxFuture;
use serde_json::Value;

use super::types::{
    CallToolResult, GetPromptResult, Prompt, ReadResourceResult, Resource, ResourceTemplate, Tool,
};
use super::uri_template::match_template;
use crate::rpc::envelope::RpcError;
use crate::{ConduitError, Result};

/// Tool invocation handler: raw arguments in, call result out.
pub type ToolHandler =
    Arc<dyn Fn(Option<Value>) -> BoxFuture<'static, Result<CallToolResult>> + Send + Sync>;

/// Resource read handler.
pub type ResourceHandler = Arc<
    dyn Fn(ResourceRead) -> BoxFuture<'static, std::result::Result<ReadResourceResult, RpcError>>
        + Send
        + Sync,
>;

/// Prompt resolution handler: raw arguments in, resolved prompt out.
pub type PromptHandler = Arc<
    dyn Fn(Option<Value>) -> BoxFuture<'static, std::result::Result<GetPromptResult, RpcError>>
        + Send
        + Sync,
>;

/// Adapt a synchronous tool function to the asynchronous handler form.
///
/// The session offloads handler execution to its worker pool, so the wrapped
/// function never blocks the transport dispatch path even when it is slow.
pub fn sync_tool<F>(f: F) -> ToolHandler
where
    F: Fn(Option<Value>) -> Result<CallToolResult> + Send + Sync + 'static,
{
    Arc::new(move |args| {
        let out = f(args);
        Box::pin(async move { out })
    })
}

/// One resolved `resources/read` target handed to a [`ResourceHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRead {
    /// The URI that was requested.
    pub uri: String,
    /// Variables captured by the matching URI template; empty for an exact
    /// registration.
    pub vars: HashMap<String, String>,
}

// ── Tools ─────────────────────────────────────────────────────────────────────

struct ToolEntry {
    tool: Tool,
    handler: ToolHandler,
}

/// Registry of callable tools keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    entries: Mutex<HashMap<String, ToolEntry>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.
    ///
    /// # Errors
    ///
    /// [`ConduitError::Registry`] when the name is empty or already
    /// registered; state is unchanged on failure.
    pub fn add(&self, tool: Tool, handler: ToolHandler) -> Result<()> {
        if tool.name.trim().is_empty() {
            return Err(ConduitError::Registry("tool name must not be empty".into()));
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&tool.name) {
            return Err(ConduitError::Registry(format!(
                "duplicate tool: {}",
                tool.name
            )));
        }
        entries.insert(tool.name.clone(), ToolEntry { tool, handler });
        Ok(())
    }

    /// Unregister a tool.
    ///
    /// # Errors
    ///
    /// [`ConduitError::Registry`] when the name is unknown.
    pub fn remove(&self, name: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(name).is_none() {
            return Err(ConduitError::Registry(format!("unknown tool: {name}")));
        }
        Ok(())
    }

    /// Whether a tool with `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Handler for `name`, when registered.
    #[must_use]
    pub fn handler(&self, name: &str) -> Option<ToolHandler> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|e| Arc::clone(&e.handler))
    }

    /// Descriptors of every registered tool, sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<Tool> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut tools: Vec<Tool> = entries.values().map(|e| e.tool.clone()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }
}

// ── Resources ─────────────────────────────────────────────────────────────────

struct ResourceEntry {
    resource: Resource,
    handler: ResourceHandler,
}

struct TemplateEntry {
    template: ResourceTemplate,
    handler: ResourceHandler,
}

#[derive(Default)]
struct ResourceTables {
    exact: HashMap<String, ResourceEntry>,
    templates: BTreeMap<String, TemplateEntry>,
}

/// Registry of readable resources: exact URIs plus URI templates.
#[derive(Default)]
pub struct ResourceRegistry {
    tables: Mutex<ResourceTables>,
}

impl ResourceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an exact-URI resource.
    ///
    /// # Errors
    ///
    /// [`ConduitError::Registry`] when the URI or name is empty, or the URI
    /// is already registered; state is unchanged on failure.
    pub fn add(&self, resource: Resource, handler: ResourceHandler) -> Result<()> {
        if resource.uri.trim().is_empty() || resource.name.trim().is_empty() {
            return Err(ConduitError::Registry(
                "resource uri and name must not be empty".into(),
            ));
        }
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        if tables.exact.contains_key(&resource.uri) {
            return Err(ConduitError::Registry(format!(
                "duplicate resource: {}",
                resource.uri
            )));
        }
        tables
            .exact
            .insert(resource.uri.clone(), ResourceEntry { resource, handler });
        Ok(())
    }

    /// Unregister an exact-URI resource.
    ///
    /// # Errors
    ///
    /// [`ConduitError::Registry`] when the URI is unknown.
    pub fn remove(&self, uri: &str) -> Result<()> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        if tables.exact.remove(uri).is_none() {
            return Err(ConduitError::Registry(format!("unknown resource: {uri}")));
        }
        Ok(())
    }

    /// Register a resource template.
    ///
    /// # Errors
    ///
    /// [`ConduitError::Registry`] when the template or name is empty, or the
    /// template is already registered; state is unchanged on failure.
    pub fn add_template(&self, template: ResourceTemplate, handler: ResourceHandler) -> Result<()> {
        if template.uri_template.trim().is_empty() || template.name.trim().is_empty() {
            return Err(ConduitError::Registry(
                "resource template and name must not be empty".into(),
            ));
        }
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        if tables.templates.contains_key(&template.uri_template) {
            return Err(ConduitError::Registry(format!(
                "duplicate resource template: {}",
                template.uri_template
            )));
        }
        tables.templates.insert(
            template.uri_template.clone(),
            TemplateEntry { template, handler },
        );
        Ok(())
    }

    /// Unregister a resource template.
    ///
    /// # Errors
    ///
    /// [`ConduitError::Registry`] when the template is unknown.
    pub fn remove_template(&self, uri_template: &str) -> Result<()> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        if tables.templates.remove(uri_template).is_none() {
            return Err(ConduitError::Registry(format!(
                "unknown resource template: {uri_template}"
            )));
        }
        Ok(())
    }

    /// Whether an exact resource with `uri` is registered.
    #[must_use]
    pub fn contains(&self, uri: &str) -> bool {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .exact
            .contains_key(uri)
    }

    /// Resolve `uri` to a handler: exact registrations first, then the first
    /// structurally matching template. Templates only win when no exact
    /// match exists.
    #[must_use]
    pub fn resolve(&self, uri: &str) -> Option<(ResourceHandler, ResourceRead)> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = tables.exact.get(uri) {
            return Some((
                Arc::clone(&entry.handler),
                ResourceRead {
                    uri: uri.to_owned(),
                    vars: HashMap::new(),
                },
            ));
        }
        for (pattern, entry) in &tables.templates {
            if let Some(vars) = match_template(pattern, uri) {
                return Some((
                    Arc::clone(&entry.handler),
                    ResourceRead {
                        uri: uri.to_owned(),
                        vars,
                    },
                ));
            }
        }
        None
    }

    /// Descriptors of every exact resource, sorted by URI.
    #[must_use]
    pub fn list(&self) -> Vec<Resource> {
        let tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let mut resources: Vec<Resource> =
            tables.exact.values().map(|e| e.resource.clone()).collect();
        resources.sort_by(|a, b| a.uri.cmp(&b.uri));
        resources
    }

    /// Descriptors of every template, in template order.
    #[must_use]
    pub fn list_templates(&self) -> Vec<ResourceTemplate> {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .templates
            .values()
            .map(|e| e.template.clone())
            .collect()
    }
}

// ── Prompts ───────────────────────────────────────────────────────────────────

struct PromptEntry {
    prompt: Prompt,
    handler: PromptHandler,
}

/// Registry of prompts keyed by name.
#[derive(Default)]
pub struct PromptRegistry {
    entries: Mutex<HashMap<String, PromptEntry>>,
}

impl PromptRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prompt.
    ///
    /// # Errors
    ///
    /// [`ConduitError::Registry`] when the name is empty or already
    /// registered; state is unchanged on failure.
    pub fn add(&self, prompt: Prompt, handler: PromptHandler) -> Result<()> {
        if prompt.name.trim().is_empty() {
            return Err(ConduitError::Registry(
                "prompt name must not be empty".into(),
            ));
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&prompt.name) {
            return Err(ConduitError::Registry(format!(
                "duplicate prompt: {}",
                prompt.name
            )));
        }
        entries.insert(prompt.name.clone(), PromptEntry { prompt, handler });
        Ok(())
    }

    /// Unregister a prompt.
    ///
    /// # Errors
    ///
    /// [`ConduitError::Registry`] when the name is unknown.
    pub fn remove(&self, name: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(name).is_none() {
            return Err(ConduitError::Registry(format!("unknown prompt: {name}")));
        }
        Ok(())
    }

    /// Whether a prompt with `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Handler for `name`, when registered.
    #[must_use]
    pub fn handler(&self, name: &str) -> Option<PromptHandler> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|e| Arc::clone(&e.handler))
    }

    /// Descriptors of every registered prompt, sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<Prompt> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut prompts: Vec<Prompt> = entries.values().map(|e| e.prompt.clone()).collect();
        prompts.sort_by(|a, b| a.name.cmp(&b.name));
        prompts
    }
}
