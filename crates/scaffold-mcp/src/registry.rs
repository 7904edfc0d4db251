//! Tool registry: name → (schema, async handler).
//!
//! Populated once during process startup and read-only afterwards, so
//! concurrent dispatch needs no locking — the registry is shared as a plain
//! `Arc`. Handlers are opaque external collaborators: the registry never
//! inspects what they do, only that their name is unique.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use crate::error::{RegistryError, ToolError};
use crate::protocol::types::ToolInfo;

/// Boxed async tool handler: arguments in, result or typed failure out.
pub type ToolHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync>;

/// One registered tool: advertised metadata plus its handler.
#[derive(Clone)]
pub struct ToolDefinition {
    name: String,
    description: String,
    input_schema: Value,
    handler: ToolHandler,
}

impl ToolDefinition {
    /// Wrap an async closure into a definition. The handler future must be
    /// `Send` so calls can run on any worker task.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler: Arc::new(move |args| {
                Box::pin(handler(args)) as BoxFuture<'static, Result<Value, ToolError>>
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the handler. Failures come back as values; the dispatcher maps
    /// them to JSON-RPC errors.
    pub fn invoke(&self, arguments: Value) -> BoxFuture<'static, Result<Value, ToolError>> {
        (self.handler)(arguments)
    }

    fn info(&self) -> ToolInfo {
        ToolInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Insertion-ordered tool registry.
///
/// `tools/list`, the `initialize` advertisement and the HTTP discovery
/// endpoints all read the same `list()` output, so every surface stays
/// consistent.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Duplicate names are a startup-time configuration
    /// error, never a silent overwrite.
    pub fn register(&mut self, definition: ToolDefinition) -> Result<(), RegistryError> {
        let name = definition.name.clone();
        if self.index.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        debug!("Registering tool: {}", name);
        self.index.insert(name, self.tools.len());
        self.tools.push(definition);
        Ok(())
    }

    /// Look up a tool by name. Side-effect free.
    pub fn resolve(&self, name: &str) -> Option<&ToolDefinition> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Advertised metadata for every tool, in registration order.
    pub fn list(&self) -> Vec<ToolInfo> {
        self.tools.iter().map(ToolDefinition::info).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
