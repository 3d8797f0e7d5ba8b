//! Tool registry and executor system

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::providers::ToolDefinition;

pub mod estimate_cost;

pub use estimate_cost::{CostEstimate, EstimateCostTool, estimate_cost};

/// Trait for executing tools
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool_name: &str, input: Value) -> Result<String>;
    fn list_tools(&self) -> Vec<ToolDefinition>;
}

/// Individual tool handler
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    async fn execute(&self, input: Value) -> Result<String>;
}

/// Registry of available tools
///
/// Backed by an ordered map so the tool list sent to the model is stable
/// between calls.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    /// Create a new empty tool registry
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Registry holding every built-in tool
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(EstimateCostTool));
        registry
    }

    /// Register a tool handler
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.name().to_string();
        debug!("Registering tool: {}", name);
        self.tools.insert(name, handler);
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn definition_of(handler: &dyn ToolHandler) -> ToolDefinition {
    ToolDefinition {
        name: handler.name().to_string(),
        description: handler.description().to_string(),
        input_schema: handler.input_schema(),
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, tool_name: &str, input: Value) -> Result<String> {
        debug!("Executing tool: {} with input: {}", tool_name, input);

        let handler = self
            .tools
            .get(tool_name)
            .ok_or_else(|| anyhow!("Unknown tool: {}", tool_name))?;

        match handler.execute(input).await {
            Ok(result) => {
                debug!("Tool {} succeeded", tool_name);
                Ok(result)
            }
            Err(e) => {
                warn!("Tool {} failed: {}", tool_name, e);
                Err(e)
            }
        }
    }

    fn list_tools(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|handler| definition_of(handler.as_ref()))
            .collect()
    }
}

/// Wraps a ToolRegistry but only allows execution of specific tools.
///
/// Each agent gets one of these scoped to the tools its descriptor lists.
pub struct FilteredToolExecutor {
    inner: Arc<ToolRegistry>,
    allowed: HashSet<String>,
}

impl FilteredToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, allowed_tools: &[String]) -> Self {
        let allowed: HashSet<String> = allowed_tools.iter().cloned().collect();
        Self {
            inner: registry,
            allowed,
        }
    }
}

#[async_trait]
impl ToolExecutor for FilteredToolExecutor {
    async fn execute(&self, tool_name: &str, input: Value) -> Result<String> {
        if !self.allowed.contains(tool_name) {
            warn!("Agent attempted to use non-allowed tool: {}", tool_name);
            return Err(anyhow!("Tool '{}' is not available for this agent", tool_name));
        }
        self.inner.execute(tool_name, input).await
    }

    fn list_tools(&self) -> Vec<ToolDefinition> {
        self.inner
            .list_tools()
            .into_iter()
            .filter(|t| self.allowed.contains(&t.name))
            .collect()
    }
}

/// Helper function to create a JSON schema for tool input
pub fn json_schema(properties: Value, required: Vec<&str>) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}
