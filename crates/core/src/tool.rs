//! Tool trait: the abstraction over assistant capabilities.
//!
//! Tools are the actions the model may request: look up the weather,
//! read the calendar, create an event. The registry is the immutable
//! catalog sent to the model on every request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The output content, already formatted for the model
    pub output: String,
}

impl ToolResult {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

/// The core Tool trait.
///
/// Each capability implements this trait. Tools are registered in the
/// ToolRegistry and made available to the orchestrator.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "get_weather").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The catalog of available tools, in registration order.
///
/// The orchestrator uses this to:
/// 1. Get tool definitions to send to the LLM
/// 2. Look up, validate and execute tools when the LLM requests them
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. Replaces any existing tool with the same name, keeping its position.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(idx) => self.tools[idx] = tool,
            None => self.tools.push(tool),
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    /// Get all tool definitions (for sending to the LLM).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// Execute a tool call after checking the schema's required arguments.
    pub async fn execute(&self, call: &ToolCall) -> std::result::Result<ToolResult, ToolError> {
        let tool = self.get(&call.name).ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        validate_required(tool, &call.arguments)?;

        debug!(tool = %call.name, call_id = %call.id, "Executing tool");
        tool.execute(call.arguments.clone()).await
    }

    /// List all registered tool names, in catalog order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Every name in the schema's `required` list must be present and non-null.
fn validate_required(tool: &dyn Tool, arguments: &serde_json::Value) -> std::result::Result<(), ToolError> {
    let Some(args) = arguments.as_object() else {
        return Err(ToolError::InvalidArguments(format!(
            "arguments for {} must be a JSON object",
            tool.name()
        )));
    };

    let schema = tool.parameters_schema();
    let required = schema["required"].as_array().map(Vec::as_slice).unwrap_or_default();

    for field in required.iter().filter_map(|f| f.as_str()) {
        if args.get(field).is_none_or(|v| v.is_null()) {
            return Err(ToolError::MissingArgument {
                tool_name: tool.name().to_string(),
                argument: field.to_string(),
            });
        }
    }
    Ok(())
}
