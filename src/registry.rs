//! Named tool collections served over the Model Context Protocol
//!
//! A registry is built once at startup and is immutable afterwards. Each tool
//! pairs a declared input schema with a handler; handlers translate their own
//! operational failures into structured result values, so the only `Err` they
//! may return is a malformed-arguments protocol error.

use std::future::Future;
use std::pin::Pin;

use rust_mcp_sdk::schema::Tool;
use serde_json::Value;
use thiserror::Error;

use crate::errors::AppError;

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, AppError>> + Send>>;
pub type ToolHandler = Box<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool {name:?} is already registered")]
    DuplicateTool { name: String },
}

struct RegisteredTool {
    definition: Tool,
    handler: ToolHandler,
}

pub struct ToolRegistry {
    server_name: &'static str,
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn builder(server_name: &'static str) -> ToolRegistryBuilder {
        ToolRegistryBuilder {
            server_name,
            tools: Vec::new(),
        }
    }

    pub fn server_name(&self) -> &'static str {
        self.server_name
    }

    /// Tool definitions in registration order, as advertised by `tools/list`.
    pub fn definitions(&self) -> Vec<Tool> {
        self.tools.iter().map(|tool| tool.definition.clone()).collect()
    }

    /// Dispatches to the named tool. `None` means the tool is unknown in this
    /// registry; the caller reports that as a protocol-level error.
    pub async fn invoke(&self, name: &str, arguments: Value) -> Option<Result<Value, AppError>> {
        let tool = self
            .tools
            .iter()
            .find(|tool| tool.definition.name == name)?;
        Some((tool.handler)(arguments).await)
    }
}

pub struct ToolRegistryBuilder {
    server_name: &'static str,
    tools: Vec<RegisteredTool>,
}

impl std::fmt::Debug for ToolRegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistryBuilder")
            .field("server_name", &self.server_name)
            .field("tools", &self.tools.len())
            .finish()
    }
}

impl ToolRegistryBuilder {
    pub fn register<H, Fut>(mut self, definition: Tool, handler: H) -> Result<Self, RegistryError>
    where
        H: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, AppError>> + Send + 'static,
    {
        if self
            .tools
            .iter()
            .any(|tool| tool.definition.name == definition.name)
        {
            return Err(RegistryError::DuplicateTool {
                name: definition.name,
            });
        }

        self.tools.push(RegisteredTool {
            definition,
            handler: Box::new(move |arguments| Box::pin(handler(arguments))),
        });
        Ok(self)
    }

    pub fn build(self) -> ToolRegistry {
        ToolRegistry {
            server_name: self.server_name,
            tools: self.tools,
        }
    }
}
