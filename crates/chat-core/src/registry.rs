use crate::error::{ChatError, Result};
use crate::provider::ToolProvider;
use crate::types::ToolDescriptor;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A registered tool: its descriptor plus the provider that serves it.
pub struct RegisteredTool {
    pub descriptor: ToolDescriptor,
    pub provider: Arc<dyn ToolProvider>,
}

/// Flat mapping from tool name to its provider-backed descriptor.
///
/// Built once per connected provider at startup and read-only afterwards;
/// there is no removal operation. Every declared tool is globally
/// addressable by name, so a name collision between providers is an error
/// rather than a silent overwrite.
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    /// Registration order, so the tool list sent to the model is stable.
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Merge a provider's declared tools into the registry.
    pub fn register_provider(
        &mut self,
        provider: Arc<dyn ToolProvider>,
        tools: Vec<ToolDescriptor>,
    ) -> Result<()> {
        for descriptor in tools {
            let name = descriptor.name.clone();
            if let Some(existing) = self.tools.get(&name) {
                return Err(ChatError::DuplicateTool {
                    name,
                    first: existing.provider.name().to_string(),
                    second: provider.name().to_string(),
                });
            }
            tracing::debug!(tool = %name, server = provider.name(), "Registered tool");
            self.order.push(name.clone());
            self.tools.insert(
                name,
                RegisteredTool {
                    descriptor,
                    provider: provider.clone(),
                },
            );
        }
        Ok(())
    }

    /// Look up a tool by name.
    pub fn lookup(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }

    /// Registered descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name).map(|t| &t.descriptor))
    }

    /// The registered tools in the function-calling format the chat API
    /// expects, in registration order.
    pub fn as_model_tools(&self) -> Vec<Value> {
        self.descriptors()
            .map(|d| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": d.name,
                        "description": d.description,
                        "parameters": d.input_schema,
                    }
                })
            })
            .collect()
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
