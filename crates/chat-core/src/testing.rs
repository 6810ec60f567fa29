//! Scripted doubles for the chat API and tool providers. Everything here is
//! deterministic and in-memory; no test touches the network.

use crate::chat::{ChatClient, ModelReply};
use crate::error::{ChatError, Result};
use crate::provider::ToolProvider;
use crate::registry::ToolRegistry;
use crate::types::{Message, ToolCall, ToolDescriptor};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub fn descriptor(name: &str) -> ToolDescriptor {
    ToolDescriptor {
        name: name.into(),
        description: format!("test tool {name}"),
        input_schema: json!({"type": "object", "properties": {}}),
    }
}

pub fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall {
        id: id.into(),
        name: name.into(),
        arguments,
    }
}

pub fn registry_with(provider: Arc<StubProvider>) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry
        .register_provider(provider.clone(), provider.tools())
        .unwrap();
    Arc::new(registry)
}

/// A chat client that replays a fixed script of replies.
pub struct ScriptedChat {
    replies: Mutex<VecDeque<ModelReply>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedChat {
    pub fn new(replies: Vec<ModelReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests_made(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// The message sequence sent on request `index`.
    pub fn request(&self, index: usize) -> Vec<Message> {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedChat {
    async fn complete(&self, messages: &[Message], _tools: &[Value]) -> Result<ModelReply> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ChatError::Chat("script exhausted".into()))
    }
}

enum Behavior {
    /// Return the tool's own name.
    EchoName,
    Fixed(String),
    Reject(String),
    Transport(String),
}

/// A tool provider with a fixed tool list and scripted behaviour.
pub struct StubProvider {
    name: String,
    tools: Vec<ToolDescriptor>,
    behavior: Behavior,
    calls: Mutex<Vec<String>>,
}

impl StubProvider {
    pub fn new(name: &str, tools: Vec<ToolDescriptor>) -> Self {
        Self {
            name: name.into(),
            tools,
            behavior: Behavior::EchoName,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn fixed_result(mut self, result: &str) -> Self {
        self.behavior = Behavior::Fixed(result.into());
        self
    }

    pub fn echo_name(mut self) -> Self {
        self.behavior = Behavior::EchoName;
        self
    }

    pub fn reject_with(mut self, message: &str) -> Self {
        self.behavior = Behavior::Reject(message.into());
        self
    }

    pub fn transport_failure(mut self, message: &str) -> Self {
        self.behavior = Behavior::Transport(message.into());
        self
    }

    pub fn tools(&self) -> Vec<ToolDescriptor> {
        self.tools.clone()
    }

    /// Names of the tools invoked, in invocation order.
    pub fn calls_seen(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolProvider for StubProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, _arguments: Value) -> Result<String> {
        self.calls.lock().unwrap().push(name.to_string());
        match &self.behavior {
            Behavior::EchoName => Ok(name.to_string()),
            Behavior::Fixed(result) => Ok(result.clone()),
            Behavior::Reject(message) => Err(ChatError::ToolRejected {
                tool: name.to_string(),
                message: message.clone(),
            }),
            Behavior::Transport(message) => Err(ChatError::ToolTransport {
                server: self.name.clone(),
                message: message.clone(),
            }),
        }
    }
}
