use crate::config::ModelConfig;
use crate::error::{ChatError, Result};
use crate::types::{Message, ToolCall};

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool, ChatCompletionToolType, CreateChatCompletionRequestArgs, FunctionCall,
};
use async_openai::Client;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

/// One model response: text, tool calls, or both.
#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

/// The chat API boundary. One request carries the full message sequence and
/// the tool spec; the response is a single message with optional tool calls.
/// Treated as synchronous request/response regardless of the transport.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, messages: &[Message], tools: &[Value]) -> Result<ModelReply>;
}

/// Chat client for an OpenAI-compatible endpoint (Ollama's `/v1` by default).
pub struct OpenAiChatClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiChatClient {
    pub fn new(config: &ModelConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_base(&config.api_base)
            .with_api_key(
                config
                    .api_key
                    .clone()
                    .unwrap_or_else(|| "not-needed".to_string()),
            );

        Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Check that the endpoint is reachable and the configured model is
    /// available. Either failure is fatal to session startup.
    pub async fn verify(&self) -> Result<()> {
        let models = self.client.models().list().await.map_err(|e| {
            ChatError::Chat(format!(
                "Endpoint unreachable: {e}. Is the model server running?"
            ))
        })?;

        let available: Vec<String> = models.data.into_iter().map(|m| m.id).collect();
        if !available.iter().any(|id| id == &self.model) {
            return Err(ChatError::Config(format!(
                "Model '{}' is not available. Pull it first, or pick one of: {}",
                self.model,
                available.join(", ")
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn complete(&self, messages: &[Message], tools: &[Value]) -> Result<ModelReply> {
        let mut request_builder = CreateChatCompletionRequestArgs::default();
        request_builder
            .model(&self.model)
            .messages(to_request_messages(messages)?)
            .temperature(self.temperature)
            .max_completion_tokens(self.max_tokens);

        if !tools.is_empty() {
            let tools: Vec<ChatCompletionTool> = tools
                .iter()
                .map(|t| {
                    serde_json::from_value(t.clone())
                        .map_err(|e| ChatError::Chat(format!("Invalid tool spec: {e}")))
                })
                .collect::<Result<Vec<_>>>()?;
            request_builder.tools(tools);
        }

        let request = request_builder
            .build()
            .map_err(|e| ChatError::Chat(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| ChatError::Chat(e.to_string()))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::Chat("No choices in response".into()))?;

        let content = choice.message.content.filter(|c| !c.is_empty());
        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(from_wire_tool_call)
            .collect::<Result<Vec<_>>>()?;

        debug!(
            content = content.as_deref().unwrap_or(""),
            tool_calls = tool_calls.len(),
            "Model reply"
        );

        Ok(ModelReply {
            content,
            tool_calls,
        })
    }
}

/// Convert our message log to async-openai request messages.
fn to_request_messages(messages: &[Message]) -> Result<Vec<ChatCompletionRequestMessage>> {
    let mut result = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg {
            Message::System { content } => {
                let m = ChatCompletionRequestSystemMessageArgs::default()
                    .content(content.as_str())
                    .build()
                    .map_err(|e| ChatError::Chat(e.to_string()))?;
                result.push(ChatCompletionRequestMessage::System(m));
            }
            Message::User { content } => {
                let m = ChatCompletionRequestUserMessageArgs::default()
                    .content(content.as_str())
                    .build()
                    .map_err(|e| ChatError::Chat(e.to_string()))?;
                result.push(ChatCompletionRequestMessage::User(m));
            }
            Message::Assistant {
                content,
                tool_calls,
            } => {
                let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                if let Some(content) = content {
                    builder.content(content.as_str());
                }
                if !tool_calls.is_empty() {
                    let tc: Vec<ChatCompletionMessageToolCall> = tool_calls
                        .iter()
                        .map(|tc| ChatCompletionMessageToolCall {
                            id: tc.id.clone(),
                            r#type: ChatCompletionToolType::Function,
                            function: FunctionCall {
                                name: tc.name.clone(),
                                arguments: tc.arguments.to_string(),
                            },
                        })
                        .collect();
                    builder.tool_calls(tc);
                }
                let m = builder
                    .build()
                    .map_err(|e| ChatError::Chat(e.to_string()))?;
                result.push(ChatCompletionRequestMessage::Assistant(m));
            }
            Message::Tool {
                call_id, content, ..
            } => {
                let m = ChatCompletionRequestToolMessageArgs::default()
                    .tool_call_id(call_id.as_str())
                    .content(content.as_str())
                    .build()
                    .map_err(|e| ChatError::Chat(e.to_string()))?;
                result.push(ChatCompletionRequestMessage::Tool(m));
            }
        }
    }

    Ok(result)
}

/// Convert a wire tool call into ours. Arguments arrive as a JSON string;
/// a reply we cannot parse fails the turn rather than reaching a provider.
fn from_wire_tool_call(tc: ChatCompletionMessageToolCall) -> Result<ToolCall> {
    let arguments: Value = serde_json::from_str(&tc.function.arguments).map_err(|e| {
        ChatError::Chat(format!(
            "Model emitted malformed arguments for tool '{}': {e}",
            tc.function.name
        ))
    })?;
    let id = if tc.id.is_empty() {
        // Some backends omit call ids; synthesise one so tool results
        // still correlate.
        Uuid::new_v4().to_string()
    } else {
        tc.id
    };
    Ok(ToolCall {
        id,
        name: tc.function.name,
        arguments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire_call(id: &str, name: &str, arguments: &str) -> ChatCompletionMessageToolCall {
        ChatCompletionMessageToolCall {
            id: id.into(),
            r#type: ChatCompletionToolType::Function,
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    #[test]
    fn test_request_message_conversion() {
        let messages = vec![
            Message::system("Be terse."),
            Message::user("weather in Oslo?"),
            Message::assistant_with_tool_calls(
                None,
                vec![ToolCall {
                    id: "c1".into(),
                    name: "get_weather".into(),
                    arguments: json!({"city": "Oslo"}),
                }],
            ),
            Message::tool_result("c1", "get_weather", "12C"),
        ];

        let converted = to_request_messages(&messages).unwrap();
        assert_eq!(converted.len(), 4);
        match &converted[2] {
            ChatCompletionRequestMessage::Assistant(m) => {
                let calls = m.tool_calls.as_ref().unwrap();
                assert_eq!(calls[0].id, "c1");
                assert_eq!(calls[0].function.name, "get_weather");
            }
            other => panic!("expected assistant message, got {other:?}"),
        }
        match &converted[3] {
            ChatCompletionRequestMessage::Tool(m) => assert_eq!(m.tool_call_id, "c1"),
            other => panic!("expected tool message, got {other:?}"),
        }
    }

    #[test]
    fn test_wire_tool_call_parsing() {
        let call = from_wire_tool_call(wire_call("c9", "lookup", r#"{"q":"rust"}"#)).unwrap();
        assert_eq!(call.id, "c9");
        assert_eq!(call.arguments, json!({"q": "rust"}));

        // Missing ids get synthesised so results still correlate.
        let call = from_wire_tool_call(wire_call("", "lookup", "{}")).unwrap();
        assert!(!call.id.is_empty());

        let err = from_wire_tool_call(wire_call("c1", "lookup", "not json")).unwrap_err();
        assert!(matches!(err, ChatError::Chat(_)));
    }
}
