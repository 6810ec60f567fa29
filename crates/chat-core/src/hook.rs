use crate::chat::ChatClient;
use crate::error::{ChatError, Result};
use crate::registry::ToolRegistry;
use crate::types::Message;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Prompt template for an auxiliary model query run around the main turn.
/// `{user_message}` is always substituted; `{assistant_message}` only for
/// the after-hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookSpec {
    pub prompt: String,
}

impl HookSpec {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }

    fn render(&self, user_message: &str, assistant_message: Option<&str>) -> String {
        self.prompt
            .replace("{user_message}", user_message)
            .replace("{assistant_message}", assistant_message.unwrap_or(""))
    }
}

/// Runs a hook: a single, isolated model query that may perform at most one
/// tool invocation and yield one injected message.
///
/// Hooks never see the main conversation log; they get a one-message
/// conversation built from the rendered template, with the same tool spec
/// the main turn uses. A hook requesting more than one tool call is a
/// documented limitation — only the first runs, and the rest are reported
/// as dropped rather than silently ignored.
pub struct HookRunner {
    chat: Arc<dyn ChatClient>,
    registry: Arc<ToolRegistry>,
}

impl HookRunner {
    pub fn new(chat: Arc<dyn ChatClient>, registry: Arc<ToolRegistry>) -> Self {
        Self { chat, registry }
    }

    /// Run one hook. `Ok(Some(text))` is the message to inject; `Ok(None)`
    /// means the hook chose not to inject anything.
    pub async fn run(
        &self,
        spec: &HookSpec,
        user_message: &str,
        assistant_message: Option<&str>,
    ) -> Result<Option<String>> {
        let prompt = spec.render(user_message, assistant_message);
        let messages = [Message::user(prompt)];
        let tools = self.registry.as_model_tools();

        let reply = self
            .chat
            .complete(&messages, &tools)
            .await
            .map_err(|e| ChatError::Hook(e.to_string()))?;

        let mut calls = reply.tool_calls.into_iter();
        let Some(call) = calls.next() else {
            // The hook's own commentary is diagnostic only; it never enters
            // the conversation.
            if let Some(commentary) = &reply.content {
                debug!(%commentary, "Hook made no tool call");
            }
            return Ok(None);
        };

        let dropped = calls.count();
        if dropped > 0 {
            warn!(
                dropped,
                "Hook requested multiple tool calls; a hook runs at most one, the rest were dropped"
            );
        }

        let entry = self.registry.lookup(&call.name).ok_or_else(|| {
            ChatError::Hook(format!("hook requested unknown tool '{}'", call.name))
        })?;
        let text = entry
            .provider
            .call_tool(&call.name, call.arguments)
            .await
            .map_err(|e| ChatError::Hook(e.to_string()))?;
        debug!(tool = %call.name, result = %text, "Hook tool result");
        Ok(Some(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ModelReply;
    use crate::testing::{call, descriptor, registry_with, ScriptedChat, StubProvider};
    use serde_json::json;

    #[test]
    fn test_template_rendering() {
        let spec = HookSpec::new("User said: {user_message}. Reply was: {assistant_message}.");
        assert_eq!(
            spec.render("hi", Some("hello")),
            "User said: hi. Reply was: hello."
        );
        assert_eq!(spec.render("hi", None), "User said: hi. Reply was: .");
    }

    #[tokio::test]
    async fn test_tool_call_yields_injected_text() {
        let chat = Arc::new(ScriptedChat::new(vec![ModelReply {
            content: None,
            tool_calls: vec![call("c1", "recall", json!({"topic": "cats"}))],
        }]));
        let provider = Arc::new(
            StubProvider::new("memory", vec![descriptor("recall")])
                .fixed_result("user likes cats"),
        );
        let runner = HookRunner::new(chat.clone(), registry_with(provider));

        let injected = runner
            .run(&HookSpec::new("Recall context for: {user_message}"), "cats?", None)
            .await
            .unwrap();

        assert_eq!(injected.as_deref(), Some("user likes cats"));
        // The hook saw a single-message conversation built from the template.
        let request = chat.request(0);
        assert_eq!(request.len(), 1);
        assert_eq!(request[0].content_text(), Some("Recall context for: cats?"));
    }

    #[tokio::test]
    async fn test_no_tool_call_injects_nothing() {
        let chat = Arc::new(ScriptedChat::new(vec![ModelReply {
            content: Some("nothing relevant".into()),
            tool_calls: vec![],
        }]));
        let provider = Arc::new(StubProvider::new("memory", vec![descriptor("recall")]));
        let runner = HookRunner::new(chat, registry_with(provider));

        let injected = runner
            .run(&HookSpec::new("{user_message}"), "hi", None)
            .await
            .unwrap();
        assert!(injected.is_none());
    }

    #[tokio::test]
    async fn test_only_first_of_several_tool_calls_runs() {
        let chat = Arc::new(ScriptedChat::new(vec![ModelReply {
            content: None,
            tool_calls: vec![
                call("c1", "recall", json!({})),
                call("c2", "recall", json!({})),
                call("c3", "recall", json!({})),
            ],
        }]));
        let provider = Arc::new(
            StubProvider::new("memory", vec![descriptor("recall")]).fixed_result("ctx"),
        );
        let runner = HookRunner::new(chat, registry_with(provider.clone()));

        let injected = runner
            .run(&HookSpec::new("{user_message}"), "hi", None)
            .await
            .unwrap();

        assert_eq!(injected.as_deref(), Some("ctx"));
        assert_eq!(provider.calls_seen().len(), 1);
    }

    #[tokio::test]
    async fn test_failures_surface_as_hook_errors() {
        let chat = Arc::new(ScriptedChat::new(vec![ModelReply {
            content: None,
            tool_calls: vec![call("c1", "recall", json!({}))],
        }]));
        let provider = Arc::new(
            StubProvider::new("memory", vec![descriptor("recall")]).transport_failure("gone"),
        );
        let runner = HookRunner::new(chat, registry_with(provider));

        let err = runner
            .run(&HookSpec::new("{user_message}"), "hi", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Hook(_)));
    }
}
