use crate::chat::ChatClient;
use crate::error::Result;
use crate::hook::{HookRunner, HookSpec};
use crate::registry::ToolRegistry;
use crate::turn::{TurnExecutor, DEFAULT_MAX_TOOL_ROUNDS};
use crate::types::{ConversationLog, Message, TurnEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Session construction options, taken from configuration.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub system_prompt: Option<String>,
    pub before_hook: Option<HookSpec>,
    pub after_hook: Option<HookSpec>,
    pub max_tool_rounds: Option<usize>,
}

/// One interactive conversation. Owns the message log exclusively — hooks
/// and the turn executor only ever see it through this session — and is
/// built from its dependencies; there is no process-wide state.
pub struct ChatSession {
    log: ConversationLog,
    executor: TurnExecutor,
    hooks: HookRunner,
    before_hook: Option<HookSpec>,
    after_hook: Option<HookSpec>,
}

impl ChatSession {
    pub fn new(
        chat: Arc<dyn ChatClient>,
        registry: Arc<ToolRegistry>,
        options: SessionOptions,
    ) -> Self {
        let log = match &options.system_prompt {
            Some(prompt) => ConversationLog::with_system_prompt(prompt),
            None => ConversationLog::new(),
        };
        let executor = TurnExecutor::new(chat.clone(), registry.clone()).with_max_tool_rounds(
            options.max_tool_rounds.unwrap_or(DEFAULT_MAX_TOOL_ROUNDS),
        );
        let hooks = HookRunner::new(chat, registry);

        Self {
            log,
            executor,
            hooks,
            before_hook: options.before_hook,
            after_hook: options.after_hook,
        }
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    /// Process one user input through to a final answer: before-hook, the
    /// tool-calling turn, after-hook. A failing hook never aborts the turn;
    /// a per-turn error propagates with the log preserved up to the failure
    /// so the conversation context is not lost.
    pub async fn handle_turn(
        &mut self,
        input: &str,
        events: mpsc::UnboundedSender<TurnEvent>,
    ) -> Result<String> {
        if let Some(spec) = self.before_hook.clone() {
            self.run_hook(&spec, input, None, &events).await;
        }

        self.log.push(Message::user(input));
        let answer = self.executor.run(&mut self.log, &events).await?;
        let answer = answer.content_text().unwrap_or_default().to_string();

        if let Some(spec) = self.after_hook.clone() {
            self.run_hook(&spec, input, Some(&answer), &events).await;
        }

        Ok(answer)
    }

    /// Run one hook and apply its injection. Errors degrade to "no injected
    /// message" and are reported as diagnostics only.
    async fn run_hook(
        &mut self,
        spec: &HookSpec,
        user_message: &str,
        assistant_message: Option<&str>,
        events: &mpsc::UnboundedSender<TurnEvent>,
    ) {
        match self.hooks.run(spec, user_message, assistant_message).await {
            Ok(Some(text)) => {
                let _ = events.send(TurnEvent::HookInjected {
                    content: text.clone(),
                });
                self.log.push(Message::assistant(text));
            }
            Ok(None) => {}
            Err(err) => warn!("Hook failed, continuing without injection: {err}"),
        }
    }
}
