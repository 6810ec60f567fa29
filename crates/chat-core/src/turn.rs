use crate::chat::ChatClient;
use crate::error::{ChatError, Result};
use crate::registry::ToolRegistry;
use crate::types::{ConversationLog, Message, ToolCall, TurnEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default cap on tool-call rounds within a single turn. A misbehaving model
/// that keeps requesting tools fails with `ChatError::LoopLimit` instead of
/// looping forever.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 20;

/// Drives one turn to completion: query the model, resolve any requested
/// tool calls, and repeat until the model answers in plain text.
///
/// Tool calls execute strictly sequentially, in the order the model emitted
/// them. The chat API expects results in issue order, and a later call may
/// depend on an earlier result already being visible in the log.
pub struct TurnExecutor {
    chat: Arc<dyn ChatClient>,
    registry: Arc<ToolRegistry>,
    max_tool_rounds: usize,
}

impl TurnExecutor {
    pub fn new(chat: Arc<dyn ChatClient>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            chat,
            registry,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_max_tool_rounds(mut self, max_tool_rounds: usize) -> Self {
        self.max_tool_rounds = max_tool_rounds;
        self
    }

    /// Run the turn against the given log. On success the log ends with the
    /// final assistant answer, which is also returned. On a per-turn error
    /// the log is left exactly as it was at the point of failure.
    pub async fn run(
        &self,
        log: &mut ConversationLog,
        events: &mpsc::UnboundedSender<TurnEvent>,
    ) -> Result<Message> {
        let tools = self.registry.as_model_tools();

        for round in 1..=self.max_tool_rounds {
            debug!(round, "Querying model");
            let reply = self.chat.complete(log.messages(), &tools).await?;

            let assistant = Message::assistant_with_tool_calls(reply.content, reply.tool_calls);
            let calls = assistant.tool_calls().to_vec();
            log.push(assistant.clone());

            if calls.is_empty() {
                return Ok(assistant);
            }

            for call in &calls {
                self.execute_call(call, log, events).await?;
            }
        }

        warn!(
            rounds = self.max_tool_rounds,
            "Model kept requesting tools; aborting turn"
        );
        Err(ChatError::LoopLimit(self.max_tool_rounds))
    }

    /// Execute one tool call and append its result to the log.
    ///
    /// An unknown tool name is fatal to the turn: nothing is appended for
    /// the failed call. A provider rejection is relayed into the log as the
    /// tool's result so the model can recover; a transport failure aborts.
    async fn execute_call(
        &self,
        call: &ToolCall,
        log: &mut ConversationLog,
        events: &mpsc::UnboundedSender<TurnEvent>,
    ) -> Result<()> {
        let Some(entry) = self.registry.lookup(&call.name) else {
            return Err(ChatError::ToolNotFound(call.name.clone()));
        };

        debug!(tool = %call.name, args = %call.arguments, "Executing tool");
        let _ = events.send(TurnEvent::ToolCallStart {
            name: call.name.clone(),
        });

        match entry
            .provider
            .call_tool(&call.name, call.arguments.clone())
            .await
        {
            Ok(text) => {
                let _ = events.send(TurnEvent::ToolResult {
                    name: call.name.clone(),
                    content: text.clone(),
                    is_error: false,
                });
                log.push(Message::tool_result(&call.id, &call.name, text));
                Ok(())
            }
            Err(err @ ChatError::ToolRejected { .. }) => {
                warn!(tool = %call.name, "{err}");
                let text = err.to_string();
                let _ = events.send(TurnEvent::ToolResult {
                    name: call.name.clone(),
                    content: text.clone(),
                    is_error: true,
                });
                log.push(Message::tool_result(&call.id, &call.name, text));
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}
