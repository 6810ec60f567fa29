pub mod chat;
pub mod config;
pub mod error;
pub mod hook;
pub mod provider;
pub mod registry;
pub mod session;
pub mod turn;
pub mod types;

pub use chat::{ChatClient, ModelReply, OpenAiChatClient};
pub use config::AppConfig;
pub use error::ChatError;
pub use hook::{HookRunner, HookSpec};
pub use provider::ToolProvider;
pub use registry::ToolRegistry;
pub use session::{ChatSession, SessionOptions};
pub use turn::TurnExecutor;

#[cfg(test)]
pub(crate) mod testing;
