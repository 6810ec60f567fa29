use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chat API error: {0}")]
    Chat(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool name collision: '{name}' is declared by both '{first}' and '{second}'")]
    DuplicateTool {
        name: String,
        first: String,
        second: String,
    },

    #[error("Tool provider '{server}' transport error: {message}")]
    ToolTransport { server: String, message: String },

    #[error("Tool '{tool}' failed: {message}")]
    ToolRejected { tool: String, message: String },

    #[error("Tool-call loop exceeded {0} rounds without a final answer")]
    LoopLimit(usize),

    #[error("Hook error: {0}")]
    Hook(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// Whether this error came from the transport/connection layer rather
    /// than an application-level rejection. Transport failures abort the
    /// turn; rejections can be relayed back to the model.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Chat(_) | Self::ToolTransport { .. } | Self::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
