use crate::error::Result;
use crate::types::ToolDescriptor;
use async_trait::async_trait;
use serde_json::Value;

/// An external tool provider reachable over a request/response protocol.
///
/// The transport behind this trait is out of the core's hands; what the core
/// relies on is the contract: `list_tools` yields the provider's declared
/// tools once at connection time, and `call_tool` returns the tool's textual
/// output or a `ChatError` distinguishable by kind (`ToolTransport` for the
/// connection layer, `ToolRejected` for application-level failures). Errors
/// are never swallowed here.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Provider name, used in diagnostics and collision reports.
    fn name(&self) -> &str;

    /// List the tools this provider serves.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;

    /// Invoke a named tool with structured arguments.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String>;
}
