mod repl;

use anyhow::Result;
use chat_core::chat::OpenAiChatClient;
use chat_core::config::AppConfig;
use chat_core::hook::HookSpec;
use chat_core::provider::ToolProvider;
use chat_core::registry::ToolRegistry;
use chat_core::session::{ChatSession, SessionOptions};
use chat_mcp::McpClient;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "mcp-chat",
    about = "A tool-calling chat client for local LLMs and MCP servers",
    version,
    author
)]
struct Cli {
    /// Path to config file (default: ~/.config/mcp-chat/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the model name
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Override the API base URL
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive chat (default)
    Chat,

    /// Show or manage configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Initialize default configuration file
    Init,
    /// Print config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "mcp_chat=info,warn".into()))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };

    if let Some(model) = &cli.model {
        config.model.model = model.clone();
    }
    if let Some(api_base) = &cli.api_base {
        config.model.api_base = api_base.clone();
    }

    match cli.command {
        Some(Commands::Config { action }) => handle_config_command(action, &config),
        Some(Commands::Chat) | None => run_chat(config).await,
    }
}

async fn run_chat(config: AppConfig) -> Result<()> {
    let chat = Arc::new(OpenAiChatClient::new(&config.model));
    chat.verify().await?;

    // Connect every configured server before anything else runs; a failure
    // here must not leave earlier providers dangling.
    let mut providers: Vec<Arc<McpClient>> = Vec::new();
    let registry = match connect_providers(&config, &mut providers).await {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            shutdown_providers(&providers).await;
            return Err(e);
        }
    };

    tracing::info!(
        "Loaded {} tools from {} server(s), model: {}, endpoint: {}",
        registry.len(),
        providers.len(),
        config.model.model,
        config.model.api_base,
    );

    let options = SessionOptions {
        system_prompt: config.system_prompt.clone(),
        before_hook: config.hooks.before.clone().map(HookSpec::new),
        after_hook: config.hooks.after.clone().map(HookSpec::new),
        max_tool_rounds: Some(config.turn.max_tool_rounds),
    };
    let session = ChatSession::new(chat, registry.clone(), options);

    let result = repl::run(session, registry, &config).await;
    shutdown_providers(&providers).await;
    result
}

async fn connect_providers(
    config: &AppConfig,
    providers: &mut Vec<Arc<McpClient>>,
) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for server in &config.servers {
        let client = McpClient::connect(
            &server.name,
            &server.command,
            &server.args,
            Duration::from_secs(server.timeout_secs),
        )
        .await?;
        let client = Arc::new(client);
        providers.push(client.clone());

        let tools = client.list_tools().await?;
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        tracing::info!(
            "Connected to server '{}' with tools: {}",
            server.name,
            names.join(", ")
        );
        registry.register_provider(client, tools)?;
    }
    Ok(registry)
}

async fn shutdown_providers(providers: &[Arc<McpClient>]) {
    for provider in providers {
        if let Err(e) = provider.shutdown().await {
            tracing::warn!("Failed to shut down provider '{}': {}", provider.name(), e);
        }
    }
}

fn handle_config_command(action: Option<ConfigAction>, config: &AppConfig) -> Result<()> {
    match action {
        Some(ConfigAction::Show) | None => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{}", toml_str);
        }
        Some(ConfigAction::Init) => {
            let path = AppConfig::default_path();
            if path.exists() {
                println!("Config already exists at: {}", path.display());
            } else {
                config.save()?;
                println!("Created default config at: {}", path.display());
            }
        }
        Some(ConfigAction::Path) => {
            println!("{}", AppConfig::default_path().display());
        }
    }
    Ok(())
}
