use anyhow::Result;
use chat_core::config::AppConfig;
use chat_core::registry::ToolRegistry;
use chat_core::session::ChatSession;
use chat_core::types::TurnEvent;
use rustyline::error::ReadlineError;
use rustyline::{Config as RlConfig, DefaultEditor};
use std::sync::Arc;
use tokio::sync::mpsc;

const BANNER: &str = r#"
  ╔═══════════════════════════════════════════╗
  ║             mcp-chat v0.1.0               ║
  ║   Tool-calling chat over MCP servers      ║
  ╚═══════════════════════════════════════════╝

  Type your message and press Enter to chat.
  Commands:
    /tools         — List available tools
    /config        — Show current config
    /help          — Show this help
    /exit          — Quit (or type "quit")
"#;

/// Run the interactive loop. A per-turn error is reported and the loop
/// keeps going; only the quit commands (or EOF) end the session.
pub async fn run(
    mut session: ChatSession,
    registry: Arc<ToolRegistry>,
    config: &AppConfig,
) -> Result<()> {
    println!("{}", BANNER);
    println!(
        "  Model: {}  |  Endpoint: {}  |  Tools: {}",
        config.model.model,
        config.model.api_base,
        registry.len()
    );
    println!();

    let rl_config = RlConfig::builder().auto_add_history(true).build();
    let history_path = AppConfig::data_dir().join("repl_history.txt");
    let mut rl = DefaultEditor::with_config(rl_config)?;
    let _ = rl.load_history(&history_path);

    loop {
        match rl.readline("\x1b[1;32m❯\x1b[0m ") {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }

                if input.starts_with('/') {
                    if !handle_command(input, &registry, config)? {
                        break; // /exit
                    }
                    continue;
                }

                // Reserved token: a bare "quit" ends the session cleanly.
                if input.eq_ignore_ascii_case("quit") {
                    println!("Goodbye!");
                    break;
                }

                // Print tool progress as it happens; the channel closes when
                // the turn is done, so the printer drains fully before the
                // final answer is shown.
                let (tx, mut rx) = mpsc::unbounded_channel::<TurnEvent>();
                let printer = tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        print_event(&event);
                    }
                });

                let outcome = session.handle_turn(input, tx).await;
                let _ = printer.await;

                match outcome {
                    Ok(answer) => {
                        println!("\x1b[1;33massistant\x1b[0m: {}", answer);
                    }
                    Err(e) => {
                        // The conversation so far is preserved; just this
                        // turn failed.
                        eprintln!("\x1b[0;31mError: {}\x1b[0m", e);
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = rl.save_history(&history_path);

    Ok(())
}

fn print_event(event: &TurnEvent) {
    match event {
        TurnEvent::ToolCallStart { name } => {
            println!("  \x1b[0;35m⚡ Calling tool: {}\x1b[0m", name);
        }
        TurnEvent::ToolResult {
            name: _,
            content,
            is_error,
        } => {
            let status = if *is_error {
                "\x1b[0;31m✗\x1b[0m"
            } else {
                "\x1b[0;32m✓\x1b[0m"
            };
            println!("  {} {}", status, preview(content, 200).replace('\n', "\n    "));
        }
        TurnEvent::HookInjected { content } => {
            println!("  \x1b[2m✦ hook: {}\x1b[0m", preview(content, 120));
        }
    }
}

/// First `max` characters of `text`, with an ellipsis when truncated.
fn preview(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}

/// Handle a slash command. Returns `true` to continue the loop, `false` to
/// exit.
fn handle_command(input: &str, registry: &ToolRegistry, config: &AppConfig) -> Result<bool> {
    let cmd = input.split_whitespace().next().unwrap_or(input);

    match cmd {
        "/exit" | "/quit" | "/q" => {
            println!("Goodbye!");
            return Ok(false);
        }
        "/tools" => {
            if registry.is_empty() {
                println!("  No tools registered.");
            } else {
                println!("  Available tools ({}):", registry.len());
                for descriptor in registry.descriptors() {
                    println!("    • {} — {}", descriptor.name, descriptor.description);
                }
            }
        }
        "/config" => {
            let toml_str = toml::to_string_pretty(config)?;
            println!("{}", toml_str);
        }
        "/help" | "/?" => {
            println!("  /tools         — List available tools");
            println!("  /config        — Show current config");
            println!("  /help          — Show this help");
            println!("  /exit          — Quit (or type \"quit\")");
        }
        _ => {
            println!(
                "Unknown command: {}. Type /help for available commands.",
                cmd
            );
        }
    }

    Ok(true)
}
