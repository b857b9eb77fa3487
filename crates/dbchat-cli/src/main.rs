//! dbchat CLI - chat front end
//!
//! Two modes: an interactive REPL (default) and a scripted demo that runs
//! a handful of database queries end to end. Chat output goes to stdout;
//! logging goes to stderr so it never interleaves with the prompt.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use dbchat_core::{ChatClient, GenAIProvider, ModelProvider, DEFAULT_CONFIG_PATH, SYSTEM_PROMPT};

#[derive(Parser)]
#[command(name = "dbchat")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Chat with your database through MCP tool backends", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the backend registry file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Model to use (defaults to the provider's default)
    #[arg(short, long)]
    model: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat mode
    Chat,

    /// Run the scripted demo queries
    Demo,
}

/// Queries exercised by `dbchat demo`
const DEMO_QUERIES: [&str; 6] = [
    "What tables are in my database?",
    "Show me all users in the database",
    "What's the average age of users?",
    "Search for users with email containing 'test'",
    "Add a new user named Demo User with email demo4@example.com and age 28",
    "Show me users created today",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Warn-level by default so log lines do not interfere with the prompt;
    // --verbose opens up core diagnostics.
    tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose {
            EnvFilter::new("info,dbchat_core=debug")
        } else {
            EnvFilter::new("warn")
        })
        .with_writer(std::io::stderr)
        .init();

    let provider: Arc<dyn ModelProvider> = Arc::new(
        GenAIProvider::new(cli.model.as_deref()).with_system_prompt(SYSTEM_PROMPT),
    );

    match cli.command {
        Some(Commands::Demo) => run_demo(&cli.config, provider).await,
        Some(Commands::Chat) | None => run_chat(&cli.config, provider).await,
    }
}

async fn bootstrap(config: &Path, provider: Arc<dyn ModelProvider>) -> anyhow::Result<ChatClient> {
    match ChatClient::bootstrap(config, provider).await {
        Ok(client) => {
            println!(
                "{} {} backend server(s), {} healthy",
                style("ready.").green(),
                client.sessions().len(),
                client.sessions().healthy_count()
            );
            Ok(client)
        }
        Err(e) => {
            eprintln!("{} {}", style("failed to initialize:").red(), e);
            std::process::exit(1);
        }
    }
}

async fn run_chat(config: &Path, provider: Arc<dyn ModelProvider>) -> anyhow::Result<()> {
    println!("{}", style("dbchat").bold());
    let mut client = bootstrap(config, provider).await?;
    println!("Type /help for commands, /quit to exit.\n");

    let mut rl = rustyline::DefaultEditor::new()?;
    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(input);

                if let Some(command) = input.strip_prefix('/') {
                    if !handle_command(command, &mut client) {
                        break;
                    }
                    continue;
                }

                let reply = client.send(input).await;
                println!("\n{} {}\n", style("assistant>").cyan(), reply);
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                // Interrupt aborts only the pending input read.
                println!("use /quit to exit");
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("input error: {}", e);
                break;
            }
        }
    }

    client.shutdown().await;
    println!("goodbye");
    Ok(())
}

/// Handle a slash command; returns false when the REPL should exit.
fn handle_command(command: &str, client: &mut ChatClient) -> bool {
    match command.trim().to_lowercase().as_str() {
        "quit" | "exit" => false,
        "clear" => {
            client.clear_history();
            println!("conversation cleared\n");
            true
        }
        "metrics" => {
            print_metrics(client);
            true
        }
        "help" => {
            println!("\navailable commands:");
            println!("  /clear    - clear the conversation");
            println!("  /metrics  - show system metrics");
            println!("  /help     - show this help");
            println!("  /quit     - exit\n");
            true
        }
        other => {
            println!("unknown command: /{}\n", other);
            true
        }
    }
}

fn print_metrics(client: &ChatClient) {
    println!("\n{}", style("system metrics").bold());
    if let Value::Object(map) = client.metrics_summary() {
        for (key, value) in map {
            println!("  {}: {}", key, value);
        }
    }
    println!();
}

async fn run_demo(config: &Path, provider: Arc<dyn ModelProvider>) -> anyhow::Result<()> {
    println!("{}", style("dbchat demo").bold());
    let mut client = bootstrap(config, provider).await?;

    for (i, query) in DEMO_QUERIES.iter().enumerate() {
        println!("\n{} {}", style(format!("query {}:", i + 1)).bold(), query);
        let reply = client.send(query).await;
        println!("{} {}", style("assistant>").cyan(), reply);
    }

    println!("\n{}", style("metrics").bold());
    println!("{}", serde_json::to_string_pretty(&client.metrics_summary())?);

    client.shutdown().await;
    Ok(())
}
