//! dbchat-server - SQLite database MCP backend
//!
//! Speaks MCP over stdio. stdout carries the protocol, so every log line
//! goes to stderr.

mod database;
mod tools;

use std::path::Path;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use dbchat_mcp::server::{serve_stdio, McpServer};

use database::Database;
use tools::DatabaseHandler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("starting MCP server - SQLite database");

    let db = Database::open(Path::new(database::DB_PATH))?;
    if db.initialize()? {
        info!("sample data initialized");
    }

    for tool in tools::tool_definitions() {
        info!(tool = %tool.name, "registered");
    }
    info!("server ready for MCP connections on stdio");

    let server =
        McpServer::new(Arc::new(DatabaseHandler::new(db))).with_name("SQLite Database Server");
    serve_stdio(server).await?;

    Ok(())
}
