//! rcond-cli - Command-line RCON client
//!
//! Provides both a REPL and one-shot command execution.

mod commands;
mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use rcond_client::{Client, ClientError, ConnectionConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rcond-cli")]
#[command(about = "Command-line client for Source RCON servers")]
#[command(version)]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:19132")]
    server: SocketAddr,

    /// RCON password
    #[arg(short, long, env = "RCOND_PASSWORD", hide_env_values = true)]
    password: String,

    /// Seconds to wait for a command response
    #[arg(long, default_value = "30")]
    timeout: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Start interactive REPL
    Repl,

    /// Log in and exit
    Check,

    /// Run one command
    Exec {
        /// Command words, joined with spaces
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let config =
        ConnectionConfig::new(cli.server).with_request_timeout(Duration::from_secs(cli.timeout));
    let client = Client::new(config);

    match cli.command {
        Some(Commands::Repl) | None => {
            repl::run(client, cli.server, &cli.password).await?;
        }
        Some(cmd) => {
            connect_and_login(&client, &cli.password).await?;

            match commands::execute(&client, cmd).await {
                Ok(output) => println!("{}", output),
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }

            client.close().await?;
        }
    }

    Ok(())
}

/// Connects and logs in, printing a readable reason on failure.
pub(crate) async fn connect_and_login(client: &Client, password: &str) -> Result<(), ClientError> {
    let addr = client.connection().config().addr;

    client.connect().await.map_err(|e| {
        eprintln!("{}: {}", "Connection failed".red(), e);
        e
    })?;

    tracing::debug!("Logging in to {}", addr);
    client.login(password).await.map_err(|e| {
        match e {
            ClientError::AuthFailed => eprintln!("{}", "Wrong password".red()),
            ref other => eprintln!("{}: {}", "Login failed".red(), other),
        }
        e
    })?;

    tracing::debug!("Logged in to {}", addr);
    Ok(())
}
