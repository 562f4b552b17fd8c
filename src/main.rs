//! rcond - RCON demo host
//!
//! Starts the RCON service and drives it from the main loop, answering
//! commands from a small built-in table.

use rcond_server::{CommandExecutor, Config, RconService, ServiceStats};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// How often the host services the RCON worker.
const TICK_INTERVAL: Duration = Duration::from_millis(50);

const HELP_TEXT: &str = "Commands: help, echo <text>, uptime, stats, stop";

/// Built-in command table of the demo host.
struct DemoHost {
    started: Instant,
    stats: Arc<ServiceStats>,
    stop_requested: bool,
}

impl CommandExecutor for DemoHost {
    fn execute(&mut self, command: &str) -> String {
        let (name, args) = command
            .split_once(char::is_whitespace)
            .unwrap_or((command, ""));

        match name.to_lowercase().as_str() {
            "help" | "?" => HELP_TEXT.to_string(),
            "echo" => args.to_string(),
            "uptime" => format!("Up {}s", self.started.elapsed().as_secs()),
            "stats" => format!(
                "connections: {} total, {} active, {} rejected\nauth failures: {}\ncommands: {}\nworker restarts: {}",
                self.stats.connections_total.load(Ordering::Relaxed),
                self.stats.connections_active.load(Ordering::Relaxed),
                self.stats.connections_rejected.load(Ordering::Relaxed),
                self.stats.auth_failures.load(Ordering::Relaxed),
                self.stats.commands_total.load(Ordering::Relaxed),
                self.stats.worker_restarts.load(Ordering::Relaxed),
            ),
            "stop" => {
                self.stop_requested = true;
                "Stopping the server".to_string()
            }
            _ => format!("Unknown command: {}. Try \"help\".", name),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if RCOND_CONFIG is set, then env overrides)
    let config = match Config::load() {
        Ok(c) => {
            if let Ok(path) = std::env::var("RCOND_CONFIG") {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    if let Err(e) = config.validate() {
        tracing::error!("{}", e);
        return Err(e.into());
    }

    tracing::info!("Starting rcond");
    tracing::info!("  Bind address: {}", config.rcon.bind_addr);
    tracing::info!("  Max clients: {}", config.rcon.max_clients);
    tracing::info!("  Auth timeout: {:?}", config.rcon.auth_timeout());

    let mut service = RconService::start(config.rcon.to_service_config())?;

    let mut host = DemoHost {
        started: Instant::now(),
        stats: service.stats(),
        stop_requested: false,
    };

    let mut interval = tokio::time::interval(TICK_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                service.tick(&mut host);
                if host.stop_requested {
                    tracing::info!("Stop requested over RCON");
                    break;
                }
            }
            _ = &mut ctrl_c => {
                tracing::info!("Received shutdown signal, stopping server...");
                break;
            }
        }
    }

    service.stop();
    tracing::info!("Server stopped");
    Ok(())
}
