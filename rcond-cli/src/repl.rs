//! Interactive REPL.

use crate::commands::format_output;
use colored::Colorize;
use rcond_client::Client;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use std::net::SocketAddr;

const HELP_TEXT: &str = r#"
Anything typed is sent to the server as an RCON command.

Local commands:
  .help                         Show this help
  .reconnect                    Reconnect and log in again
  .quit, .exit                  Exit the REPL
"#;

/// A parsed REPL line.
#[derive(Debug, PartialEq, Eq)]
enum ReplLine<'a> {
    Help,
    Reconnect,
    Quit,
    Unknown(&'a str),
    Remote(&'a str),
}

fn parse_line(line: &str) -> ReplLine<'_> {
    match line.strip_prefix('.') {
        Some(local) => match local.trim().to_lowercase().as_str() {
            "help" | "?" => ReplLine::Help,
            "reconnect" => ReplLine::Reconnect,
            "quit" | "exit" | "q" => ReplLine::Quit,
            _ => ReplLine::Unknown(line),
        },
        None => ReplLine::Remote(line),
    }
}

pub async fn run(
    client: Client,
    addr: SocketAddr,
    password: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "rcond CLI".bold().cyan());
    println!("Connecting to {}...", addr);

    crate::connect_and_login(&client, password).await?;
    println!("{}", "Authenticated!".green());

    // Create readline editor
    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    // Load history
    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".rcond_history"))
        .unwrap_or_else(|_| ".rcond_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type '.help' for local commands.\n");

    loop {
        let prompt = format!("{} ", "rcon>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match parse_line(line) {
                    ReplLine::Help => println!("{}", HELP_TEXT),
                    ReplLine::Quit => break,
                    ReplLine::Unknown(cmd) => println!(
                        "Unknown command: {}. Type '.help' for help.\n",
                        cmd
                    ),
                    ReplLine::Reconnect => {
                        let _ = client.close().await;
                        match crate::connect_and_login(&client, password).await {
                            Ok(()) => println!("{}\n", "Reconnected.".green()),
                            Err(_) => println!(),
                        }
                    }
                    ReplLine::Remote(command) => match client.command(command).await {
                        Ok(output) => println!("{}\n", format_output(&output)),
                        Err(e) if e.is_retryable() => {
                            println!(
                                "{}: {} ({})\n",
                                "Connection lost".red(),
                                e,
                                "use .reconnect".dimmed()
                            );
                        }
                        Err(e) => println!("{}: {}\n", "Error".red(), e),
                    },
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    // Save history
    let _ = rl.save_history(&history_path);

    // Disconnect
    let _ = client.close().await;
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local_commands() {
        assert_eq!(parse_line(".help"), ReplLine::Help);
        assert_eq!(parse_line(".QUIT"), ReplLine::Quit);
        assert_eq!(parse_line(".exit"), ReplLine::Quit);
        assert_eq!(parse_line(".reconnect"), ReplLine::Reconnect);
        assert_eq!(parse_line(".nope"), ReplLine::Unknown(".nope"));
    }

    #[test]
    fn test_parse_remote_commands() {
        assert_eq!(parse_line("say hi"), ReplLine::Remote("say hi"));
        // Bare words are never intercepted
        assert_eq!(parse_line("help"), ReplLine::Remote("help"));
    }
}
