//! Command execution.

use crate::Commands;
use colored::Colorize;
use rcond_client::Client;

/// Executes a one-shot command on a logged-in client and returns the
/// formatted output.
pub async fn execute(client: &Client, cmd: Commands) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Repl => unreachable!(),

        Commands::Check => Ok("Authenticated".green().to_string()),

        Commands::Exec { command } => {
            let line = join_command(&command);
            if line.is_empty() {
                return Err("empty command".into());
            }
            let output = client.command(&line).await?;
            Ok(format_output(&output))
        }
    }
}

/// Joins shell words back into one command line.
pub fn join_command(words: &[String]) -> String {
    words.join(" ").trim().to_string()
}

/// Normalizes server line endings for the terminal.
pub fn format_output(output: &str) -> String {
    if output.is_empty() {
        return "(no output)".dimmed().to_string();
    }
    output.replace("\r\n", "\n")
}
