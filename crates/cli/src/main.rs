//! multivisorctl - Command-line interface for the Multivisor daemon

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:22000";

#[derive(Parser)]
#[command(name = "multivisorctl")]
#[command(about = "Multivisor CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "MULTIVISOR_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Show all supervisors and processes
    Status,

    /// Poll every supervisor now, then show status
    Refresh,

    /// Re-read the daemon's configuration file
    Reload,

    /// Show one process, freshly refreshed
    Info {
        /// Process uid (group:name@supervisor)
        uid: String,
    },

    /// Start a process
    Start { uid: String },

    /// Stop a process
    Stop { uid: String },

    /// Restart a process
    Restart { uid: String },
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Tabled)]
struct ProcessRow {
    uid: String,
    state: String,
    host: String,
    description: String,
}

#[derive(Tabled)]
struct SupervisorRow {
    supervisor: String,
    host: String,
    status: String,
    version: String,
    processes: usize,
}

async fn call_rpc(url: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

fn colored_state(state: &str) -> String {
    match state {
        "RUNNING" => state.green().to_string(),
        "STARTING" | "BACKOFF" | "STOPPING" => state.yellow().to_string(),
        "FATAL" | "EXITED" | "UNKNOWN" => state.red().to_string(),
        _ => state.normal().to_string(),
    }
}

fn text(value: &serde_json::Value, key: &str) -> String {
    match &value[key] {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

fn process_row(process: &serde_json::Value) -> ProcessRow {
    ProcessRow {
        uid: text(process, "uid"),
        state: colored_state(&text(process, "statename")),
        host: text(process, "host"),
        description: text(process, "description"),
    }
}

fn print_state(state: &serde_json::Value) {
    println!("{} {}", "Multivisor:".cyan().bold(), text(state, "name"));
    println!();

    let empty = serde_json::Map::new();
    let supervisors = state["supervisors"].as_object().unwrap_or(&empty);

    let summary: Vec<SupervisorRow> = supervisors
        .iter()
        .map(|(name, supervisor)| SupervisorRow {
            supervisor: name.clone(),
            host: format!("{}:{}", text(supervisor, "host"), text(supervisor, "port")),
            status: if supervisor["running"].as_bool().unwrap_or(false) {
                "ONLINE".green().to_string()
            } else {
                "OFFLINE".red().to_string()
            },
            version: text(supervisor, "supervisor_version"),
            processes: supervisor["processes"].as_object().map_or(0, |p| p.len()),
        })
        .collect();
    println!("{}", Table::new(summary));
    println!();

    let rows: Vec<ProcessRow> = supervisors
        .values()
        .filter_map(|supervisor| supervisor["processes"].as_object())
        .flat_map(|processes| processes.values().map(process_row))
        .collect();
    if rows.is_empty() {
        println!("{}", "No processes".yellow());
    } else {
        println!("{}", Table::new(rows));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Status => {
            let state = call_rpc(&cli.rpc_url, "state.get.v1", json!([])).await?;
            print_state(&state);
        }

        Commands::Refresh => {
            let state = call_rpc(&cli.rpc_url, "state.refresh.v1", json!([])).await?;
            print_state(&state);
        }

        Commands::Reload => {
            let result = call_rpc(&cli.rpc_url, "config.reload.v1", json!([])).await?;
            println!(
                "{}",
                format!("✓ Configuration reloaded ({} supervisors)", result["supervisors"])
                    .green()
                    .bold()
            );
        }

        Commands::Info { uid } => {
            let process = call_rpc(&cli.rpc_url, "process.info.v1", json!({ "uid": uid })).await?;
            println!("{}", Table::new(vec![process_row(&process)]));
            println!();
            for key in [
                "pid",
                "start",
                "stop",
                "exitstatus",
                "spawnerr",
                "logfile",
                "stdout_logfile",
                "stderr_logfile",
            ] {
                println!("  {} {}", format!("{}:", key).bold(), text(&process, key));
            }
        }

        Commands::Start { uid } => control(&cli.rpc_url, "process.start.v1", "start", &uid).await?,
        Commands::Stop { uid } => control(&cli.rpc_url, "process.stop.v1", "stop", &uid).await?,
        Commands::Restart { uid } => {
            control(&cli.rpc_url, "process.restart.v1", "restart", &uid).await?
        }
    }

    Ok(())
}

async fn control(url: &str, method: &str, verb: &str, uid: &str) -> Result<()> {
    call_rpc(url, method, json!({ "uid": uid })).await?;
    println!("{}", format!("✓ {} requested for {}", verb, uid).green().bold());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_row_from_state_json() {
        let process = json!({
            "uid": "web:api@lid001",
            "statename": "RUNNING",
            "host": "10.0.0.7",
            "description": "pid 7, uptime 0:01:00",
            "pid": 7,
        });
        let row = process_row(&process);
        assert_eq!(row.uid, "web:api@lid001");
        assert!(row.state.contains("RUNNING"));
        assert_eq!(text(&process, "pid"), "7");
        assert_eq!(text(&process, "missing"), "-");
    }

    #[test]
    fn test_cli_parses_uid_commands() {
        let cli = Cli::try_parse_from(["multivisorctl", "restart", "web:api@lid001"]).unwrap();
        assert!(matches!(cli.command, Commands::Restart { ref uid } if uid == "web:api@lid001"));
        assert_eq!(cli.rpc_url, DEFAULT_RPC_URL);
    }
}
