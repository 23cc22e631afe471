//! Command-line arguments, each with an environment fallback

use std::time::Duration;

use clap::{Parser, ValueEnum};

use multivisor_core::application::constants::DEFAULT_POLL_PERIOD;
use multivisor_infra_config::DEFAULT_CONFIG_PATH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "UPPER")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Default `EnvFilter` directive for the multivisor crates
    pub fn directive(self) -> String {
        let level = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        format!("multivisor={}", level)
    }
}

#[derive(Debug, Parser)]
#[command(name = "multivisor")]
#[command(about = "Aggregates many supervisord instances behind one control surface", long_about = None)]
#[command(version)]
pub struct Args {
    /// Listen port for the JSON-RPC control surface
    #[arg(long, env = "MULTIVISOR_PORT", default_value_t = 22000)]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "MULTIVISOR_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// INI configuration file
    #[arg(short, long, env = "MULTIVISOR_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    #[arg(long, env = "MULTIVISOR_LOG_LEVEL", value_enum, default_value_t = LogLevel::Info, ignore_case = true)]
    pub log_level: LogLevel,

    /// Seconds between the end of one poll cycle and the start of the next [default: 2.0]
    #[arg(long, env = "MULTIVISOR_POLL_PERIOD", value_parser = parse_period)]
    pub poll_period: Option<Duration>,
}

impl Args {
    pub fn poll_period(&self) -> Duration {
        self.poll_period.unwrap_or(DEFAULT_POLL_PERIOD)
    }
}

fn parse_period(raw: &str) -> Result<Duration, String> {
    let seconds: f64 = raw
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", raw))?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(format!("poll period must be positive, got {}", raw));
    }
    Ok(Duration::from_secs_f64(seconds))
}
