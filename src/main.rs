use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use toolgate::logging::{init_tracing, LogFormat};
use toolgate::{GatewayError, GatewayOptions, ToolGateway};

#[derive(Parser)]
#[command(name = "toolgate")]
#[command(version)]
#[command(about = "Uniform tool catalogue and dispatcher over MCP-style backends")]
#[command(long_about = "\
Uniform tool catalogue and dispatcher over MCP-style backends

toolgate reads an mcpServers JSON file, discovers the tools every backend
offers, and exposes them as function-calling schemas. Tool calls are routed
to the owning backend, rate limited, and bounded by a deadline.

TYPICAL WORKFLOWS:

    toolgate --config servers.json list
    toolgate --config servers.json list --tool add --tool search
    toolgate --config servers.json call add --args '{\"a\": 2, \"b\": 3}'
")]
struct Cli {
    /// Path to the mcpServers configuration file
    #[arg(long, env = "TOOLGATE_CONFIG")]
    config: PathBuf,

    /// Tool calls allowed per second (also the burst size)
    #[arg(long, default_value_t = 10.0)]
    rate_limit: f64,

    /// Per-backend discovery timeout in seconds
    #[arg(long, default_value_t = 30.0)]
    discovery_timeout: f64,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Write logs to this file instead of stderr
    #[arg(long, env = "TOOLGATE_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover tools and print their function schemas as JSON
    ///
    /// Example:
    ///
    ///  $ toolgate --config servers.json list --tool add
    ///
    List {
        /// Only include these tools (repeatable; default: all)
        #[arg(long = "tool")]
        tools: Vec<String>,
    },

    /// Call one tool and print its result as JSON
    ///
    /// Example:
    ///
    ///  $ toolgate --config servers.json call add --args '{"a": 2, "b": 3}'
    ///
    Call {
        /// Tool name
        name: String,

        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,

        /// Deadline for the call in seconds
        #[arg(long, default_value_t = 30.0)]
        timeout: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_format, cli.log_file.as_deref())
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    let options = GatewayOptions {
        discovery_timeout: seconds(cli.discovery_timeout, "--discovery-timeout")?,
        ..GatewayOptions::default()
    };
    let gateway = ToolGateway::with_options(options);

    report_failures(&gateway.initialize(&cli.config, cli.rate_limit).await);

    match cli.command {
        Commands::List { tools } => {
            let report = gateway.discover(&tools).await?;
            report_failures(&report.failures);
            println!("{}", serde_json::to_string_pretty(&report.schemas)?);
        }
        Commands::Call {
            name,
            args,
            timeout,
        } => {
            let arguments: serde_json::Value =
                serde_json::from_str(&args).context("--args is not valid JSON")?;
            let timeout = seconds(timeout, "--timeout")?;

            let report = gateway.discover(&[]).await?;
            report_failures(&report.failures);

            let result = gateway.call_tool(&name, arguments, timeout).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

fn seconds(value: f64, flag: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .ok()
        .filter(|d| !d.is_zero())
        .with_context(|| format!("{flag} must be a positive number of seconds"))
}

fn report_failures(failures: &[GatewayError]) {
    for failure in failures {
        eprintln!("warning: {failure}");
    }
}
