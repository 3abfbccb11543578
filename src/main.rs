//! smartnic-agent entry point.
//!
//! ## CLI Subcommands
//!
//! - `smartnic-agent run` - Loopback demo of the packet path (default)
//! - `smartnic-agent infer` - One direct inference
//! - `smartnic-agent bench` - Inference latency benchmark
//! - `smartnic-agent config` - Show or validate configuration

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use smartnic_agent::cli::{self, config_cmd, flag_number, flag_value, EXIT_CONFIG, EXIT_FAILURE};
use smartnic_agent::config as agent_config;
use smartnic_agent::telemetry::{self, LogConfig};
use smartnic_agent::AgentConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("run");

    match command {
        "run" | "" => {
            if let Err(code) = init_logging() {
                return exit(code);
            }
            let config = match load_config(&args) {
                Ok(config) => config,
                Err(code) => return exit(code),
            };
            let packets = match flag_number(&args, "--packets", 8) {
                Ok(n) => n,
                Err(msg) => return usage_error(&msg, "run"),
            };
            exit(cli::run_demo(config, packets).await)
        }
        "infer" => {
            if let Err(code) = init_logging() {
                return exit(code);
            }
            let config = match load_config(&args) {
                Ok(config) => config,
                Err(code) => return exit(code),
            };
            let prompt = match flag_value(&args, "--prompt") {
                Ok(Some(p)) if !p.is_empty() => p.to_string(),
                Ok(_) => return usage_error("Missing --prompt", "infer"),
                Err(msg) => return usage_error(&msg, "infer"),
            };
            let max_tokens = match flag_number(&args, "--max-tokens", 0) {
                Ok(n) => n,
                Err(msg) => return usage_error(&msg, "infer"),
            };
            exit(cli::run_infer(config, &prompt, max_tokens).await)
        }
        "bench" => {
            if let Err(code) = init_logging() {
                return exit(code);
            }
            let config = match load_config(&args) {
                Ok(config) => config,
                Err(code) => return exit(code),
            };
            let iterations = match flag_number(&args, "--iterations", 100) {
                Ok(n) => n,
                Err(msg) => return usage_error(&msg, "bench"),
            };
            let latency_ms = match flag_number(&args, "--latency-ms", 0) {
                Ok(n) => n as u64,
                Err(msg) => return usage_error(&msg, "bench"),
            };
            exit(cli::run_bench(config, iterations, Duration::from_millis(latency_ms)).await)
        }
        "config" => {
            let file = match flag_value(&args, "--file") {
                Ok(file) => file.map(Path::new),
                Err(msg) => return usage_error(&msg, "config"),
            };
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" | "--file" => exit(config_cmd::run_show(file)),
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => exit(config_cmd::run_validate(file)),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("smartnic-agent {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn exit(code: i32) -> ExitCode {
    ExitCode::from(code.clamp(0, 255) as u8)
}

fn usage_error(message: &str, command: &str) -> ExitCode {
    eprintln!("{}", message);
    print_command_help(command);
    exit(EXIT_FAILURE)
}

fn init_logging() -> Result<(), i32> {
    let config = LogConfig::from_env().map_err(|e| {
        eprintln!("Logging configuration error: {}", e);
        EXIT_CONFIG
    })?;
    telemetry::init_logging(&config).map_err(|e| {
        eprintln!("Failed to initialize logging: {}", e);
        EXIT_CONFIG
    })?;
    Ok(())
}

fn load_config(args: &[String]) -> Result<AgentConfig, i32> {
    match flag_value(args, "--config") {
        Ok(None) => Ok(agent_config::load()),
        Ok(Some(path)) => agent_config::load_file(path).map_err(|e| {
            eprintln!("Configuration error: {}", e);
            EXIT_CONFIG
        }),
        Err(msg) => {
            eprintln!("{}", msg);
            Err(EXIT_CONFIG)
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "smartnic-agent - SmartNIC packet offload with bounded-latency inference v{}

USAGE:
    smartnic-agent [COMMAND] [OPTIONS]

COMMANDS:
    run          Loopback demo of the full packet path (default)
    infer        Run one inference
    bench        Measure inference latency and throughput
    config       Manage configuration (show, defaults, validate)
    version      Show version information
    help         Show this help message

OPTIONS:
    -h, --help       Show help for command
    -V, --version    Show version information
    --config FILE    Load configuration overrides from a TOML file

EXAMPLES:
    smartnic-agent run --packets 16
    smartnic-agent infer --prompt \"Hello\" --max-tokens 20
    smartnic-agent bench --iterations 100
    smartnic-agent config validate --file agent.toml

ENVIRONMENT:
    SMARTNIC_*           Agent configuration (see `smartnic-agent config defaults`)
    SMARTNIC_LOG         Log filter (default: info)
    SMARTNIC_LOG_FORMAT  json or pretty (default: json)
    SMARTNIC_LOG_FILE    Write logs to this file instead of stderr

EXIT CODES:
    0  Success
    1  Failure
    2  Configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "run" => {
            eprintln!(
                "smartnic-agent run - Loopback demo

USAGE:
    smartnic-agent run [--packets N] [--config FILE]

OPTIONS:
    --packets N    Request frames to inject (default: 8)
    --config FILE  Configuration overrides

DESCRIPTION:
    Opens the configured device on the in-memory loopback driver, injects
    N inference request frames and one plain frame, and prints each
    response frame followed by the model info and packet counters.
"
            );
        }
        "infer" => {
            eprintln!(
                "smartnic-agent infer - Run inference

USAGE:
    smartnic-agent infer --prompt <PROMPT> [--max-tokens N]

OPTIONS:
    --prompt <PROMPT>  Input text
    --max-tokens <N>   Maximum tokens to generate (default: SMARTNIC_DEFAULT_MAX_TOKENS)
    --config FILE      Configuration overrides

EXIT CODES:
    0  Inference completed
    1  Inference failed, timed out or was rejected
"
            );
        }
        "bench" => {
            eprintln!(
                "smartnic-agent bench - Latency benchmark

USAGE:
    smartnic-agent bench [--iterations N] [--latency-ms MS]

OPTIONS:
    --iterations N    Timed iterations after 10 warmup runs (default: 100)
    --latency-ms MS   Simulated provider latency (default: 0)
    --config FILE     Configuration overrides

DESCRIPTION:
    Reports mean, median, min, max and standard deviation of the
    end-to-end latency, and the resulting throughput.
"
            );
        }
        "config" => {
            eprintln!(
                "smartnic-agent config - Manage configuration

USAGE:
    smartnic-agent config <SUBCOMMAND> [--file PATH]

SUBCOMMANDS:
    show           Show effective configuration
    validate       Check configuration for problems
    defaults       Show default configuration

EXAMPLES:
    smartnic-agent config show
    smartnic-agent config validate --file agent.toml
    smartnic-agent config defaults
"
            );
        }
        _ => {
            eprintln!(
                "No detailed help available for '{}'. Use 'smartnic-agent help' for general usage.",
                command
            );
        }
    }
}
