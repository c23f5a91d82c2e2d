//! nadar-config: check and print the core configuration
//!
//! Usage:
//!   nadar-config validate [--file <path>] [--no-env]   Validate a config file
//!   nadar-config show [--file <path>] [--no-env]       Print the effective config as YAML
//!   nadar-config defaults                              Print the built-in defaults

use anyhow::{bail, Context};
use nadar_core::CoreConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let result = match args[1].as_str() {
        "validate" => cmd_validate(&args[2..]),
        "show" => cmd_show(&args[2..]),
        "defaults" => cmd_defaults(),
        "version" | "--version" | "-V" => {
            println!("nadar-config {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn print_usage() {
    println!(
        r#"nadar-config: inspect nadar-core configuration

USAGE:
    nadar-config <COMMAND> [OPTIONS]

COMMANDS:
    validate [--file <path>] [--no-env]   Load and validate a configuration
    show [--file <path>] [--no-env]       Print the effective configuration as YAML
    defaults                              Print the built-in defaults as YAML
    version                               Show version information
    help                                  Show this help message

ENVIRONMENT:
    NADAR_CONFIG                          Config file used when --file is absent
    NADAR_*                               Per-field overrides (see CoreConfig docs)
    RUST_LOG                              Log filter (default: warn)"#
    );
}

struct LoadOptions {
    file: Option<PathBuf>,
    env: bool,
}

fn parse_options(args: &[String]) -> anyhow::Result<LoadOptions> {
    let mut opts = LoadOptions {
        file: std::env::var("NADAR_CONFIG").ok().map(PathBuf::from),
        env: true,
    };
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--file" | "-f" => {
                let Some(path) = iter.next() else {
                    bail!("--file needs a path");
                };
                opts.file = Some(PathBuf::from(path));
            }
            "--no-env" => opts.env = false,
            other => bail!("unexpected argument: {other}"),
        }
    }
    Ok(opts)
}

fn load(opts: &LoadOptions) -> anyhow::Result<CoreConfig> {
    let mut config = match &opts.file {
        Some(path) => CoreConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => CoreConfig::default(),
    };
    if opts.env {
        config
            .apply_env_overrides()
            .context("applying NADAR_* overrides")?;
    }
    config.validate().context("validating configuration")?;
    Ok(config)
}

fn cmd_validate(args: &[String]) -> anyhow::Result<()> {
    let opts = parse_options(args)?;
    let config = load(&opts)?;
    match &opts.file {
        Some(path) => println!("✓ {} is valid", path.display()),
        None => println!("✓ built-in defaults are valid"),
    }
    println!(
        "  retry: {} attempts, {}ms..{}ms backoff; {} dependency override(s)",
        config.retry.max_attempts,
        config.retry.base_delay_ms,
        config.retry.max_delay_ms,
        config.retry_overrides.len()
    );
    println!(
        "  circuit breaker: opens after {} failures, recovers after {}s",
        config.circuit_breaker.failure_threshold, config.circuit_breaker.recovery_timeout_secs
    );
    println!(
        "  stores: {} images for {}s, sessions for {}s, {} context chars",
        config.image_store.max_entries,
        config.image_store.ttl_secs,
        config.session.ttl_secs,
        config.session.context_budget_chars
    );
    Ok(())
}

fn cmd_show(args: &[String]) -> anyhow::Result<()> {
    let opts = parse_options(args)?;
    let config = load(&opts)?;
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

fn cmd_defaults() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&CoreConfig::default())?);
    Ok(())
}
