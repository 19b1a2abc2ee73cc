//! Config validation CLI tool
//!
//! Validates an underlampd configuration file and reports any errors.

use std::path::PathBuf;
use std::process::ExitCode;
use underlamp_util::{default_config_path, format_duration};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates an underlampd configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config.example.toml");
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match underlamp_config::load_config(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", underlamp_config::CURRENT_CONFIG_VERSION);
            println!("  Instance: {}", config.service.instance_name);
            println!(
                "  Resource: {} ({})",
                config.resource.instance_id, config.resource.region_id
            );
            println!("  Daemon manager: {}", config.daemon.base_url);
            println!(
                "  Notifications: {}",
                if config.notify.webhook_url.is_some() {
                    "webhook"
                } else {
                    "log only"
                }
            );
            println!(
                "  Start minutes: {:?}, extend minutes: {:?}",
                config.schedule.start_minutes, config.schedule.extend_minutes
            );
            println!(
                "  Resource boot timeout: {}, daemon boot timeout: {}",
                format_duration(config.timings.resource_boot_timeout),
                format_duration(config.timings.daemon_boot_timeout)
            );

            if !config.access.operators.is_empty() {
                println!();
                println!("Operators:");
                for op in &config.access.operators {
                    let admin = if config.access.is_admin(&op.id) {
                        " [admin]"
                    } else {
                        ""
                    };
                    println!("  - {}: {}{}", op.id, op.display_name, admin);
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                underlamp_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                underlamp_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                underlamp_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                underlamp_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        underlamp_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
