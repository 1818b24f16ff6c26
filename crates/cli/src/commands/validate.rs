//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{BridgeConfig, ControlAuthority};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    world: String,
    listen: String,
    step_length: f64,
    control_devices: String,
    vehicle_classes: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn invalid(config_path: String, error: String) -> ValidationResult {
    ValidationResult {
        valid: false,
        config_path,
        error: Some(error),
        warnings: None,
        summary: None,
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return invalid(
            config_path,
            format!("File not found: {}", args.config.display()),
        );
    }

    let config = match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => config,
        Err(e) => return invalid(config_path, e.to_string()),
    };

    // 类型表必须可读
    let catalog = match config_loader::CatalogLoader::load_from_path(&config.catalog.vehicle_types)
    {
        Ok(catalog) => catalog,
        Err(e) => return invalid(config_path, e.to_string()),
    };

    if let Some(ref network) = config.traffic.network_file {
        if !network.exists() {
            return invalid(
                config_path,
                format!("Traffic network file not found: {}", network.display()),
            );
        }
    }

    let mut warnings = collect_warnings(&config);
    if catalog.is_empty() {
        warnings.push("Vehicle-class table is empty - only exact class matches will mirror".into());
    }

    ValidationResult {
        valid: true,
        config_path,
        error: None,
        warnings: if warnings.is_empty() {
            None
        } else {
            Some(warnings)
        },
        summary: Some(ConfigSummary {
            version: format!("{:?}", config.version),
            world: format!("{}:{}", config.world.host, config.world.port),
            listen: format!("{}:{}", config.link.listen_host, config.link.listen_port),
            step_length: config.sync.step_length,
            control_devices: format!("{:?}", config.sync.control_devices),
            vehicle_classes: catalog.len(),
        }),
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &BridgeConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.sync.control_devices == ControlAuthority::None {
        warnings.push("sync.control_devices is none - traffic lights run independently".to_string());
    }

    if config.traffic.network_file.is_none() {
        warnings.push(
            "traffic.network_file not set - the traffic peer must load its own network".to_string(),
        );
    }

    if config.catalog.seed.is_none() {
        warnings.push("catalog.seed not set - same-class fallback is not reproducible".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  World engine: {}", summary.world);
            println!("  Step link: {}", summary.listen);
            println!("  Step length: {}s", summary.step_length);
            println!("  Control devices: {}", summary.control_devices);
            println!("  Vehicle classes: {}", summary.vehicle_classes);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
