//! `info` command implementation.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use contracts::{BridgeConfig, VehicleCatalog};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    world: WorldInfo,
    traffic: TrafficInfo,
    link: LinkInfo,
    sync_settings: SyncInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    catalog: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Serialize)]
struct WorldInfo {
    map: String,
    host: String,
    port: u16,
}

#[derive(Serialize)]
struct TrafficInfo {
    net_offset: [f64; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    network_file: Option<String>,
}

#[derive(Serialize)]
struct LinkInfo {
    listen: String,
    format: String,
    max_workers: usize,
}

#[derive(Serialize)]
struct SyncInfo {
    step_length: f64,
    control_devices: String,
    sync_vehicle_color: bool,
    sync_vehicle_lights: bool,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let catalog = if args.catalog {
        let catalog = config_loader::CatalogLoader::load_from_path(&config.catalog.vehicle_types)
            .with_context(|| {
                format!(
                    "Failed to load vehicle-class table from {}",
                    config.catalog.vehicle_types.display()
                )
            })?;
        Some(group_by_class(&catalog))
    } else {
        None
    };

    let info = build_config_info(&config, catalog);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

/// class -> sorted type ids
fn group_by_class(catalog: &VehicleCatalog) -> BTreeMap<String, Vec<String>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (type_id, class) in catalog.iter() {
        groups
            .entry(class.to_string())
            .or_default()
            .push(type_id.to_string());
    }
    for ids in groups.values_mut() {
        ids.sort();
    }
    groups
}

fn build_config_info(
    config: &BridgeConfig,
    catalog: Option<BTreeMap<String, Vec<String>>>,
) -> ConfigInfo {
    ConfigInfo {
        version: format!("{:?}", config.version),
        world: WorldInfo {
            map: config.world.map.clone(),
            host: config.world.host.clone(),
            port: config.world.port,
        },
        traffic: TrafficInfo {
            net_offset: [config.traffic.net_offset.x, config.traffic.net_offset.y],
            network_file: config
                .traffic
                .network_file
                .as_ref()
                .map(|p| p.display().to_string()),
        },
        link: LinkInfo {
            listen: format!("{}:{}", config.link.listen_host, config.link.listen_port),
            format: format!("{:?}", config.link.format),
            max_workers: config.link.max_workers,
        },
        sync_settings: SyncInfo {
            step_length: config.sync.step_length,
            control_devices: format!("{:?}", config.sync.control_devices),
            sync_vehicle_color: config.sync.sync_vehicle_color,
            sync_vehicle_lights: config.sync.sync_vehicle_lights,
        },
        catalog,
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("=== cosim-bridge Configuration ===\n");
    println!("Version: {}", info.version);

    println!("\n[World]");
    println!("  Map: {}", info.world.map);
    println!("  Engine: {}:{}", info.world.host, info.world.port);

    println!("\n[Traffic]");
    println!(
        "  Net offset: ({}, {})",
        info.traffic.net_offset[0], info.traffic.net_offset[1]
    );
    if let Some(ref network) = info.traffic.network_file {
        println!("  Network: {}", network);
    }

    println!("\n[Step link]");
    println!("  Listen: {}", info.link.listen);
    println!("  Format: {}", info.link.format);
    println!("  Max workers: {}", info.link.max_workers);

    println!("\n[Sync]");
    println!("  Step length: {}s", info.sync_settings.step_length);
    println!("  Control devices: {}", info.sync_settings.control_devices);
    println!("  Vehicle color: {}", info.sync_settings.sync_vehicle_color);
    println!("  Vehicle lights: {}", info.sync_settings.sync_vehicle_lights);

    if let Some(ref catalog) = info.catalog {
        println!("\n[Vehicle classes]");
        for (class, ids) in catalog {
            println!("  {} ({}):", class, ids.len());
            for id in ids {
                println!("    - {}", id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::VehicleClass;

    #[test]
    fn test_group_by_class_sorts_ids() {
        let catalog: VehicleCatalog = [
            ("vehicle.tesla.model3".to_string(), VehicleClass::Passenger),
            ("vehicle.carlamotors.carlacola".to_string(), VehicleClass::Truck),
            ("vehicle.audi.a2".to_string(), VehicleClass::Passenger),
        ]
        .into_iter()
        .collect();

        let groups = group_by_class(&catalog);
        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups["passenger"],
            vec!["vehicle.audi.a2", "vehicle.tesla.model3"]
        );
        assert_eq!(groups["truck"], vec!["vehicle.carlamotors.carlacola"]);
    }

    #[test]
    fn test_info_omits_catalog_unless_requested() {
        let info = build_config_info(&BridgeConfig::default(), None);
        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("catalog").is_none());
        assert_eq!(json["link"]["listen"], "0.0.0.0:50051");
        assert_eq!(json["sync_settings"]["control_devices"], "None");
    }
}
