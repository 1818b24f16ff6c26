//! BridgeConfig - Config Loader output
//!
//! Everything the bridge needs to start: engine endpoints, step length,
//! control-device authority, attribute sync flags and catalog locations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ControlAuthority, NetOffset};

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete bridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub version: ConfigVersion,

    #[serde(default)]
    pub world: WorldConfig,

    #[serde(default)]
    pub traffic: TrafficConfig,

    #[serde(default)]
    pub link: LinkConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// World engine connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldConfig {
    #[serde(default = "default_world_host")]
    pub host: String,

    #[serde(default = "default_world_port")]
    pub port: u16,

    /// Map to load (e.g., "Town03")
    #[serde(default = "default_map")]
    pub map: String,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            host: default_world_host(),
            port: default_world_port(),
            map: default_map(),
        }
    }
}

fn default_world_host() -> String {
    "127.0.0.1".to_string()
}

fn default_world_port() -> u16 {
    2000
}

fn default_map() -> String {
    "Town03".to_string()
}

/// Traffic network description
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrafficConfig {
    /// Location offset of the traffic network origin
    #[serde(default)]
    pub net_offset: NetOffset,

    /// Traffic network configuration file, loaded by the traffic peer
    #[serde(default)]
    pub network_file: Option<PathBuf>,
}

/// Wire encoding used on the step link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// Bincode (binary, compact)
    #[default]
    Bincode,
    /// JSON (human-readable, larger)
    Json,
}

/// Step transport endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default = "default_listen_host")]
    pub listen_host: String,

    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    #[serde(default)]
    pub format: WireFormat,

    /// Concurrently served connections
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            listen_host: default_listen_host(),
            listen_port: default_listen_port(),
            format: WireFormat::default(),
            max_workers: default_max_workers(),
        }
    }
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    50051
}

fn default_max_workers() -> usize {
    10
}

/// Reconciliation behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Fixed step length (seconds)
    #[serde(default = "default_step_length")]
    pub step_length: f64,

    /// Which engine drives traffic lights
    #[serde(default)]
    pub control_devices: ControlAuthority,

    /// Mirror vehicle color
    #[serde(default)]
    pub sync_vehicle_color: bool,

    /// Mirror vehicle light/signal state
    #[serde(default)]
    pub sync_vehicle_lights: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            step_length: default_step_length(),
            control_devices: ControlAuthority::default(),
            sync_vehicle_color: false,
            sync_vehicle_lights: false,
        }
    }
}

fn default_step_length() -> f64 {
    0.05
}

/// Static catalog files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Vehicle-class compatibility table
    #[serde(default = "default_vehicle_types")]
    pub vehicle_types: PathBuf,

    /// Output path of the landmark correlation file
    #[serde(default = "default_landmark_mapping")]
    pub landmark_mapping: PathBuf,

    /// Seed for same-class fallback selection (random when absent)
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            vehicle_types: default_vehicle_types(),
            landmark_mapping: default_landmark_mapping(),
            seed: None,
        }
    }
}

fn default_vehicle_types() -> PathBuf {
    PathBuf::from("data/vtypes.json")
}

fn default_landmark_mapping() -> PathBuf {
    PathBuf::from("data/traffic_light_mapping.json")
}
