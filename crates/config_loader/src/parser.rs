//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。

use contracts::{BridgeConfig, ContractError};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// 解析 TOML 格式配置
pub fn parse_toml(content: &str) -> Result<BridgeConfig, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 解析 JSON 格式配置
pub fn parse_json(content: &str) -> Result<BridgeConfig, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 根据格式解析配置
pub fn parse(content: &str, format: ConfigFormat) -> Result<BridgeConfig, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ControlAuthority, WireFormat};

    #[test]
    fn test_parse_toml_sections() {
        let content = r#"
[world]
host = "10.0.0.5"
port = 2010
map = "Town05"

[traffic.net_offset]
x = -103.5
y = 12.0

[link]
listen_port = 50052
format = "json"

[sync]
step_length = 0.1
control_devices = "traffic"
sync_vehicle_lights = true
"#;
        let result = parse_toml(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.world.host, "10.0.0.5");
        assert_eq!(config.world.map, "Town05");
        assert_eq!(config.traffic.net_offset.x, -103.5);
        assert_eq!(config.link.format, WireFormat::Json);
        assert_eq!(config.link.max_workers, 10);
        assert_eq!(config.sync.control_devices, ControlAuthority::Traffic);
        assert!(config.sync.sync_vehicle_lights);
        assert!(!config.sync.sync_vehicle_color);
    }

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config = parse_toml("").unwrap();
        assert_eq!(config.world.port, 2000);
        assert_eq!(config.link.listen_port, 50051);
        assert_eq!(config.sync.step_length, 0.05);
        assert_eq!(config.sync.control_devices, ControlAuthority::None);
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "world": { "host": "localhost" },
            "sync": { "control_devices": "world", "sync_vehicle_color": true }
        }"#;
        let config = parse_json(content).unwrap();
        assert_eq!(config.world.host, "localhost");
        assert_eq!(config.sync.control_devices, ControlAuthority::World);
        assert!(config.sync.sync_vehicle_color);
    }

    #[test]
    fn test_parse_rejects_unknown_authority() {
        let content = r#"
[sync]
control_devices = "both"
"#;
        let result = parse_toml(content);
        assert!(matches!(result, Err(ContractError::ConfigParse { .. })));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ConfigFormat::from_extension("TOML"), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::from_extension("json"), Some(ConfigFormat::Json));
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
