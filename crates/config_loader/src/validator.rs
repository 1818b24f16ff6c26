//! 配置校验模块
//!
//! 校验规则：
//! - step_length > 0 且有限
//! - 端口非 0，主机名非空
//! - max_workers >= 1
//! - catalog 路径非空
//! - traffic.network_file 若设置则非空

use contracts::{BridgeConfig, ContractError};

/// 校验 BridgeConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &BridgeConfig) -> Result<(), ContractError> {
    validate_world(config)?;
    validate_traffic(config)?;
    validate_link(config)?;
    validate_sync(config)?;
    validate_catalog(config)?;
    Ok(())
}

fn validate_world(config: &BridgeConfig) -> Result<(), ContractError> {
    if config.world.host.trim().is_empty() {
        return Err(ContractError::config_validation(
            "world.host",
            "host cannot be empty",
        ));
    }
    if config.world.port == 0 {
        return Err(ContractError::config_validation(
            "world.port",
            "port must be non-zero",
        ));
    }
    Ok(())
}

fn validate_traffic(config: &BridgeConfig) -> Result<(), ContractError> {
    match config.traffic.network_file {
        Some(ref path) if path.as_os_str().is_empty() => Err(ContractError::config_validation(
            "traffic.network_file",
            "path cannot be empty when set",
        )),
        _ => Ok(()),
    }
}

fn validate_link(config: &BridgeConfig) -> Result<(), ContractError> {
    let link = &config.link;
    if link.listen_host.trim().is_empty() {
        return Err(ContractError::config_validation(
            "link.listen_host",
            "listen_host cannot be empty",
        ));
    }
    if link.listen_port == 0 {
        return Err(ContractError::config_validation(
            "link.listen_port",
            "listen_port must be non-zero",
        ));
    }
    if link.max_workers == 0 {
        return Err(ContractError::config_validation(
            "link.max_workers",
            "max_workers must be >= 1",
        ));
    }
    Ok(())
}

/// 校验同步配置
fn validate_sync(config: &BridgeConfig) -> Result<(), ContractError> {
    let step = config.sync.step_length;
    if !step.is_finite() || step <= 0.0 {
        return Err(ContractError::config_validation(
            "sync.step_length",
            format!("step_length must be a positive number, got {step}"),
        ));
    }
    Ok(())
}

fn validate_catalog(config: &BridgeConfig) -> Result<(), ContractError> {
    let catalog = &config.catalog;
    if catalog.vehicle_types.as_os_str().is_empty() {
        return Err(ContractError::config_validation(
            "catalog.vehicle_types",
            "path cannot be empty",
        ));
    }
    if catalog.landmark_mapping.as_os_str().is_empty() {
        return Err(ContractError::config_validation(
            "catalog.landmark_mapping",
            "path cannot be empty",
        ));
    }
    Ok(())
}
