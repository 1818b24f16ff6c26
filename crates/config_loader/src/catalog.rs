//! 车辆类型兼容表加载
//!
//! 文件格式: `{"carla_blueprints": {"<id>": {"vClass": "<class>"}}}`，
//! 多余字段忽略。

use std::path::Path;

use contracts::{ContractError, VehicleCatalog, VehicleTypesFile};

/// Vehicle-class compatibility table loader
pub struct CatalogLoader;

impl CatalogLoader {
    /// Load the table from a JSON file
    ///
    /// # Errors
    /// - File read failure
    /// - Malformed JSON or unknown vehicle class
    pub fn load_from_path(path: &Path) -> Result<VehicleCatalog, ContractError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ContractError::catalog(path.display().to_string(), format!("read failed: {e}"))
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Load the table from a JSON string
    pub fn load_from_str(content: &str) -> Result<VehicleCatalog, ContractError> {
        Self::parse(content, "<inline>")
    }

    fn parse(content: &str, origin: &str) -> Result<VehicleCatalog, ContractError> {
        let file: VehicleTypesFile = serde_json::from_str(content)
            .map_err(|e| ContractError::catalog(origin, e.to_string()))?;

        if let Some(id) = file.blueprints.keys().find(|id| id.trim().is_empty()) {
            return Err(ContractError::catalog(
                origin,
                format!("empty class identifier {id:?}"),
            ));
        }

        Ok(VehicleCatalog::from(file))
    }
}
