//! Vehicle-class compatibility table
//!
//! Maps world class identifiers (blueprint IDs) to semantic vehicle classes.
//! Loaded once at startup by `config_loader`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::VehicleClass;

/// On-disk layout: `{"carla_blueprints": {"<id>": {"vClass": "<class>"}}}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VehicleTypesFile {
    #[serde(rename = "carla_blueprints")]
    pub blueprints: BTreeMap<String, VehicleTypeEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleTypeEntry {
    #[serde(rename = "vClass")]
    pub vehicle_class: VehicleClass,

    #[serde(rename = "guiShape", default)]
    pub gui_shape: Option<String>,
}

/// Class identifier -> semantic class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VehicleCatalog {
    classes: BTreeMap<String, VehicleClass>,
}

impl VehicleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or overwrite) one class identifier
    pub fn insert(&mut self, type_id: impl Into<String>, class: VehicleClass) {
        self.classes.insert(type_id.into(), class);
    }

    pub fn class_of(&self, type_id: &str) -> Option<VehicleClass> {
        self.classes.get(type_id).copied()
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.classes.contains_key(type_id)
    }

    /// Known identifiers that share `class`, in sorted order
    pub fn ids_with_class(&self, class: VehicleClass) -> impl Iterator<Item = &str> {
        self.classes
            .iter()
            .filter(move |(_, c)| **c == class)
            .map(|(id, _)| id.as_str())
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, VehicleClass)> {
        self.classes.iter().map(|(id, class)| (id.as_str(), *class))
    }
}

impl From<VehicleTypesFile> for VehicleCatalog {
    fn from(file: VehicleTypesFile) -> Self {
        Self {
            classes: file
                .blueprints
                .into_iter()
                .map(|(id, entry)| (id, entry.vehicle_class))
                .collect(),
        }
    }
}

impl FromIterator<(String, VehicleClass)> for VehicleCatalog {
    fn from_iter<I: IntoIterator<Item = (String, VehicleClass)>>(iter: I) -> Self {
        Self {
            classes: iter.into_iter().collect(),
        }
    }
}
