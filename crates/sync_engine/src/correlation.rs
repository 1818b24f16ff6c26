//! Landmark correlation file
//!
//! Written once per session so the traffic side can match its signal groups to
//! the world's traffic lights by position and pole order.

use std::path::Path;

use adapters::TrafficLightInfo;
use contracts::NetOffset;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tracing::info;

use crate::error::SyncError;

/// One traffic light of a group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LandmarkEntry {
    pub pole_index: u32,
    pub landmark_id: String,
    pub tl_id: u32,
    /// Position in the traffic frame
    pub pos_x: f64,
    pub pos_y: f64,
}

/// Groups in pole-leader order, serialized as a JSON object keyed
/// `traffic-light-group-<i>`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LandmarkMapping {
    pub groups: Vec<Vec<LandmarkEntry>>,
}

impl Serialize for LandmarkMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for (i, group) in self.groups.iter().enumerate() {
            map.serialize_entry(&format!("traffic-light-group-{i}"), group)?;
        }
        map.end()
    }
}

/// Build the mapping from the world's traffic lights
///
/// Lights are ordered by pole index; every pole-0 light leads one group.
pub fn correlate_landmarks(lights: &[TrafficLightInfo], offset: &NetOffset) -> LandmarkMapping {
    let mut sorted: Vec<&TrafficLightInfo> = lights.iter().collect();
    sorted.sort_by(|a, b| {
        a.pole_index
            .cmp(&b.pole_index)
            .then_with(|| a.landmark_id.cmp(&b.landmark_id))
    });

    let groups = sorted
        .iter()
        .take_while(|light| light.pole_index == 0)
        .map(|leader| {
            sorted
                .iter()
                .filter(|light| light.group_id == leader.group_id)
                .map(|light| LandmarkEntry {
                    pole_index: light.pole_index,
                    landmark_id: light.landmark_id.clone(),
                    tl_id: light.actor_id,
                    pos_x: light.location.x + offset.x,
                    pos_y: light.location.y - offset.y,
                })
                .collect()
        })
        .collect();

    LandmarkMapping { groups }
}

/// Write the mapping as pretty JSON, creating parent directories
pub fn write_landmark_mapping(path: &Path, mapping: &LandmarkMapping) -> Result<(), SyncError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(mapping)?;
    std::fs::write(path, json)?;
    info!(
        path = %path.display(),
        groups = mapping.groups.len(),
        "landmark mapping written"
    );
    Ok(())
}
