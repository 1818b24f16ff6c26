//! Descriptors exchanged with the remote traffic peer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    Color, EntitySnapshot, Extent, Location, NativeId, Rotation, SpawnSpec, TrafficPhase,
    Transform, VehicleClass,
};

/// Traffic-engine orientation: slope (pitch) and heading angle, degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Heading {
    pub slope: f64,
    pub angle: f64,
}

/// Entity state as pushed by the traffic peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub id: NativeId,
    pub type_id: String,
    pub vehicle_class: Option<VehicleClass>,
    pub color: Option<Color>,

    /// Full dimensions in meters, `0.0` when unknown
    pub length: f64,
    pub width: f64,
    pub height: f64,

    /// Front-bumper reference point, traffic frame
    pub location: Location,
    pub heading: Heading,

    pub signals: u32,
    pub route: Option<String>,
}

impl EntityDescriptor {
    /// Minimal descriptor with unknown geometry
    pub fn new(id: impl Into<NativeId>, type_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_id: type_id.into(),
            vehicle_class: None,
            color: None,
            length: 0.0,
            width: 0.0,
            height: 0.0,
            location: Location::default(),
            heading: Heading::default(),
            signals: 0,
            route: None,
        }
    }

    /// Descriptor for a mirror the bridge spawns in the traffic engine
    pub fn from_spawn(id: impl Into<NativeId>, spec: &SpawnSpec, route: &str) -> Self {
        Self {
            id: id.into(),
            type_id: spec.type_id.clone(),
            vehicle_class: Some(spec.vehicle_class),
            color: spec.color,
            length: spec.extent.length(),
            width: spec.extent.width(),
            height: spec.extent.height(),
            location: spec.transform.location,
            heading: Heading {
                slope: spec.transform.rotation.pitch,
                angle: spec.transform.rotation.yaw,
            },
            signals: 0,
            route: Some(route.to_string()),
        }
    }

    pub fn transform(&self) -> Transform {
        Transform {
            location: self.location,
            rotation: Rotation::new(self.heading.slope, self.heading.angle, 0.0),
        }
    }

    /// Half-extent, `None` unless all three dimensions are known
    pub fn extent(&self) -> Option<Extent> {
        if self.length > 0.0 && self.width > 0.0 && self.height > 0.0 {
            Some(Extent::from_dimensions(self.length, self.width, self.height))
        } else {
            None
        }
    }

    pub fn to_snapshot(&self) -> EntitySnapshot {
        EntitySnapshot {
            id: self.id.clone(),
            type_id: self.type_id.clone(),
            vehicle_class: self.vehicle_class,
            transform: self.transform(),
            extent: self.extent(),
            signals: Some(self.signals),
            color: self.color,
        }
    }
}

/// Traffic-light state as pushed by the traffic peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlDeviceDescriptor {
    pub landmark_id: String,
    pub phase: TrafficPhase,
}

/// Sensor attach request / reply
///
/// On reply `id` is the assigned sensor ID and every defaulted field has been
/// filled in with the value actually used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDescriptor {
    pub id: Option<String>,

    /// Sensor kind, e.g. `"LiDAR"`
    pub type_id: String,

    /// Entity to attach to: a traffic ID with a world mirror, or a raw world ID
    pub attached: NativeId,

    /// Mount location relative to the parent
    pub location: Option<Location>,

    /// Mount orientation relative to the parent
    pub heading: Option<Heading>,

    pub attributes: BTreeMap<String, String>,
}

impl SensorDescriptor {
    pub fn lidar(attached: impl Into<NativeId>) -> Self {
        Self {
            id: None,
            type_id: "LiDAR".to_string(),
            attached: attached.into(),
            location: None,
            heading: None,
            attributes: BTreeMap::new(),
        }
    }
}
