//! StepResult - Synchronization Engine output
//!
//! One batch of mutations per reconciliation tick. Each request names the
//! engine it targets; the remote traffic peer applies the entries that target
//! [`EngineSide::Traffic`], world-targeted entries have already been applied
//! in-process and are reported for observability.

use serde::{Deserialize, Serialize};

use crate::{Color, DevicePhase, EngineSide, NativeId, Transform, VehicleClass};

/// Batch of mutations produced by one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub spawn_requests: Vec<SpawnRequest>,
    pub destroy_requests: Vec<DestroyRequest>,
    pub move_requests: Vec<MoveRequest>,
    pub control_device_updates: Vec<ControlDeviceUpdate>,
    /// Sensor observations collected since the previous step
    pub sensor_observations: Vec<SensorObservation>,
}

impl StepResult {
    pub fn is_empty(&self) -> bool {
        self.spawn_requests.is_empty()
            && self.destroy_requests.is_empty()
            && self.move_requests.is_empty()
            && self.control_device_updates.is_empty()
            && self.sensor_observations.is_empty()
    }

    pub fn spawns_for(&self, target: EngineSide) -> impl Iterator<Item = &SpawnRequest> {
        self.spawn_requests.iter().filter(move |r| r.target == target)
    }

    pub fn destroys_for(&self, target: EngineSide) -> impl Iterator<Item = &DestroyRequest> {
        self.destroy_requests
            .iter()
            .filter(move |r| r.target == target)
    }

    pub fn moves_for(&self, target: EngineSide) -> impl Iterator<Item = &MoveRequest> {
        self.move_requests.iter().filter(move |r| r.target == target)
    }

    pub fn device_updates_for(
        &self,
        target: EngineSide,
    ) -> impl Iterator<Item = &ControlDeviceUpdate> {
        self.control_device_updates
            .iter()
            .filter(move |u| u.phase.side() == target)
    }
}

/// Mirror creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnRequest {
    /// Engine the mirror was created in
    pub target: EngineSide,

    /// Native ID of the original entity in the source engine
    pub source_id: NativeId,

    /// Native ID assigned to the mirror by the target engine
    pub entity_id: NativeId,

    pub type_id: String,
    pub vehicle_class: VehicleClass,

    /// Route hint for the traffic engine
    pub route: Option<String>,

    pub color: Option<Color>,

    /// Initial pose in the target frame
    pub transform: Transform,
}

/// Mirror removal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DestroyRequest {
    pub target: EngineSide,
    pub entity_id: NativeId,
}

/// Pose/signal update of an existing mirror
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub target: EngineSide,
    pub entity_id: NativeId,

    /// Pose in the target frame
    pub transform: Transform,

    /// Signal bitfield in the target's encoding (`None` leaves signals untouched)
    pub signals: Option<u32>,
}

/// Traffic-light phase pushed to the non-authoritative engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlDeviceUpdate {
    pub landmark_id: String,
    pub phase: DevicePhase,
}

/// One point of a LiDAR measurement, sensor frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LidarPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub intensity: f32,
}

/// Decoded measurement of an attached sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorObservation {
    pub sensor_id: String,

    /// World frame number the measurement belongs to
    pub frame: u64,

    /// World simulation time (seconds)
    pub timestamp: f64,

    pub points: Vec<LidarPoint>,
}
