//! Step link request/response messages
//!
//! One request frame is answered by exactly one response frame.

use contracts::{ControlDeviceDescriptor, EntityDescriptor, NativeId, SensorDescriptor, StepResult};
use serde::{Deserialize, Serialize};

/// Calls the traffic peer makes on the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LinkRequest {
    /// Run one reconciliation tick
    SimulationStep,

    AddEntity(EntityDescriptor),
    /// Only `id` is read; the rest of the descriptor is the peer's last view
    RemoveEntity(EntityDescriptor),
    UpdateEntity(EntityDescriptor),

    /// Last-known descriptor from the link table
    GetEntity { id: NativeId },

    GetControlDevice { landmark_id: String },
    ListControlDeviceIds,
    UpdateControlDevice(ControlDeviceDescriptor),

    AddSensor(SensorDescriptor),
    RemoveSensor { sensor_id: String },
}

impl LinkRequest {
    /// Short name for logs and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            LinkRequest::SimulationStep => "simulation_step",
            LinkRequest::AddEntity(_) => "add_entity",
            LinkRequest::RemoveEntity(_) => "remove_entity",
            LinkRequest::UpdateEntity(_) => "update_entity",
            LinkRequest::GetEntity { .. } => "get_entity",
            LinkRequest::GetControlDevice { .. } => "get_control_device",
            LinkRequest::ListControlDeviceIds => "list_control_device_ids",
            LinkRequest::UpdateControlDevice(_) => "update_control_device",
            LinkRequest::AddSensor(_) => "add_sensor",
            LinkRequest::RemoveSensor { .. } => "remove_sensor",
        }
    }
}

/// Bridge answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LinkResponse {
    Step(StepResult),
    Ack,
    Entity(Option<EntityDescriptor>),
    ControlDevice(Option<ControlDeviceDescriptor>),
    ControlDeviceIds(Vec<String>),
    /// Attached sensor with its assigned ID and resolved defaults
    Sensor(SensorDescriptor),
    SensorRejected { message: String },
    /// The call failed; `fatal` means the co-simulation is shutting down
    Error { message: String, fatal: bool },
}
