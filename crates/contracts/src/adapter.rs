//! Engine adapter contracts
//!
//! Both engines are driven through the same capability set so the
//! synchronization engine never needs to know which concrete engine sits
//! behind a side. Every operation is implemented by every adapter; there is no
//! "not implemented" fallback.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::{
    AdapterError, Churn, DevicePhase, EngineSide, EntitySnapshot, NativeId, SensorDescriptor,
    SensorObservation, SpawnSpec, Transform,
};

/// Sensor observation callback type
///
/// Invoked from the engine's sensor thread, outside the synchronized tick.
pub type ObservationCallback = Arc<dyn Fn(SensorObservation) + Send + Sync>;

/// Uniform contract over one simulation engine session
#[trait_variant::make(EngineAdapter: Send)]
pub trait LocalEngineAdapter {
    /// Which engine this adapter drives
    fn side(&self) -> EngineSide;

    /// Advance the engine one fixed step and capture its churn
    ///
    /// # Errors
    /// Only session failures; they are fatal for the calling tick.
    async fn tick(&mut self) -> Result<(), AdapterError>;

    /// Churn captured by the last `tick()`; stable until the next `tick()`
    fn churn(&self) -> &Churn;

    /// Current state of a native entity
    ///
    /// # Errors
    /// `EntityNotFound` when the entity vanished; callers treat it as a race.
    async fn get_entity(&self, id: &str) -> Result<EntitySnapshot, AdapterError>;

    /// Create an entity, returning its engine-assigned ID
    async fn spawn_entity(&mut self, spec: &SpawnSpec) -> Result<NativeId, AdapterError>;

    async fn destroy_entity(&mut self, id: &str) -> Result<(), AdapterError>;

    /// Move an entity and optionally replace its signal bitfield
    async fn update_entity(
        &mut self,
        id: &str,
        transform: Transform,
        signals: Option<u32>,
    ) -> Result<(), AdapterError>;

    /// Landmark IDs of the engine's traffic lights
    async fn list_control_devices(&self) -> Result<BTreeSet<String>, AdapterError>;

    async fn get_control_device_state(&self, landmark_id: &str)
        -> Result<DevicePhase, AdapterError>;

    async fn set_control_device_state(
        &mut self,
        landmark_id: &str,
        phase: DevicePhase,
    ) -> Result<(), AdapterError>;

    /// Switch off the engine's own signal logic so the bridge can drive it
    async fn yield_control_devices(&mut self) -> Result<(), AdapterError>;

    /// Release the engine session
    async fn close(&mut self) -> Result<(), AdapterError>;
}

/// Engines that can carry attached sensors
#[trait_variant::make(SensorHost: Send)]
pub trait LocalSensorHost {
    /// Attach a sensor to a native entity of this engine
    ///
    /// Returns the request with the assigned ID and resolved defaults.
    async fn attach_sensor(
        &mut self,
        parent_id: &str,
        request: SensorDescriptor,
        on_observation: ObservationCallback,
    ) -> Result<SensorDescriptor, AdapterError>;

    /// Detach and destroy a sensor; `Ok(false)` if the ID is unknown
    async fn detach_sensor(&mut self, sensor_id: &str) -> Result<bool, AdapterError>;

    /// IDs of all sensors currently attached
    fn attached_sensors(&self) -> Vec<String>;
}
