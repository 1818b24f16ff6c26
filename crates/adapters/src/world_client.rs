//! World engine client abstraction
//!
//! Defines the session-level operations the bridge needs from a 3D world
//! engine, supporting a real engine binding and the in-memory implementation.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;

use contracts::{Color, Extent, LidarPoint, Location, Transform, WorldPhase};

use crate::error::Result;

/// World engine actor ID
pub type ActorId = u32;

/// Blueprint of the ray-cast LiDAR sensor
pub const LIDAR_BLUEPRINT: &str = "sensor.lidar.ray_cast";

/// Current state of one vehicle actor
#[derive(Debug, Clone, PartialEq)]
pub struct ActorState {
    pub id: ActorId,
    pub blueprint: String,
    pub transform: Transform,
    /// Bounding-box half extent, `None` when the actor has no bounding box
    pub extent: Option<Extent>,
    /// Vehicle light-state bitfield
    pub light_state: u32,
    pub color: Option<Color>,
}

/// Vehicle spawn request
#[derive(Debug, Clone, PartialEq)]
pub struct ActorSpawn {
    pub blueprint: String,
    pub transform: Transform,
    /// `None` lets the engine pick one of the blueprint's recommended colors
    pub color: Option<Color>,
    pub role_name: String,
}

/// Sensor spawn request
#[derive(Debug, Clone, PartialEq)]
pub struct SensorMount {
    pub blueprint: String,
    /// Pose relative to the parent actor
    pub transform: Transform,
    pub attributes: BTreeMap<String, String>,
}

/// One traffic light as seen by the world engine
#[derive(Debug, Clone, PartialEq)]
pub struct TrafficLightInfo {
    pub actor_id: ActorId,
    /// Stable OpenDRIVE signal ID
    pub landmark_id: String,
    /// Position of the pole inside its group, 0 for the group leader
    pub pole_index: u32,
    /// Lights controlled together share a group
    pub group_id: u32,
    pub location: Location,
}

/// Decoded LiDAR sweep
#[derive(Debug, Clone, PartialEq)]
pub struct LidarMeasurement {
    pub frame: u64,
    pub timestamp: f64,
    pub points: Vec<LidarPoint>,
}

/// Sensor measurement callback, invoked on the engine's sensor thread
pub type MeasurementCallback = Arc<dyn Fn(LidarMeasurement) + Send + Sync>;

/// World engine client trait
///
/// All calls take `&self`; implementations synchronize internally.
pub trait WorldClient: Send + Sync {
    /// Connect to the world engine server
    fn connect(&mut self, host: &str, port: u16) -> impl Future<Output = Result<()>> + Send;

    /// Switch to fixed-step synchronous mode (`Some(step)`) or back to asynchronous mode (`None`)
    fn set_synchronous(
        &self,
        fixed_delta_seconds: Option<f64>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Advance one step; returns the new frame number
    fn tick(&self) -> impl Future<Output = Result<u64>> + Send;

    /// IDs of all live vehicle actors
    fn vehicle_ids(&self) -> impl Future<Output = Result<BTreeSet<ActorId>>> + Send;

    fn actor(&self, actor_id: ActorId) -> impl Future<Output = Result<ActorState>> + Send;

    /// Blueprint IDs available in the engine's library
    fn blueprint_ids(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Recommended values of a blueprint attribute, empty if the attribute is unknown
    fn recommended_values(
        &self,
        blueprint: &str,
        attribute: &str,
    ) -> impl Future<Output = Result<Vec<String>>> + Send;

    fn spawn_vehicle(&self, spawn: &ActorSpawn) -> impl Future<Output = Result<ActorId>> + Send;

    /// Teleport a vehicle and optionally replace its light state
    fn apply_vehicle_state(
        &self,
        actor_id: ActorId,
        transform: Transform,
        light_state: Option<u32>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Destroy actor
    ///
    /// Fails with `ActorNotFound` if the actor does not exist.
    fn destroy_actor(&self, actor_id: ActorId) -> impl Future<Output = Result<()>> + Send;

    fn traffic_lights(&self) -> impl Future<Output = Result<Vec<TrafficLightInfo>>> + Send;

    fn traffic_light_state(
        &self,
        landmark_id: &str,
    ) -> impl Future<Output = Result<WorldPhase>> + Send;

    fn set_traffic_light_state(
        &self,
        landmark_id: &str,
        phase: WorldPhase,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Stop (or resume) the engine's own traffic-light cycling
    fn freeze_traffic_lights(&self, frozen: bool) -> impl Future<Output = Result<()>> + Send;

    /// Spawn a sensor attached to `parent_id`; measurements go to `on_measurement`
    fn spawn_sensor(
        &self,
        mount: &SensorMount,
        parent_id: ActorId,
        on_measurement: MeasurementCallback,
    ) -> impl Future<Output = Result<ActorId>> + Send;
}
