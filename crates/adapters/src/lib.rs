//! # Adapters
//!
//! Per-engine adapters behind the `contracts::EngineAdapter` contract.
//!
//! - [`TrafficAdapter`]: traffic engine, fed by descriptors the remote peer
//!   pushes into a shared [`TrafficLink`] table
//! - [`WorldAdapter`]: world engine, driven through a [`WorldClient`] session
//! - [`InMemoryWorld`]: world engine kept in process memory, for offline runs
//!   and tests
//!
//! ## Feature Flags
//!
//! - `real-carla`: [`CarlaWorld`], a [`WorldClient`] over a running CARLA server

#[cfg(feature = "real-carla")]
pub mod carla_world;
pub mod error;
pub mod mock_world;
pub mod traffic_link;
pub mod traffic_side;
pub mod world_client;
pub mod world_side;

#[cfg(feature = "real-carla")]
pub use carla_world::CarlaWorld;
pub use error::{Result, WorldClientError};
pub use mock_world::{InMemoryWorld, InMemoryWorldConfig};
pub use traffic_link::TrafficLink;
pub use traffic_side::{TrafficAdapter, MIRROR_ID_PREFIX, MIRROR_ROUTE};
pub use world_client::{
    ActorId, ActorSpawn, ActorState, LidarMeasurement, MeasurementCallback, SensorMount,
    TrafficLightInfo, WorldClient, LIDAR_BLUEPRINT,
};
pub use world_side::{WorldAdapter, LIDAR_SENSOR_TYPE, MIRROR_ROLE_NAME};
