//! World client error types

use contracts::{AdapterError, EngineSide};
use thiserror::Error;

/// Errors raised by a [`WorldClient`](crate::WorldClient) implementation
#[derive(Debug, Error)]
pub enum WorldClientError {
    /// Connection to the world engine lost or never established
    #[error("failed to connect to world engine: {message}")]
    ConnectionFailed { message: String },

    /// Actor does not exist (anymore)
    #[error("actor {actor_id} not found")]
    ActorNotFound { actor_id: u32 },

    /// No traffic light carries this landmark ID
    #[error("traffic light '{landmark_id}' not found")]
    TrafficLightNotFound { landmark_id: String },

    /// Vehicle spawn error
    #[error("failed to spawn '{blueprint}': {message}")]
    SpawnFailed { blueprint: String, message: String },

    /// Sensor spawn error
    #[error("failed to spawn sensor on actor {parent_id}: {message}")]
    SensorSpawnFailed { parent_id: u32, message: String },
}

impl WorldClientError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
        }
    }

    pub fn spawn(blueprint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SpawnFailed {
            blueprint: blueprint.into(),
            message: message.into(),
        }
    }
}

impl From<WorldClientError> for AdapterError {
    fn from(err: WorldClientError) -> Self {
        let side = EngineSide::World;
        match err {
            WorldClientError::ConnectionFailed { message } => AdapterError::session(side, message),
            WorldClientError::ActorNotFound { actor_id } => {
                AdapterError::entity_not_found(side, actor_id.to_string())
            }
            WorldClientError::TrafficLightNotFound { landmark_id } => {
                AdapterError::control_device_not_found(side, landmark_id)
            }
            WorldClientError::SpawnFailed { blueprint, message } => {
                AdapterError::spawn_failed(side, blueprint, message)
            }
            WorldClientError::SensorSpawnFailed { parent_id, message } => {
                AdapterError::sensor_rejected(format!("parent {parent_id}: {message}"))
            }
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, WorldClientError>;
