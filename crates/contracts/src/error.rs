//! Layered error definitions
//!
//! `ContractError` covers startup inputs (config / catalog files).
//! `AdapterError` covers engine calls and carries the failure taxonomy used by
//! the synchronization engine: per-entity failures are recovered locally,
//! session failures abort the tick.

use thiserror::Error;

use crate::EngineSide;

/// Startup input errors
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Catalog Errors =====
    /// Vehicle-class table could not be read
    #[error("catalog error in '{path}': {message}")]
    Catalog { path: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create catalog error
    pub fn catalog(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Catalog {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Engine adapter errors
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Entity unknown to the engine right now (usually despawned mid-step)
    #[error("{side} entity not found: {id}")]
    EntityNotFound { side: EngineSide, id: String },

    /// Traffic light unknown to the engine
    #[error("{side} control device not found: {landmark_id}")]
    ControlDeviceNotFound {
        side: EngineSide,
        landmark_id: String,
    },

    /// Engine refused to create an entity
    #[error("{side} spawn of '{type_id}' failed: {message}")]
    SpawnFailed {
        side: EngineSide,
        type_id: String,
        message: String,
    },

    /// Phase encoded for the other engine
    #[error("{side} cannot apply phase {phase}")]
    UnsupportedPhase { side: EngineSide, phase: String },

    /// Sensor request could not be honoured
    #[error("sensor rejected: {message}")]
    SensorRejected { message: String },

    /// Engine connection lost or call rejected
    #[error("{side} session failure: {message}")]
    Session { side: EngineSide, message: String },
}

impl AdapterError {
    pub fn entity_not_found(side: EngineSide, id: impl Into<String>) -> Self {
        Self::EntityNotFound {
            side,
            id: id.into(),
        }
    }

    pub fn control_device_not_found(side: EngineSide, landmark_id: impl Into<String>) -> Self {
        Self::ControlDeviceNotFound {
            side,
            landmark_id: landmark_id.into(),
        }
    }

    pub fn session(side: EngineSide, message: impl Into<String>) -> Self {
        Self::Session {
            side,
            message: message.into(),
        }
    }

    pub fn spawn_failed(
        side: EngineSide,
        type_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::SpawnFailed {
            side,
            type_id: type_id.into(),
            message: message.into(),
        }
    }

    pub fn sensor_rejected(message: impl Into<String>) -> Self {
        Self::SensorRejected {
            message: message.into(),
        }
    }

    /// Session failures end the tick; everything else is per-entity
    pub fn is_fatal(&self) -> bool {
        matches!(self, AdapterError::Session { .. })
    }
}
