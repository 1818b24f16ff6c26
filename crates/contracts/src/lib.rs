//! # Contracts
//!
//! Frozen interface contracts (ICD) shared by every bridge crate: the entity
//! data model, step results, wire descriptors, adapter traits and errors.
//! Business crates depend on this crate, never the reverse.
//!
//! ## Frames
//! - Traffic poses use a front-bumper reference point in a right-handed frame
//! - World poses use the geometric center in a left-handed frame
//!
//! Values are stored in the owning engine's frame; conversion lives in
//! `sync_engine::bridge`.

mod adapter;
mod bridge_config;
mod catalog;
mod descriptor;
mod entity;
mod error;
mod geometry;
mod signals;
mod step;

pub use adapter::{
    EngineAdapter, LocalEngineAdapter, LocalSensorHost, ObservationCallback, SensorHost,
};
pub use bridge_config::*;
pub use catalog::*;
pub use descriptor::*;
pub use entity::*;
pub use error::*;
pub use geometry::*;
pub use signals::*;
pub use step::*;
