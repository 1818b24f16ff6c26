//! Geometry/State Bridge
//!
//! Pure conversions between the traffic and world conventions:
//!
//! | quantity | traffic                      | world                      |
//! |----------|------------------------------|----------------------------|
//! | position | front bumper, right-handed   | geometric center, left-handed |
//! | heading  | 0° = north, clockwise        | 0° = east                  |
//! | lights   | [`TrafficSignals`] bits      | [`WorldLights`] bits       |
//! | phase    | [`TrafficPhase`] code        | [`WorldPhase`]             |
//!
//! Angles are degrees. Every function is the inverse of its counterpart up to
//! floating-point precision, except phases which collapse.

use contracts::{
    DevicePhase, Extent, Location, NetOffset, Rotation, TrafficPhase, TrafficSignals, Transform,
    WorldLights, WorldPhase,
};
use nalgebra::Vector3;

/// Unit heading vector with the pitch component, scaled by half-length later
fn heading_vector(planar_yaw_deg: f64, pitch_deg: f64) -> Vector3<f64> {
    let yaw = planar_yaw_deg.to_radians();
    Vector3::new(yaw.cos(), yaw.sin(), pitch_deg.to_radians().sin())
}

fn to_vector(location: &Location) -> Vector3<f64> {
    Vector3::new(location.x, location.y, location.z)
}

/// Traffic pose (front bumper) -> world pose (geometric center)
pub fn world_transform(traffic: &Transform, extent: &Extent, offset: &NetOffset) -> Transform {
    let rotation = traffic.rotation;
    let bumper = heading_vector(90.0 - rotation.yaw, rotation.pitch) * extent.x;

    let center = to_vector(&traffic.location) - bumper - Vector3::new(offset.x, offset.y, 0.0);

    Transform::new(
        Location::new(center.x, -center.y, center.z),
        Rotation::new(rotation.pitch, rotation.yaw - 90.0, rotation.roll),
    )
}

/// World pose (geometric center) -> traffic pose (front bumper)
pub fn traffic_transform(world: &Transform, extent: &Extent, offset: &NetOffset) -> Transform {
    let rotation = world.rotation;
    let center = Vector3::new(world.location.x, -world.location.y, world.location.z);
    let bumper = heading_vector(-rotation.yaw, rotation.pitch) * extent.x;

    let front = center + bumper + Vector3::new(offset.x, offset.y, 0.0);

    Transform::new(
        Location::new(front.x, front.y, front.z),
        Rotation::new(rotation.pitch, rotation.yaw + 90.0, rotation.roll),
    )
}

/// Traffic signal bits -> world light bits
///
/// Starts from the world's current lights so bits without a traffic
/// counterpart survive.
pub fn world_lights(traffic_signals: u32, current_world: u32) -> u32 {
    let signals = TrafficSignals(traffic_signals);
    let emergency = signals.contains(TrafficSignals::BLINKER_EMERGENCY);

    WorldLights(current_world)
        .with(
            WorldLights::RIGHT_BLINKER,
            signals.contains(TrafficSignals::BLINKER_RIGHT) || emergency,
        )
        .with(
            WorldLights::LEFT_BLINKER,
            signals.contains(TrafficSignals::BLINKER_LEFT) || emergency,
        )
        .with(
            WorldLights::BRAKE,
            signals.contains(TrafficSignals::BRAKELIGHT),
        )
        .with(
            WorldLights::LOW_BEAM,
            signals.contains(TrafficSignals::FRONTLIGHT),
        )
        .with(WorldLights::FOG, signals.contains(TrafficSignals::FOGLIGHT))
        .with(
            WorldLights::HIGH_BEAM,
            signals.contains(TrafficSignals::HIGHBEAM),
        )
        .with(
            WorldLights::REVERSE,
            signals.contains(TrafficSignals::BACKDRIVE),
        )
        .with(
            WorldLights::POSITION,
            signals.contains(TrafficSignals::DOOR_OPEN_LEFT)
                || signals.contains(TrafficSignals::DOOR_OPEN_RIGHT),
        )
        .bits()
}

/// World light bits -> traffic signal bits
///
/// Emergency is derived: both blinkers on.
pub fn traffic_signals(world_lights: u32, current_traffic: u32) -> u32 {
    let lights = WorldLights(world_lights);
    let right = lights.contains(WorldLights::RIGHT_BLINKER);
    let left = lights.contains(WorldLights::LEFT_BLINKER);

    TrafficSignals(current_traffic)
        .with(TrafficSignals::BLINKER_RIGHT, right)
        .with(TrafficSignals::BLINKER_LEFT, left)
        .with(TrafficSignals::BLINKER_EMERGENCY, right && left)
        .with(
            TrafficSignals::BRAKELIGHT,
            lights.contains(WorldLights::BRAKE),
        )
        .with(
            TrafficSignals::FRONTLIGHT,
            lights.contains(WorldLights::LOW_BEAM),
        )
        .with(TrafficSignals::FOGLIGHT, lights.contains(WorldLights::FOG))
        .with(
            TrafficSignals::HIGHBEAM,
            lights.contains(WorldLights::HIGH_BEAM),
        )
        .with(
            TrafficSignals::BACKDRIVE,
            lights.contains(WorldLights::REVERSE),
        )
        .bits()
}

pub fn world_phase(phase: TrafficPhase) -> WorldPhase {
    match phase {
        TrafficPhase::Red | TrafficPhase::RedYellow => WorldPhase::Red,
        TrafficPhase::Yellow => WorldPhase::Yellow,
        TrafficPhase::Green | TrafficPhase::GreenWithoutPriority => WorldPhase::Green,
        _ => WorldPhase::Off,
    }
}

pub fn traffic_phase(phase: WorldPhase) -> TrafficPhase {
    match phase {
        WorldPhase::Red => TrafficPhase::Red,
        WorldPhase::Yellow => TrafficPhase::Yellow,
        WorldPhase::Green => TrafficPhase::Green,
        _ => TrafficPhase::Off,
    }
}

/// Re-encode a phase for the other engine
pub fn convert_phase(phase: DevicePhase) -> DevicePhase {
    match phase {
        DevicePhase::Traffic(p) => DevicePhase::World(world_phase(p)),
        DevicePhase::World(p) => DevicePhase::Traffic(traffic_phase(p)),
    }
}
