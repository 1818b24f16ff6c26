//! Engine entities as seen by the bridge.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Color, Extent, Transform};

/// Engine-scoped entity identifier
pub type NativeId = String;

/// Which engine a value belongs to (or targets)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineSide {
    /// Traffic simulator (pushes its entities over the link)
    Traffic,
    /// 3D world/physics simulator
    World,
}

impl EngineSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineSide::Traffic => "traffic",
            EngineSide::World => "world",
        }
    }

    pub fn opposite(&self) -> EngineSide {
        match self {
            EngineSide::Traffic => EngineSide::World,
            EngineSide::World => EngineSide::Traffic,
        }
    }
}

impl fmt::Display for EngineSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic vehicle class shared by both engines' catalogs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum VehicleClass {
    Ignoring,
    Private,
    Emergency,
    Authority,
    Army,
    Vip,
    Pedestrian,
    Passenger,
    Hov,
    Taxi,
    Bus,
    Coach,
    Delivery,
    Truck,
    Trailer,
    Motorcycle,
    Moped,
    Bicycle,
    EVehicle,
    Tram,
    RailUrban,
    Rail,
    RailElectric,
    RailFast,
    Ship,
    Custom1,
    Custom2,
}

impl VehicleClass {
    pub const ALL: [VehicleClass; 27] = [
        VehicleClass::Ignoring,
        VehicleClass::Private,
        VehicleClass::Emergency,
        VehicleClass::Authority,
        VehicleClass::Army,
        VehicleClass::Vip,
        VehicleClass::Pedestrian,
        VehicleClass::Passenger,
        VehicleClass::Hov,
        VehicleClass::Taxi,
        VehicleClass::Bus,
        VehicleClass::Coach,
        VehicleClass::Delivery,
        VehicleClass::Truck,
        VehicleClass::Trailer,
        VehicleClass::Motorcycle,
        VehicleClass::Moped,
        VehicleClass::Bicycle,
        VehicleClass::EVehicle,
        VehicleClass::Tram,
        VehicleClass::RailUrban,
        VehicleClass::Rail,
        VehicleClass::RailElectric,
        VehicleClass::RailFast,
        VehicleClass::Ship,
        VehicleClass::Custom1,
        VehicleClass::Custom2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleClass::Ignoring => "ignoring",
            VehicleClass::Private => "private",
            VehicleClass::Emergency => "emergency",
            VehicleClass::Authority => "authority",
            VehicleClass::Army => "army",
            VehicleClass::Vip => "vip",
            VehicleClass::Pedestrian => "pedestrian",
            VehicleClass::Passenger => "passenger",
            VehicleClass::Hov => "hov",
            VehicleClass::Taxi => "taxi",
            VehicleClass::Bus => "bus",
            VehicleClass::Coach => "coach",
            VehicleClass::Delivery => "delivery",
            VehicleClass::Truck => "truck",
            VehicleClass::Trailer => "trailer",
            VehicleClass::Motorcycle => "motorcycle",
            VehicleClass::Moped => "moped",
            VehicleClass::Bicycle => "bicycle",
            VehicleClass::EVehicle => "evehicle",
            VehicleClass::Tram => "tram",
            VehicleClass::RailUrban => "rail_urban",
            VehicleClass::Rail => "rail",
            VehicleClass::RailElectric => "rail_electric",
            VehicleClass::RailFast => "rail_fast",
            VehicleClass::Ship => "ship",
            VehicleClass::Custom1 => "custom1",
            VehicleClass::Custom2 => "custom2",
        }
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VehicleClass::ALL
            .iter()
            .find(|class| class.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown vehicle class '{s}'"))
    }
}

impl TryFrom<String> for VehicleClass {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VehicleClass> for String {
    fn from(class: VehicleClass) -> Self {
        class.as_str().to_string()
    }
}

/// Full state snapshot of one engine-native entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Native ID in the owning engine
    pub id: NativeId,

    /// Engine-native class identifier (vehicle type / blueprint)
    pub type_id: String,

    /// Semantic class, when the owning engine reports one
    pub vehicle_class: Option<VehicleClass>,

    /// Pose in the owning engine's frame
    pub transform: Transform,

    /// Half-dimensions, `None` when the engine does not report them
    pub extent: Option<Extent>,

    /// Signal/light bitfield in the owning engine's encoding, `None` if unavailable
    pub signals: Option<u32>,

    pub color: Option<Color>,
}

/// Spawn request handed to an adapter
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnSpec {
    /// Class identifier in the destination engine
    pub type_id: String,

    pub vehicle_class: VehicleClass,

    /// Initial pose in the destination engine's frame
    pub transform: Transform,

    /// Physical size to give the mirror
    pub extent: Extent,

    /// Requested color (destination engine chooses when `None`)
    pub color: Option<Color>,
}

/// Entities that appeared / disappeared in an engine during its last tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Churn {
    pub spawned: BTreeSet<NativeId>,
    pub destroyed: BTreeSet<NativeId>,
}

impl Churn {
    pub fn is_empty(&self) -> bool {
        self.spawned.is_empty() && self.destroyed.is_empty()
    }
}
