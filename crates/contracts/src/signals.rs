//! Vehicle signal bitfields and traffic-light phases in each engine's encoding.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Traffic-side vehicle signal bitfield
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrafficSignals(pub u32);

impl TrafficSignals {
    pub const BLINKER_RIGHT: u32 = 1 << 0;
    pub const BLINKER_LEFT: u32 = 1 << 1;
    pub const BLINKER_EMERGENCY: u32 = 1 << 2;
    pub const BRAKELIGHT: u32 = 1 << 3;
    pub const FRONTLIGHT: u32 = 1 << 4;
    pub const FOGLIGHT: u32 = 1 << 5;
    pub const HIGHBEAM: u32 = 1 << 6;
    pub const BACKDRIVE: u32 = 1 << 7;
    pub const WIPER: u32 = 1 << 8;
    pub const DOOR_OPEN_LEFT: u32 = 1 << 9;
    pub const DOOR_OPEN_RIGHT: u32 = 1 << 10;
    pub const EMERGENCY_BLUE: u32 = 1 << 11;
    pub const EMERGENCY_RED: u32 = 1 << 12;
    pub const EMERGENCY_YELLOW: u32 = 1 << 13;

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    /// Returns a copy with `flag` forced to `on`
    pub fn with(self, flag: u32, on: bool) -> Self {
        if on {
            Self(self.0 | flag)
        } else {
            Self(self.0 & !flag)
        }
    }
}

/// World-side vehicle light bitfield
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldLights(pub u32);

impl WorldLights {
    pub const POSITION: u32 = 1 << 0;
    pub const LOW_BEAM: u32 = 1 << 1;
    pub const HIGH_BEAM: u32 = 1 << 2;
    pub const BRAKE: u32 = 1 << 3;
    pub const RIGHT_BLINKER: u32 = 1 << 4;
    pub const LEFT_BLINKER: u32 = 1 << 5;
    pub const REVERSE: u32 = 1 << 6;
    pub const FOG: u32 = 1 << 7;
    pub const INTERIOR: u32 = 1 << 8;
    pub const SPECIAL1: u32 = 1 << 9;
    pub const SPECIAL2: u32 = 1 << 10;

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    /// Returns a copy with `flag` forced to `on`
    pub fn with(self, flag: u32, on: bool) -> Self {
        if on {
            Self(self.0 | flag)
        } else {
            Self(self.0 & !flag)
        }
    }
}

/// Traffic-side signal phase for one controlled link
///
/// Wire form is the single-character state code used by the traffic engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrafficPhase {
    #[serde(rename = "r")]
    Red,
    #[serde(rename = "u")]
    RedYellow,
    #[serde(rename = "y")]
    Yellow,
    #[serde(rename = "G")]
    Green,
    #[serde(rename = "g")]
    GreenWithoutPriority,
    #[serde(rename = "s")]
    GreenRightTurn,
    #[serde(rename = "o")]
    OffBlinking,
    #[serde(rename = "O")]
    Off,
}

impl TrafficPhase {
    pub fn code(&self) -> char {
        match self {
            TrafficPhase::Red => 'r',
            TrafficPhase::RedYellow => 'u',
            TrafficPhase::Yellow => 'y',
            TrafficPhase::Green => 'G',
            TrafficPhase::GreenWithoutPriority => 'g',
            TrafficPhase::GreenRightTurn => 's',
            TrafficPhase::OffBlinking => 'o',
            TrafficPhase::Off => 'O',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'r' => Some(TrafficPhase::Red),
            'u' => Some(TrafficPhase::RedYellow),
            'y' => Some(TrafficPhase::Yellow),
            'G' => Some(TrafficPhase::Green),
            'g' => Some(TrafficPhase::GreenWithoutPriority),
            's' => Some(TrafficPhase::GreenRightTurn),
            'o' => Some(TrafficPhase::OffBlinking),
            'O' => Some(TrafficPhase::Off),
            _ => None,
        }
    }
}

/// World-side traffic light state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorldPhase {
    Red,
    Yellow,
    Green,
    Off,
    Unknown,
}

/// A control-device phase tagged with the engine whose encoding it uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePhase {
    Traffic(TrafficPhase),
    World(WorldPhase),
}

impl DevicePhase {
    pub fn side(&self) -> crate::EngineSide {
        match self {
            DevicePhase::Traffic(_) => crate::EngineSide::Traffic,
            DevicePhase::World(_) => crate::EngineSide::World,
        }
    }
}

impl fmt::Display for DevicePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DevicePhase::Traffic(phase) => write!(f, "traffic:{}", phase.code()),
            DevicePhase::World(phase) => write!(f, "world:{phase:?}"),
        }
    }
}

/// Which engine drives traffic-light state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAuthority {
    /// Each engine runs its own signal logic
    #[default]
    None,
    /// Traffic phases are pushed to the world
    Traffic,
    /// World phases are pushed to traffic
    World,
}

impl ControlAuthority {
    /// The side whose own signal logic must be switched off
    pub fn controlled_side(&self) -> Option<crate::EngineSide> {
        match self {
            ControlAuthority::None => None,
            ControlAuthority::Traffic => Some(crate::EngineSide::World),
            ControlAuthority::World => Some(crate::EngineSide::Traffic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_with_sets_and_clears() {
        let signals = TrafficSignals::default()
            .with(TrafficSignals::BRAKELIGHT, true)
            .with(TrafficSignals::BLINKER_LEFT, true)
            .with(TrafficSignals::BRAKELIGHT, false);
        assert_eq!(signals.bits(), TrafficSignals::BLINKER_LEFT);

        let lights = WorldLights(WorldLights::FOG).with(WorldLights::FOG, true);
        assert_eq!(lights.bits(), WorldLights::FOG);
    }

    #[test]
    fn test_traffic_phase_codes() {
        for code in ['r', 'u', 'y', 'G', 'g', 's', 'o', 'O'] {
            let phase = TrafficPhase::from_code(code).unwrap();
            assert_eq!(phase.code(), code);
        }
        assert_eq!(TrafficPhase::from_code('x'), None);

        let json = serde_json::to_string(&TrafficPhase::GreenWithoutPriority).unwrap();
        assert_eq!(json, "\"g\"");
    }

    #[test]
    fn test_control_authority_controlled_side() {
        assert_eq!(ControlAuthority::None.controlled_side(), None);
        assert_eq!(
            ControlAuthority::Traffic.controlled_side(),
            Some(crate::EngineSide::World)
        );
    }
}
