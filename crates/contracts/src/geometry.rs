//! Geometry primitives shared by both engines.
//!
//! Units: meters for positions/extents, degrees for angles. The numbers are
//! interpreted in whichever engine frame the owning value came from; the
//! bridge in `sync_engine` converts between frames.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 3D transform: location + rotation
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Location (x, y, z) in meters
    pub location: Location,

    /// Rotation (pitch, yaw, roll) in degrees
    pub rotation: Rotation,
}

impl Transform {
    pub fn new(location: Location, rotation: Rotation) -> Self {
        Self { location, rotation }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Location {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

impl Rotation {
    pub fn new(pitch: f64, yaw: f64, roll: f64) -> Self {
        Self { pitch, yaw, roll }
    }
}

/// Bounding box half-dimensions (x = half length, y = half width, z = half height)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Extent {
    /// Default passenger vehicle: 5.0m x 1.8m x 1.5m
    pub const DEFAULT_VEHICLE: Extent = Extent {
        x: 2.5,
        y: 0.9,
        z: 0.75,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Build from full dimensions (length, width, height)
    pub fn from_dimensions(length: f64, width: f64, height: f64) -> Self {
        Self {
            x: length / 2.0,
            y: width / 2.0,
            z: height / 2.0,
        }
    }

    pub fn length(&self) -> f64 {
        self.x * 2.0
    }

    pub fn width(&self) -> f64 {
        self.y * 2.0
    }

    pub fn height(&self) -> f64 {
        self.z * 2.0
    }
}

impl Default for Extent {
    fn default() -> Self {
        Self::DEFAULT_VEHICLE
    }
}

/// Planar offset of the traffic network origin relative to the world origin
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NetOffset {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

impl NetOffset {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// RGBA color
///
/// Text form is `"r,g,b"` or `"r,g,b,a"`, which is how both engines carry
/// color attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(default = "opaque")]
    pub a: u8,
}

fn opaque() -> u8 {
    u8::MAX
}

impl Color {
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: u8::MAX }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.r, self.g, self.b)
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<u8>()
                    .map_err(|e| format!("invalid color component '{part}': {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        match parts.as_slice() {
            [r, g, b] => Ok(Color::rgb(*r, *g, *b)),
            [r, g, b, a] => Ok(Color {
                r: *r,
                g: *g,
                b: *b,
                a: *a,
            }),
            _ => Err(format!("expected 3 or 4 color components, got {}", parts.len())),
        }
    }
}
