//! Particle records as stored in a phase-space stream.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Particle species, using the IAEA phase-space type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticleType {
    Photon,
    Electron,
    Positron,
    Neutron,
    Proton,
    /// Any code outside the standard five, kept as-is.
    Other(i32),
}

impl ParticleType {
    /// Map an IAEA type code to a particle type.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Photon,
            2 => Self::Electron,
            3 => Self::Positron,
            4 => Self::Neutron,
            5 => Self::Proton,
            other => Self::Other(other),
        }
    }

    /// The IAEA type code.
    pub fn code(&self) -> i32 {
        match self {
            Self::Photon => 1,
            Self::Electron => 2,
            Self::Positron => 3,
            Self::Neutron => 4,
            Self::Proton => 5,
            Self::Other(code) => *code,
        }
    }
}

impl fmt::Display for ParticleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Photon => write!(f, "photon"),
            Self::Electron => write!(f, "electron"),
            Self::Positron => write!(f, "positron"),
            Self::Neutron => write!(f, "neutron"),
            Self::Proton => write!(f, "proton"),
            Self::Other(code) => write!(f, "type {}", code),
        }
    }
}

/// One particle crossing event.
///
/// Positions are in centimeters. The direction cosines are carried exactly as
/// read; nothing in the crate renormalizes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleRecord {
    /// New-history marker: 0 continues the previous history, >0 starts a new one.
    pub status: i32,
    pub particle_type: ParticleType,
    /// Kinetic energy (MeV).
    pub energy: f32,
    /// Statistical weight.
    pub weight: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub u: f32,
    pub v: f32,
    pub w: f32,
    /// Extension payload; passed through, never interpreted.
    pub extra_floats: Vec<f32>,
    pub extra_ints: Vec<i32>,
}

impl ParticleRecord {
    /// Create a record at `(x, y, z)` moving along `(u, v, w)`.
    ///
    /// Energy and weight default to 1, the record starts a new history and
    /// carries no extension payload.
    pub fn new(particle_type: ParticleType, position: [f32; 3], direction: [f32; 3]) -> Self {
        Self {
            status: 1,
            particle_type,
            energy: 1.0,
            weight: 1.0,
            x: position[0],
            y: position[1],
            z: position[2],
            u: direction[0],
            v: direction[1],
            w: direction[2],
            extra_floats: Vec::new(),
            extra_ints: Vec::new(),
        }
    }

    /// Set the kinetic energy.
    pub fn with_energy(mut self, energy: f32) -> Self {
        self.energy = energy;
        self
    }

    /// Set the statistical weight.
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    /// Set the new-history marker.
    pub fn with_status(mut self, status: i32) -> Self {
        self.status = status;
        self
    }

    /// Attach an extension payload.
    pub fn with_extras(mut self, floats: Vec<f32>, ints: Vec<i32>) -> Self {
        self.extra_floats = floats;
        self.extra_ints = ints;
        self
    }

    /// Whether this record opens a new primary history.
    pub fn is_new_history(&self) -> bool {
        self.status > 0
    }
}
