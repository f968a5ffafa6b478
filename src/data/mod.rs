//! Core data structures: particle records and phase-space headers.

mod header;
mod record;

pub use header::{
    ByteOrder, FieldStorage, HeaderSection, ParticleCounts, PhspHeader, RecordContents,
};
pub use record::{ParticleRecord, ParticleType};
