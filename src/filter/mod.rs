//! Spatial filtering primitives for particle records.

pub mod window;

pub use window::{evaluate, project, Decision, GeometryWindow};
