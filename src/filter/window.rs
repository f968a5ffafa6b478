//! Planar rectangular window predicate.
//!
//! A particle is kept when its straight-line trajectory, carried forward to
//! the plane `z = z_plane`, crosses that plane inside the rectangle
//! `[x_min, x_max] × [y_min, y_max]`.

use crate::data::ParticleRecord;
use crate::error::{PhspError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Filter geometry, in centimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometryWindow {
    pub z_plane: f32,
    pub x_min: f32,
    pub x_max: f32,
    pub y_min: f32,
    pub y_max: f32,
}

impl Default for GeometryWindow {
    /// Plane at 100 cm, 14 × 14 cm window centred on the axis.
    fn default() -> Self {
        Self {
            z_plane: 100.0,
            x_min: -7.0,
            x_max: 7.0,
            y_min: -7.0,
            y_max: 7.0,
        }
    }
}

impl GeometryWindow {
    /// Create a validated window.
    pub fn new(z_plane: f32, x_min: f32, x_max: f32, y_min: f32, y_max: f32) -> Result<Self> {
        let window = Self {
            z_plane,
            x_min,
            x_max,
            y_min,
            y_max,
        };
        window.validate()?;
        Ok(window)
    }

    /// Check that all bounds are finite and ordered.
    pub fn validate(&self) -> Result<()> {
        let values = [self.z_plane, self.x_min, self.x_max, self.y_min, self.y_max];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(PhspError::InvalidParameter(
                "Window bounds and plane position must be finite".to_string(),
            ));
        }
        if self.x_max < self.x_min {
            return Err(PhspError::InvalidParameter(format!(
                "x_max ({}) cannot be less than x_min ({})",
                self.x_max, self.x_min
            )));
        }
        if self.y_max < self.y_min {
            return Err(PhspError::InvalidParameter(format!(
                "y_max ({}) cannot be less than y_min ({})",
                self.y_max, self.y_min
            )));
        }
        Ok(())
    }

    /// Closed-interval containment test in the plane.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }
}

impl fmt::Display for GeometryWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "z = {} cm, x in [{}, {}], y in [{}, {}]",
            self.z_plane, self.x_min, self.x_max, self.y_min, self.y_max
        )
    }
}

/// Outcome of the window test for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    Accept,
    /// `w <= 0`: not moving toward the plane.
    RejectBackward,
    RejectOutsideWindow,
}

impl Decision {
    pub fn is_accept(&self) -> bool {
        matches!(self, Decision::Accept)
    }
}

/// Point where the record's trajectory meets the window plane.
///
/// Records upstream of the plane are carried forward along `(u, v, w)`;
/// records at or past it keep their own `(x, y)`. Returns `None` when
/// `w <= 0`, without dividing.
pub fn project(record: &ParticleRecord, window: &GeometryWindow) -> Option<(f32, f32)> {
    if record.w <= 0.0 {
        return None;
    }
    if record.z < window.z_plane {
        let t = (window.z_plane - record.z) / record.w;
        Some((record.x + record.u * t, record.y + record.v * t))
    } else {
        Some((record.x, record.y))
    }
}

/// Classify one record against the window.
pub fn evaluate(record: &ParticleRecord, window: &GeometryWindow) -> Decision {
    match project(record, window) {
        None => Decision::RejectBackward,
        Some((x, y)) if window.contains(x, y) => Decision::Accept,
        Some(_) => Decision::RejectOutsideWindow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ParticleType;

    fn photon(position: [f32; 3], direction: [f32; 3]) -> ParticleRecord {
        ParticleRecord::new(ParticleType::Photon, position, direction)
    }

    #[test]
    fn test_on_axis_upstream_is_accepted() {
        let window = GeometryWindow::default();
        let rec = photon([0.0, 0.0, 50.0], [0.0, 0.0, 1.0]);

        assert_eq!(project(&rec, &window), Some((0.0, 0.0)));
        assert_eq!(evaluate(&rec, &window), Decision::Accept);
    }

    #[test]
    fn test_offset_upstream_is_outside() {
        let window = GeometryWindow::default();
        let rec = photon([10.0, 0.0, 50.0], [0.0, 0.0, 1.0]);

        assert_eq!(project(&rec, &window), Some((10.0, 0.0)));
        assert_eq!(evaluate(&rec, &window), Decision::RejectOutsideWindow);
    }

    #[test]
    fn test_backward_is_rejected_without_projection() {
        let window = GeometryWindow::default();
        let rec = photon([0.0, 0.0, 50.0], [0.0, 0.0, -0.5]);

        assert_eq!(project(&rec, &window), None);
        assert_eq!(evaluate(&rec, &window), Decision::RejectBackward);
    }

    #[test]
    fn test_backward_ignores_position() {
        let window = GeometryWindow::default();
        for z in [-500.0, 0.0, 100.0, 250.0] {
            for w in [0.0, -0.0, -1e-7, -1.0] {
                let rec = photon([0.0, 0.0, z], [0.0, 0.0, w]);
                assert_eq!(evaluate(&rec, &window), Decision::RejectBackward);
            }
        }
    }

    #[test]
    fn test_projection_matches_formula() {
        let window = GeometryWindow::new(100.0, -50.0, 50.0, -50.0, 50.0).unwrap();
        let (x, y, z) = (1.5f32, -2.25f32, 20.0f32);
        let (u, v, w) = (0.1f32, -0.2f32, 0.974_679_4f32);
        let rec = photon([x, y, z], [u, v, w]);

        let t = (100.0f32 - z) / w;
        assert_eq!(project(&rec, &window), Some((x + u * t, y + v * t)));
    }

    #[test]
    fn test_oblique_track_lands_inside() {
        let window = GeometryWindow::default();
        // Starts outside the window but drifts in over 50 cm.
        let rec = photon([-10.0, 3.0, 50.0], [0.1, 0.0, 0.995]);

        let (x, _) = project(&rec, &window).unwrap();
        approx::assert_relative_eq!(x, -10.0 + 0.1 * 50.0 / 0.995, epsilon = 1e-4);
        assert_eq!(evaluate(&rec, &window), Decision::Accept);
    }

    #[test]
    fn test_at_or_past_plane_uses_raw_position() {
        let window = GeometryWindow::default();
        // A steep direction would move far outside if it were projected.
        let at_plane = photon([6.0, -6.0, 100.0], [0.9, 0.0, 0.1]);
        let past_plane = photon([6.0, -6.0, 180.0], [0.9, 0.0, 0.1]);

        assert_eq!(project(&at_plane, &window), Some((6.0, -6.0)));
        assert_eq!(project(&past_plane, &window), Some((6.0, -6.0)));
        assert_eq!(evaluate(&at_plane, &window), Decision::Accept);
        assert_eq!(evaluate(&past_plane, &window), Decision::Accept);
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let window = GeometryWindow::default();
        for (x, y) in [(-7.0, 0.0), (7.0, 0.0), (0.0, -7.0), (0.0, 7.0), (7.0, 7.0)] {
            let rec = photon([x, y, 100.0], [0.0, 0.0, 1.0]);
            assert_eq!(evaluate(&rec, &window), Decision::Accept, "({}, {})", x, y);
        }

        let just_outside = photon([7.0001, 0.0, 100.0], [0.0, 0.0, 1.0]);
        assert_eq!(evaluate(&just_outside, &window), Decision::RejectOutsideWindow);
    }

    #[test]
    fn test_nan_position_is_outside() {
        let window = GeometryWindow::default();
        let rec = photon([f32::NAN, 0.0, 100.0], [0.0, 0.0, 1.0]);
        assert_eq!(evaluate(&rec, &window), Decision::RejectOutsideWindow);
    }

    #[test]
    fn test_invalid_windows() {
        assert!(GeometryWindow::new(100.0, 7.0, -7.0, -7.0, 7.0).is_err());
        assert!(GeometryWindow::new(100.0, -7.0, 7.0, 7.0, -7.0).is_err());
        assert!(GeometryWindow::new(f32::NAN, -7.0, 7.0, -7.0, 7.0).is_err());
        assert!(GeometryWindow::new(100.0, f32::NEG_INFINITY, 7.0, -7.0, 7.0).is_err());
        // Degenerate zero-width window is allowed.
        assert!(GeometryWindow::new(100.0, 0.0, 0.0, 0.0, 0.0).is_ok());
    }
}
