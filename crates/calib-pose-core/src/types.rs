use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// A corner candidate from an X-junction detector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Corner {
    /// Corner position in pixel coordinates.
    pub position: Point2<f32>,

    /// Dominant orientation at the corner, in radians, defined modulo π.
    pub orientation: f32,

    /// Strength / response of the corner detector.
    pub strength: f32,
}

impl Corner {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            position: Point2::new(x, y),
            orientation: 0.0,
            strength: 1.0,
        }
    }
}

/// An identified fiducial marker in one frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    /// Codeword index in the dictionary.
    pub id: u32,
    /// Image corners, clockwise starting at the marker's own top-left.
    pub corners: [Point2<f32>; 4],
    /// Physical edge length; pose translations come out in the same unit.
    pub size: f64,
    /// Quarter turns between the dictionary codeword and the observed grid.
    pub rotation: u8,
    /// Bit errors corrected during identification.
    pub hamming: u8,
    /// Fraction of border cells that read black.
    pub border_score: f32,
}

impl Marker {
    pub fn center(&self) -> Point2<f32> {
        let sum = self
            .corners
            .iter()
            .fold(Vector2::zeros(), |acc, c| acc + c.coords);
        Point2::from(sum / 4.0)
    }

    /// Corners in double precision for the geometry code.
    pub fn corners_f64(&self) -> [Point2<f64>; 4] {
        self.corners.map(|c| Point2::new(c.x as f64, c.y as f64))
    }
}
