use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GridGraphParams {
    /// Nearest neighbours inspected per corner.
    pub k_neighbors: usize,
    /// Maximal angle between an edge and the local grid axis it extends.
    pub axis_tolerance_deg: f32,
    /// Accepted edge length relative to the local axis length.
    pub min_spacing_ratio: f32,
    pub max_spacing_ratio: f32,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            k_neighbors: 8,
            axis_tolerance_deg: 25.0,
            min_spacing_ratio: 0.6,
            max_spacing_ratio: 1.5,
        }
    }
}

/// Parameters specific to the chessboard detector.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChessboardParams {
    /// Minimal corner strength to consider.
    pub min_strength: f32,

    /// Number of seed corners (closest to the centroid first) tried before
    /// giving up.
    pub max_seeds: usize,

    pub graph: GridGraphParams,
}

impl Default for ChessboardParams {
    fn default() -> Self {
        Self {
            min_strength: 0.0,
            max_seeds: 8,
            graph: GridGraphParams::default(),
        }
    }
}
