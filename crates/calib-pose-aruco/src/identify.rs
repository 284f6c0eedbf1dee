//! Marker identification on candidate quads.
//!
//! The quad is mapped to a canonical square of `bits + 2 * border` cells by
//! a homography. Each cell is read as the 3×3 mean around its centre and
//! binarised with an Otsu threshold computed from a denser grid inside the
//! quad. Border cells must read black; inner cells give the code
//! (white = 1), which is matched under all four rotations.

use crate::matcher::Matcher;
use crate::quad::{detect_quads, validate_quad, DetectedQuadrilateral, QuadGate, QuadParams};
use crate::threshold::otsu_threshold_from_samples;
use crate::{Dictionary, DictionaryError};
use calib_pose_core::{homography_from_4pt, GrayImageView, Homography, Marker};
use log::{debug, trace};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Why a candidate quad is not a marker. Expected and frequent.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum IdentificationRejected {
    #[error("quadrilateral is not convex")]
    NonConvex,
    #[error("quadrilateral too small (shortest side {min_side:.1} px, area {area:.1} px²)")]
    TooSmall { min_side: f32, area: f32 },
    #[error("implausible side ratio {ratio:.2}")]
    AspectRatio { ratio: f32 },
    #[error("sampling grid leaves the image")]
    SamplingOutOfBounds,
    #[error("border score {score:.2} below {min:.2}")]
    BorderMismatch { score: f32, min: f32 },
    #[error("no codeword within {max_hamming} bits")]
    NoCodewordMatch { max_hamming: u8 },
    #[error("dictionary is invalid")]
    InvalidDictionary,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifyParams {
    /// Physical marker side, copied into `Marker::size`.
    pub marker_length: f64,
    /// Border width in cells.
    pub border_bits: usize,
    /// Minimal fraction of border cells reading black.
    pub min_border_score: f32,
    /// Override of the dictionary's `max_correction_bits`.
    pub max_hamming: Option<u8>,
    pub gate: QuadGate,
}

impl Default for IdentifyParams {
    fn default() -> Self {
        Self {
            marker_length: 1.0,
            border_bits: 1,
            min_border_score: 0.75,
            max_hamming: None,
            gate: QuadGate::default(),
        }
    }
}

/// Canonical-square sample positions, in cell units.
#[derive(Clone, Debug)]
struct SampleGrid {
    cells: usize,
    /// Row-major cell centres.
    points: Vec<Point2<f64>>,
    threshold_points: Vec<Point2<f64>>,
}

impl SampleGrid {
    fn new(bits: usize, border: usize) -> Self {
        const THRESH_SUBDIV: usize = 3;
        let cells = bits + 2 * border;

        let points = (0..cells)
            .flat_map(|cy| {
                (0..cells).map(move |cx| Point2::new(cx as f64 + 0.5, cy as f64 + 0.5))
            })
            .collect();

        let fine = cells * THRESH_SUBDIV;
        let step = cells as f64 / fine as f64;
        let threshold_points = (0..fine)
            .flat_map(|ty| {
                (0..fine).map(move |tx| {
                    Point2::new((tx as f64 + 0.5) * step, (ty as f64 + 0.5) * step)
                })
            })
            .collect();

        Self {
            cells,
            points,
            threshold_points,
        }
    }

    fn square(&self) -> [Point2<f64>; 4] {
        let s = self.cells as f64;
        [
            Point2::new(0.0, 0.0),
            Point2::new(s, 0.0),
            Point2::new(s, s),
            Point2::new(0.0, s),
        ]
    }
}

/// Dictionary, matcher and sampling layout prepared once and shared
/// read-only by every frame.
#[derive(Clone, Debug)]
pub struct MarkerIdentifier {
    matcher: Matcher,
    params: IdentifyParams,
    grid: SampleGrid,
}

impl MarkerIdentifier {
    pub fn new(dictionary: Dictionary, params: IdentifyParams) -> Result<Self, DictionaryError> {
        let max = params.max_hamming.unwrap_or(dictionary.max_correction_bits);
        let matcher = Matcher::new(dictionary, max)?;
        let grid = SampleGrid::new(matcher.dictionary().marker_size, params.border_bits);
        Ok(Self {
            matcher,
            params,
            grid,
        })
    }

    #[inline]
    pub fn dictionary(&self) -> &Dictionary {
        self.matcher.dictionary()
    }

    #[inline]
    pub fn params(&self) -> &IdentifyParams {
        &self.params
    }

    pub fn identify(&self, quad: &DetectedQuadrilateral, image: &GrayImageView<'_>) -> Option<Marker> {
        match self.try_identify(quad, image) {
            Ok(marker) => Some(marker),
            Err(reason) => {
                trace!("candidate rejected: {reason}");
                None
            }
        }
    }

    pub fn try_identify(
        &self,
        quad: &DetectedQuadrilateral,
        image: &GrayImageView<'_>,
    ) -> Result<Marker, IdentificationRejected> {
        validate_quad(quad, &self.params.gate)?;

        let h = homography_from_4pt(&self.grid.square(), &quad.corners_f64())
            .ok_or(IdentificationRejected::NonConvex)?;

        let samples = self
            .grid
            .points
            .iter()
            .map(|p| sample_at(image, &h, *p))
            .collect::<Option<Vec<u8>>>()
            .ok_or(IdentificationRejected::SamplingOutOfBounds)?;
        let thr_samples: Vec<u8> = self
            .grid
            .threshold_points
            .iter()
            .filter_map(|p| sample_at(image, &h, *p))
            .collect();

        let (code, border_score) = self.read_code(&samples, &thr_samples);
        if border_score < self.params.min_border_score {
            return Err(IdentificationRejected::BorderMismatch {
                score: border_score,
                min: self.params.min_border_score,
            });
        }

        let m = self
            .matcher
            .match_code(code)
            .ok_or(IdentificationRejected::NoCodewordMatch {
                max_hamming: self.matcher.max_hamming(),
            })?;

        // Observed grid = codeword turned `rotation` quarter turns clockwise,
        // so the codeword's top-left sits at quad corner `rotation`.
        let rot = m.rotation as usize;
        Ok(Marker {
            id: m.id,
            corners: [0, 1, 2, 3].map(|k| quad.corners[(k + rot) % 4]),
            size: self.params.marker_length,
            rotation: m.rotation,
            hamming: m.hamming,
            border_score,
        })
    }

    /// Code bits (white = 1) and the black fraction of the border ring.
    fn read_code(&self, samples: &[u8], thr_samples: &[u8]) -> (u64, f32) {
        let thr = if thr_samples.is_empty() {
            otsu_threshold_from_samples(samples)
        } else {
            otsu_threshold_from_samples(thr_samples)
        };

        let cells = self.grid.cells;
        let border = self.params.border_bits;
        let bits = self.dictionary().marker_size;

        let mut border_ok = 0u32;
        let mut border_total = 0u32;
        let mut code = 0u64;
        for cy in 0..cells {
            for cx in 0..cells {
                let black = samples[cy * cells + cx] < thr;
                let in_border = cx < border
                    || cy < border
                    || cx >= border + bits
                    || cy >= border + bits;
                if in_border {
                    border_total += 1;
                    border_ok += black as u32;
                } else if !black {
                    code |= 1 << ((cy - border) * bits + (cx - border));
                }
            }
        }

        let border_score = if border_total == 0 {
            1.0
        } else {
            border_ok as f32 / border_total as f32
        };
        (code, border_score)
    }

    /// Extract candidate quads from `image` and identify them.
    ///
    /// Keeps one marker per id: fewest corrected bits, then best border.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, image, quad_params), fields(width = image.width, height = image.height))
    )]
    pub fn detect_markers(&self, image: &GrayImageView<'_>, quad_params: &QuadParams) -> Vec<Marker> {
        let quads = detect_quads(image, quad_params);
        let markers: Vec<Marker> = quads
            .iter()
            .filter_map(|q| self.identify(q, image))
            .collect();
        debug!("{} quads, {} markers", quads.len(), markers.len());
        dedup_by_id_keep_best(markers)
    }
}

/// Identify one quad against `dictionary`.
pub fn identify(
    quad: &DetectedQuadrilateral,
    dictionary: &Dictionary,
    image: &GrayImageView<'_>,
    params: &IdentifyParams,
) -> Option<Marker> {
    try_identify(quad, dictionary, image, params).ok()
}

pub fn try_identify(
    quad: &DetectedQuadrilateral,
    dictionary: &Dictionary,
    image: &GrayImageView<'_>,
    params: &IdentifyParams,
) -> Result<Marker, IdentificationRejected> {
    MarkerIdentifier::new(dictionary.clone(), params.clone())
        .map_err(|_| IdentificationRejected::InvalidDictionary)?
        .try_identify(quad, image)
}

fn sample_at(image: &GrayImageView<'_>, h: &Homography, p: Point2<f64>) -> Option<u8> {
    let q = h.apply(p);
    sample_mean_3x3(image, q.x as f32, q.y as f32)
}

/// Mean of the 3×3 block around the nearest pixel centre.
fn sample_mean_3x3(img: &GrayImageView<'_>, x: f32, y: f32) -> Option<u8> {
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    let ix = x.round() as i32;
    let iy = y.round() as i32;
    if ix < 1 || iy < 1 || ix + 1 >= img.width as i32 || iy + 1 >= img.height as i32 {
        return None;
    }

    let mut sum = 0u32;
    for dy in -1..=1 {
        for dx in -1..=1 {
            sum += img.get(ix + dx, iy + dy) as u32;
        }
    }
    Some((sum / 9) as u8)
}

fn dedup_by_id_keep_best(mut markers: Vec<Marker>) -> Vec<Marker> {
    markers.sort_by(|a, b| {
        a.hamming
            .cmp(&b.hamming)
            .then(b.border_score.total_cmp(&a.border_score))
    });
    let mut seen = HashSet::new();
    markers.retain(|m| seen.insert(m.id));
    markers.sort_by_key(|m| m.id);
    markers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::{DICT_4X4_250, DICT_4X4_50};
    use crate::rotate_code_u64;
    use approx::assert_relative_eq;
    use crate::testutil::render_marker_image;

    /// Exact outline of a marker drawn by `render_marker_image`.
    fn outline(bits: usize, cell_px: usize, margin: usize) -> DetectedQuadrilateral {
        let lo = margin as f32 - 0.5;
        let hi = lo + ((bits + 2) * cell_px) as f32;
        DetectedQuadrilateral::new([
            Point2::new(lo, lo),
            Point2::new(hi, lo),
            Point2::new(hi, hi),
            Point2::new(lo, hi),
        ])
    }

    fn single_code_dictionary(max_correction_bits: u8) -> Dictionary {
        Dictionary::new("single", 4, max_correction_bits, vec![0x4cad]).expect("dictionary")
    }

    #[test]
    fn accepts_up_to_the_correction_threshold() {
        let dict = single_code_dictionary(2);
        let quad = outline(4, 10, 20);
        let params = IdentifyParams::default();

        let two_flips = render_marker_image(0x4cad ^ 0b1000_0001, 4, 10, 20);
        let m = identify(&quad, &dict, &two_flips.view(), &params).expect("two flips accepted");
        assert_eq!((m.id, m.hamming, m.rotation), (0, 2, 0));
        assert_eq!(m.corners, quad.corners);

        let three_flips = render_marker_image(0x4cad ^ 0b1000_0001 ^ (1 << 10), 4, 10, 20);
        assert_eq!(
            try_identify(&quad, &dict, &three_flips.view(), &params),
            Err(IdentificationRejected::NoCodewordMatch { max_hamming: 2 })
        );
    }

    #[test]
    fn rotated_marker_reports_its_own_top_left() {
        let id = 7;
        let code = DICT_4X4_50.codes[id];
        // Drawn turned one quarter clockwise.
        let img = render_marker_image(rotate_code_u64(code, 4, 1), 4, 10, 20);
        let quad = outline(4, 10, 20);
        let ident = MarkerIdentifier::new(
            DICT_4X4_50,
            IdentifyParams {
                marker_length: 0.07,
                ..IdentifyParams::default()
            },
        )
        .expect("identifier");

        let m = ident.try_identify(&quad, &img.view()).expect("marker");
        assert_eq!((m.id, m.rotation, m.hamming), (id as u32, 1, 0));
        assert_eq!(m.size, 0.07);
        // The codeword's top-left cell is now at the image top-right.
        assert_eq!(m.corners[0], quad.corners[1]);
        assert_eq!(m.corners[3], quad.corners[0]);
    }

    #[test]
    fn missing_border_and_out_of_frame_are_rejected() {
        let dict = single_code_dictionary(1);
        let params = IdentifyParams::default();
        let blank = calib_pose_core::GrayImage::filled(100, 100, 255);
        let quad = outline(4, 10, 20);
        assert!(matches!(
            try_identify(&quad, &dict, &blank.view(), &params),
            Err(IdentificationRejected::BorderMismatch { .. })
        ));

        let img = render_marker_image(0x4cad, 4, 10, 20);
        let shifted = DetectedQuadrilateral::new(quad.corners.map(|c| c + nalgebra::Vector2::new(60.0, 0.0)));
        assert_eq!(
            try_identify(&shifted, &dict, &img.view(), &params),
            Err(IdentificationRejected::SamplingOutOfBounds)
        );
    }

    #[test]
    fn detects_markers_end_to_end() {
        let code = DICT_4X4_50.codes[0];
        let img = render_marker_image(code, 4, 12, 30);
        let ident = MarkerIdentifier::new(DICT_4X4_50, IdentifyParams::default()).expect("identifier");
        let markers = ident.detect_markers(&img.view(), &QuadParams::default());
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].id, 0);
        assert!((markers[0].corners[0] - Point2::new(29.5, 29.5)).norm() < 0.3);
    }

    #[test]
    fn identifies_ids_beyond_the_first_fifty() {
        for id in [50usize, 137, 249] {
            let img = render_marker_image(DICT_4X4_250.codes[id], 4, 12, 30);
            let ident =
                MarkerIdentifier::new(DICT_4X4_250, IdentifyParams::default()).expect("identifier");
            let markers = ident.detect_markers(&img.view(), &QuadParams::default());
            assert_eq!(markers.len(), 1, "id {id}");
            assert_eq!((markers[0].id, markers[0].rotation), (id as u32, 0));
            assert_relative_eq!(markers[0].corners[0].x, 29.5, epsilon = 0.3);
            assert_relative_eq!(markers[0].corners[0].y, 29.5, epsilon = 0.3);
        }
    }
}
