//! Global and local thresholding for quad extraction and bit reading.

use calib_pose_core::GrayImageView;

/// Otsu threshold of a sample set; values `< t` read as black.
pub(crate) fn otsu_threshold_from_samples(samples: &[u8]) -> u8 {
    if samples.is_empty() {
        return 127;
    }

    let (min_v, max_v) = samples
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if min_v == max_v {
        return min_v;
    }

    let mut hist = [0u32; 256];
    for &v in samples {
        hist[v as usize] += 1;
    }
    if hist.iter().filter(|&&h| h > 0).count() <= 2 {
        return ((min_v as u16 + max_v as u16 + 1) / 2) as u8;
    }

    let total = samples.len() as f64;
    let sum_total: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &h)| i as f64 * h as f64)
        .sum();

    let mut sum_b = 0f64;
    let mut w_b = 0f64;
    let mut best_var = -1f64;
    let mut best_t = 127u8;

    for (t, &h) in hist.iter().enumerate() {
        w_b += h as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }

        sum_b += t as f64 * h as f64;
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;

        let var_between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var_between > best_var {
            best_var = var_between;
            // Class boundary lies above the last background bin.
            best_t = (t as u8).saturating_add(1);
        }
    }

    best_t
}

/// Dark mask from a local mean threshold.
///
/// A pixel is dark when it is more than `offset` below the mean of the
/// `(2 * radius + 1)²` window around it (clipped at the image border).
/// Window sums come from an integral image, so the cost does not depend on
/// `radius`.
pub fn adaptive_threshold(img: &GrayImageView<'_>, radius: usize, offset: f32) -> Vec<bool> {
    let (w, h) = (img.width, img.height);
    let stride = w + 1;
    let mut integral = vec![0u64; stride * (h + 1)];
    for y in 0..h {
        let mut row = 0u64;
        for x in 0..w {
            row += img.data[y * w + x] as u64;
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row;
        }
    }

    let mut mask = vec![false; w * h];
    for y in 0..h {
        let y0 = y.saturating_sub(radius);
        let y1 = (y + radius + 1).min(h);
        for x in 0..w {
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius + 1).min(w);
            let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                - integral[y0 * stride + x1]
                - integral[y1 * stride + x0];
            let area = ((y1 - y0) * (x1 - x0)) as f32;
            let mean = sum as f32 / area;
            mask[y * w + x] = (img.data[y * w + x] as f32) < mean - offset;
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use calib_pose_core::GrayImage;

    #[test]
    fn otsu_splits_bimodal_samples() {
        let mut s = vec![20u8; 50];
        s.extend(std::iter::repeat(30).take(10));
        s.extend(std::iter::repeat(200).take(40));
        s.extend(std::iter::repeat(220).take(20));
        let t = otsu_threshold_from_samples(&s);
        assert!(t > 30 && t <= 200, "threshold {t}");
        assert_eq!(otsu_threshold_from_samples(&[0, 255]), 128);
        assert_eq!(otsu_threshold_from_samples(&[9, 9, 9]), 9);
    }

    #[test]
    fn adaptive_threshold_marks_dark_square_edges() {
        let mut img = GrayImage::filled(60, 60, 230);
        for y in 20..40 {
            for x in 20..40 {
                img.put(x, y, 20);
            }
        }
        let mask = adaptive_threshold(&img.view(), 7, 5.0);
        assert!(mask[20 * 60 + 20]);
        assert!(mask[25 * 60 + 39]);
        assert!(!mask[10 * 60 + 10]);
        assert!(!mask[19 * 60 + 30]);
    }
}
