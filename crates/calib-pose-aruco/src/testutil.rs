use calib_pose_core::GrayImage;

/// Axis-aligned marker with a one-cell black border on a white background.
///
/// Cell `(cx, cy)` covers pixels `margin + cx * cell_px ..`, so the outer
/// edges sit at `margin - 0.5` and `margin + (bits + 2) * cell_px - 0.5`.
pub(crate) fn render_marker_image(code: u64, bits: usize, cell_px: usize, margin: usize) -> GrayImage {
    let cells = bits + 2;
    let size = 2 * margin + cells * cell_px;
    let mut img = GrayImage::filled(size, size, 255);

    for cy in 0..cells {
        for cx in 0..cells {
            let border = cx == 0 || cy == 0 || cx + 1 == cells || cy + 1 == cells;
            let white = !border && (code >> ((cy - 1) * bits + (cx - 1))) & 1 == 1;
            let value = if white { 255 } else { 0 };
            for yy in 0..cell_px {
                for xx in 0..cell_px {
                    img.put(margin + cx * cell_px + xx, margin + cy * cell_px + yy, value);
                }
            }
        }
    }
    img
}
