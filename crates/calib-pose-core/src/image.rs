//! Lightweight 8-bit grayscale image types.
//!
//! Pixel centres sit at integer coordinates: pixel `(x, y)` covers
//! `[x - 0.5, x + 0.5) × [y - 0.5, y + 0.5)`.

use crate::ImageError;

#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

impl<'a> GrayImageView<'a> {
    /// Wrap a row-major buffer, checking its length.
    pub fn new(width: usize, height: usize, data: &'a [u8]) -> Result<Self, ImageError> {
        check_buffer(width, height, data.len())?;
        Ok(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn get(&self, x: i32, y: i32) -> u8 {
        get_gray(self, x, y)
    }

    #[inline]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= 0.0 && y >= 0.0 && x <= (self.width as f32 - 1.0) && y <= (self.height as f32 - 1.0)
    }

    pub fn to_owned_image(&self) -> GrayImage {
        GrayImage {
            width: self.width,
            height: self.height,
            data: self.data.to_vec(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    /// Image filled with a constant value.
    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Result<Self, ImageError> {
        check_buffer(width, height, data.len())?;
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    #[inline]
    pub fn put(&mut self, x: usize, y: usize, value: u8) {
        if x < self.width && y < self.height {
            self.data[y * self.width + x] = value;
        }
    }
}

fn check_buffer(width: usize, height: usize, len: usize) -> Result<(), ImageError> {
    let expected = width
        .checked_mul(height)
        .ok_or(ImageError::InvalidDimensions { width, height })?;
    if width == 0 || height == 0 {
        return Err(ImageError::InvalidDimensions { width, height });
    }
    if expected != len {
        return Err(ImageError::BufferLength { expected, got: len });
    }
    Ok(())
}

#[inline]
pub(crate) fn get_gray(src: &GrayImageView<'_>, x: i32, y: i32) -> u8 {
    if x < 0 || y < 0 || x >= src.width as i32 || y >= src.height as i32 {
        return 0;
    }
    src.data[y as usize * src.width + x as usize]
}

#[inline]
fn get_gray_clamped(src: &GrayImageView<'_>, x: i32, y: i32) -> u8 {
    let x = x.clamp(0, src.width as i32 - 1);
    let y = y.clamp(0, src.height as i32 - 1);
    src.data[y as usize * src.width + x as usize]
}

/// Bilinear sample; pixels outside the image read as 0.
#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f32, y: f32) -> f32 {
    bilinear_with(src, x, y, get_gray)
}

/// Bilinear sample with edge replication.
#[inline]
pub fn sample_bilinear_clamped(src: &GrayImageView<'_>, x: f32, y: f32) -> f32 {
    bilinear_with(src, x, y, get_gray_clamped)
}

#[inline]
pub fn sample_bilinear_u8(src: &GrayImageView<'_>, x: f32, y: f32) -> u8 {
    sample_bilinear(src, x, y).round().clamp(0.0, 255.0) as u8
}

#[inline]
fn bilinear_with(
    src: &GrayImageView<'_>,
    x: f32,
    y: f32,
    fetch: fn(&GrayImageView<'_>, i32, i32) -> u8,
) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = fetch(src, x0, y0) as f32;
    let p10 = fetch(src, x0 + 1, y0) as f32;
    let p01 = fetch(src, x0, y0 + 1) as f32;
    let p11 = fetch(src, x0 + 1, y0 + 1) as f32;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bilinear_interpolates_between_pixel_centres() {
        let img = GrayImage::from_raw(2, 1, vec![0, 100]).expect("image");
        let view = img.view();
        assert_eq!(sample_bilinear(&view, 0.0, 0.0), 0.0);
        assert_eq!(sample_bilinear(&view, 1.0, 0.0), 100.0);
        assert!((sample_bilinear(&view, 0.25, 0.0) - 25.0).abs() < 1e-4);
        assert!((sample_bilinear_clamped(&view, 3.0, 0.0) - 100.0).abs() < 1e-4);
    }

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(GrayImageView::new(4, 4, &[0u8; 15]).is_err());
        assert!(GrayImage::from_raw(0, 4, Vec::new()).is_err());
    }
}
