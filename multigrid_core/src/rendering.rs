//! Pixel buffers and the shape predicates used to draw tiles.
//!
//! Shapes are predicates over normalized `[0, 1]` tile coordinates and are
//! sampled at pixel centers by [`fill_coords`].

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An RGB image of shape `(height, width, 3)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Image {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl Image {
    /// Creates a black image.
    pub fn new(width: usize, height: usize) -> Self {
        Image {
            width,
            height,
            data: vec![0; width * height * 3],
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let i = (y * self.width + x) * 3;
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    #[inline]
    pub fn put_pixel(&mut self, x: usize, y: usize, rgb: [u8; 3]) {
        let i = (y * self.width + x) * 3;
        self.data[i..i + 3].copy_from_slice(&rgb);
    }

    /// Raw bytes in `(height, width, 3)` order.
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    /// Copies `src` into this image with its top-left corner at `(x0, y0)`.
    pub fn blit(&mut self, src: &Image, x0: usize, y0: usize) {
        let row = src.width * 3;
        for y in 0..src.height {
            let dst = ((y0 + y) * self.width + x0) * 3;
            self.data[dst..dst + row].copy_from_slice(&src.data[y * row..(y + 1) * row]);
        }
    }
}

/// Paints every pixel whose center satisfies `shape`.
pub fn fill_coords(img: &mut Image, shape: impl Fn(f32, f32) -> bool, color: [u8; 3]) {
    for y in 0..img.height {
        for x in 0..img.width {
            let yf = (y as f32 + 0.5) / img.height as f32;
            let xf = (x as f32 + 0.5) / img.width as f32;
            if shape(xf, yf) {
                img.put_pixel(x, y, color);
            }
        }
    }
}

/// Rotates `shape` by `theta` radians about `(cx, cy)`.
pub fn rotate_fn(
    shape: impl Fn(f32, f32) -> bool,
    cx: f32,
    cy: f32,
    theta: f32,
) -> impl Fn(f32, f32) -> bool {
    let (sin, cos) = (-theta).sin_cos();
    move |x, y| {
        let (dx, dy) = (x - cx, y - cy);
        shape(cx + dx * cos - dy * sin, cy + dy * cos + dx * sin)
    }
}

pub fn point_in_rect(xmin: f32, xmax: f32, ymin: f32, ymax: f32) -> impl Fn(f32, f32) -> bool {
    move |x, y| x >= xmin && x <= xmax && y >= ymin && y <= ymax
}

pub fn point_in_circle(cx: f32, cy: f32, r: f32) -> impl Fn(f32, f32) -> bool {
    move |x, y| (x - cx) * (x - cx) + (y - cy) * (y - cy) <= r * r
}

/// Points within distance `r` of the segment `(x0, y0)`–`(x1, y1)`.
pub fn point_in_line(x0: f32, y0: f32, x1: f32, y1: f32, r: f32) -> impl Fn(f32, f32) -> bool {
    let (dx, dy) = (x1 - x0, y1 - y0);
    let len = (dx * dx + dy * dy).sqrt();
    let (ux, uy) = (dx / len, dy / len);
    let (xmin, xmax) = (x0.min(x1) - r, x0.max(x1) + r);
    let (ymin, ymax) = (y0.min(y1) - r, y0.max(y1) + r);

    move |x, y| {
        if x < xmin || x > xmax || y < ymin || y > ymax {
            return false;
        }
        let a = ((x - x0) * ux + (y - y0) * uy).clamp(0.0, len);
        let (px, py) = (x0 + a * ux, y0 + a * uy);
        ((x - px) * (x - px) + (y - py) * (y - py)).sqrt() <= r
    }
}

pub fn point_in_triangle(
    a: (f32, f32),
    b: (f32, f32),
    c: (f32, f32),
) -> impl Fn(f32, f32) -> bool {
    move |x, y| {
        let v0 = (c.0 - a.0, c.1 - a.1);
        let v1 = (b.0 - a.0, b.1 - a.1);
        let v2 = (x - a.0, y - a.1);

        let dot00 = v0.0 * v0.0 + v0.1 * v0.1;
        let dot01 = v0.0 * v1.0 + v0.1 * v1.1;
        let dot02 = v0.0 * v2.0 + v0.1 * v2.1;
        let dot11 = v1.0 * v1.0 + v1.1 * v1.1;
        let dot12 = v1.0 * v2.0 + v1.1 * v2.1;

        let inv_denom = 1.0 / (dot00 * dot11 - dot01 * dot01);
        let u = (dot11 * dot02 - dot01 * dot12) * inv_denom;
        let v = (dot00 * dot12 - dot01 * dot02) * inv_denom;

        u >= 0.0 && v >= 0.0 && u + v < 1.0
    }
}

/// Blends the whole image towards white.
pub fn highlight_img(img: &mut Image) {
    const ALPHA: f32 = 0.30;
    for channel in img.data.iter_mut() {
        let c = *channel as f32;
        *channel = (c + ALPHA * (255.0 - c)).clamp(0.0, 255.0) as u8;
    }
}

/// Area-averages `factor × factor` blocks, truncating towards zero.
///
/// The image dimensions must be multiples of `factor`, which must be
/// positive.
pub fn downsample(img: &Image, factor: usize) -> Result<Image> {
    if factor == 0 {
        return Err(Error::invalid("factor", factor));
    }
    let mut out = Image::new(img.width / factor, img.height / factor);
    let area = (factor * factor) as u32;
    for y in 0..out.height {
        for x in 0..out.width {
            let mut sum = [0u32; 3];
            for sy in 0..factor {
                for sx in 0..factor {
                    let p = img.pixel(x * factor + sx, y * factor + sy);
                    for (acc, v) in sum.iter_mut().zip(p) {
                        *acc += v as u32;
                    }
                }
            }
            out.put_pixel(x, y, sum.map(|s| (s / area) as u8));
        }
    }
    Ok(out)
}
