//! Perspective (homography) mapping and image warp
//!
//! Maps the four keystone source points onto the canvas corners and resamples
//! the frame through the resulting projective transform. The solve is a
//! Direct Linear Transform over the 4 correspondences, reduced with Gaussian
//! elimination; a singular configuration degrades to an identity-ish matrix
//! instead of erroring, so collinear or overlapping points still produce a
//! best-effort (visually broken) frame.

use image::RgbImage;
use rayon::prelude::*;

/// A projective transform between two quadrilaterals, with its inverse for
/// destination-to-source warping.
#[derive(Debug, Clone)]
pub struct PerspectiveMap {
    forward: [f64; 9],
    inverse: [f64; 9],
}

impl PerspectiveMap {
    /// Compute the transform taking each `src[i]` to `dst[i]`.
    pub fn new(src: [(f64, f64); 4], dst: [(f64, f64); 4]) -> Self {
        Self {
            forward: homography(src, dst),
            inverse: homography(dst, src),
        }
    }

    /// Map a source point into destination space.
    #[allow(dead_code)]
    #[inline]
    pub fn map(&self, x: f64, y: f64) -> (f64, f64) {
        apply(&self.forward, x, y)
    }

    /// Map a destination point back into source space.
    #[inline]
    pub fn unmap(&self, x: f64, y: f64) -> (f64, f64) {
        apply(&self.inverse, x, y)
    }

    /// Resample `src` through the transform into a `width`x`height` image.
    ///
    /// Each destination pixel is inverse-mapped into the source; samples
    /// inside the source are bilinearly interpolated, samples outside are
    /// filled black. Rows are independent and warped in parallel.
    pub fn warp(&self, src: &RgbImage, width: u32, height: u32) -> RgbImage {
        let src_w = src.width() as usize;
        let src_h = src.height() as usize;
        let src_buf = src.as_raw().as_slice();
        let src_stride = src_w * 3;

        let mut out = RgbImage::new(width, height);
        let dst_stride = width as usize * 3;

        let dst_buf: &mut [u8] = &mut out;
        dst_buf
            .par_chunks_exact_mut(dst_stride)
            .enumerate()
            .for_each(|(dst_y, row)| {
                for dst_x in 0..width as usize {
                    let (sx, sy) = self.unmap(dst_x as f64, dst_y as f64);
                    let pixel =
                        sample_or_black(src_buf, src_stride, src_w, src_h, sx, sy);
                    let off = dst_x * 3;
                    row[off..off + 3].copy_from_slice(&pixel);
                }
            });

        out
    }
}

/// Compute a 3x3 homography from 4 point correspondences (DLT with h9 = 1).
fn homography(src: [(f64, f64); 4], dst: [(f64, f64); 4]) -> [f64; 9] {
    // Two equations per correspondence (x,y) -> (x',y'):
    //   x*h1 + y*h2 + h3 - x'*x*h7 - x'*y*h8 = x'
    //   x*h4 + y*h5 + h6 - y'*x*h7 - y'*y*h8 = y'
    let mut a = [[0.0f64; 8]; 8];
    let mut b = [0.0f64; 8];

    for i in 0..4 {
        let (x, y) = src[i];
        let (xp, yp) = dst[i];

        a[i * 2] = [x, y, 1.0, 0.0, 0.0, 0.0, -xp * x, -xp * y];
        b[i * 2] = xp;

        a[i * 2 + 1] = [0.0, 0.0, 0.0, x, y, 1.0, -yp * x, -yp * y];
        b[i * 2 + 1] = yp;
    }

    let h = solve_8x8(&mut a, &mut b);
    [h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0]
}

/// Gaussian elimination with partial pivoting. A singular system yields the
/// identity coefficients rather than an error.
fn solve_8x8(a: &mut [[f64; 8]; 8], b: &mut [f64; 8]) -> [f64; 8] {
    const N: usize = 8;

    for col in 0..N {
        let mut max_row = col;
        let mut max_val = a[col][col].abs();
        for row in (col + 1)..N {
            if a[row][col].abs() > max_val {
                max_val = a[row][col].abs();
                max_row = row;
            }
        }
        if max_row != col {
            a.swap(col, max_row);
            b.swap(col, max_row);
        }

        let pivot = a[col][col];
        if pivot.abs() < 1e-10 {
            return [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0];
        }

        for row in (col + 1)..N {
            let factor = a[row][col] / pivot;
            for j in col..N {
                a[row][j] -= factor * a[col][j];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0f64; 8];
    for i in (0..N).rev() {
        let mut sum = b[i];
        for j in (i + 1)..N {
            sum -= a[i][j] * x[j];
        }
        x[i] = sum / a[i][i];
    }
    x
}

#[inline]
fn apply(h: &[f64; 9], x: f64, y: f64) -> (f64, f64) {
    let w = h[6] * x + h[7] * y + h[8];
    if w.abs() < 1e-10 {
        // Point at infinity; pass through rather than divide by zero.
        return (x, y);
    }
    (
        (h[0] * x + h[1] * y + h[2]) / w,
        (h[3] * x + h[4] * y + h[5]) / w,
    )
}

/// Bilinear sample, with black fill outside the source. A half-pixel
/// tolerance band keeps numerically-exact border coordinates inside, so an
/// identity transform reproduces the frame edge for edge.
#[inline]
fn sample_or_black(
    src: &[u8],
    stride: usize,
    width: usize,
    height: usize,
    x: f64,
    y: f64,
) -> [u8; 3] {
    if width == 0
        || height == 0
        || x < -0.5
        || y < -0.5
        || x > (width - 1) as f64 + 0.5
        || y > (height - 1) as f64 + 0.5
    {
        return [0, 0, 0];
    }

    let x = x.clamp(0.0, (width - 1) as f64);
    let y = y.clamp(0.0, (height - 1) as f64);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let mut out = [0u8; 3];
    for c in 0..3 {
        let p00 = src[y0 * stride + x0 * 3 + c] as f64;
        let p10 = src[y0 * stride + x1 * 3 + c] as f64;
        let p01 = src[y1 * stride + x0 * 3 + c] as f64;
        let p11 = src[y1 * stride + x1 * 3 + c] as f64;

        let value = p00 * (1.0 - fx) * (1.0 - fy)
            + p10 * fx * (1.0 - fy)
            + p01 * (1.0 - fx) * fy
            + p11 * fx * fy;

        out[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    out
}
