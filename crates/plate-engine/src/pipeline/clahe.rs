//! Contrast-limited adaptive histogram equalization on 8-bit grayscale.
//!
//! The image is split into a grid of tiles. Each tile gets its own clipped
//! histogram and equalization table, and every pixel is mapped through a
//! bilinear blend of the tables of its four nearest tile centers.

use image::{GrayImage, Luma};

const BINS: usize = 256;

/// Equalize `image` with the given clip limit and tile grid size.
///
/// A clip limit of zero or less disables clipping (plain adaptive
/// equalization). The grid is shrunk on an axis where the image is
/// smaller than the requested number of tiles.
pub fn clahe(image: &GrayImage, clip_limit: f32, grid: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }

    let tile_w = width.div_ceil(grid.clamp(1, width));
    let tile_h = height.div_ceil(grid.clamp(1, height));
    // Recount so that no tile starts past the image edge.
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let luts: Vec<[u8; BINS]> = (0..tiles_y)
        .flat_map(|ty| (0..tiles_x).map(move |tx| (tx, ty)))
        .map(|(tx, ty)| tile_lut(image, tx * tile_w, ty * tile_h, tile_w, tile_h, clip_limit))
        .collect();
    let lut = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];

    let inv_tw = 1.0 / tile_w as f32;
    let inv_th = 1.0 / tile_h as f32;

    let mut out = GrayImage::new(width, height);
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let (tx1, tx2, xa) = neighbours(x as f32 * inv_tw - 0.5, tiles_x);
        let (ty1, ty2, ya) = neighbours(y as f32 * inv_th - 0.5, tiles_y);
        let v = image.get_pixel(x, y)[0] as usize;

        let top = lut(tx1, ty1)[v] as f32 * (1.0 - xa) + lut(tx2, ty1)[v] as f32 * xa;
        let bottom = lut(tx1, ty2)[v] as f32 * (1.0 - xa) + lut(tx2, ty2)[v] as f32 * xa;
        let value = top * (1.0 - ya) + bottom * ya;

        *pixel = Luma([value.round().clamp(0.0, 255.0) as u8]);
    }
    out
}

/// Two tile indices bracketing a fractional tile coordinate and the weight
/// of the second one.
fn neighbours(pos: f32, tiles: u32) -> (u32, u32, f32) {
    let first = pos.floor();
    let weight = pos - first;
    let last = tiles as i64 - 1;
    let lo = (first as i64).clamp(0, last) as u32;
    let hi = (first as i64 + 1).clamp(0, last) as u32;
    (lo, hi, weight)
}

fn tile_lut(
    image: &GrayImage,
    x0: u32,
    y0: u32,
    tile_w: u32,
    tile_h: u32,
    clip_limit: f32,
) -> [u8; BINS] {
    let (width, height) = image.dimensions();
    let x1 = (x0 + tile_w).min(width);
    let y1 = (y0 + tile_h).min(height);

    let mut hist = [0u32; BINS];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[image.get_pixel(x, y)[0] as usize] += 1;
        }
    }

    let area = (x1.saturating_sub(x0) * y1.saturating_sub(y0)).max(1);

    if clip_limit > 0.0 {
        let limit = ((clip_limit * area as f32 / BINS as f32) as u32).max(1);
        clip_histogram(&mut hist, limit);
    }

    let scale = (BINS - 1) as f32 / area as f32;
    let mut lut = [0u8; BINS];
    let mut sum = 0u32;
    for (entry, &count) in lut.iter_mut().zip(&hist) {
        sum += count;
        *entry = (sum as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Cut every bin at `limit` and spread the excess evenly over all bins.
fn clip_histogram(hist: &mut [u32; BINS], limit: u32) {
    let mut excess = 0u32;
    for count in hist.iter_mut() {
        if *count > limit {
            excess += *count - limit;
            *count = limit;
        }
    }

    let per_bin = excess / BINS as u32;
    let mut residual = excess % BINS as u32;
    for count in hist.iter_mut() {
        *count += per_bin;
    }

    if residual > 0 {
        let step = (BINS as u32 / residual).max(1) as usize;
        for count in hist.iter_mut().step_by(step) {
            if residual == 0 {
                break;
            }
            *count += 1;
            residual -= 1;
        }
    }
}
