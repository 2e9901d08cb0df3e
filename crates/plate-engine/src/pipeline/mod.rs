//! Image preprocessing variants.
//!
//! A single frame is turned into several grayscale renditions so the OCR
//! reader gets more than one chance under poor lighting, shadows or dirt.
//! Variants are always produced in the same order:
//!
//! 1. `GRAY`: plain grayscale conversion
//! 2. `CLAHE`: tile-based adaptive equalization of the grayscale image
//! 3. `OTSU`: Gaussian blur followed by a global Otsu threshold
//! 4. `CONTRAST`: linear contrast stretch of the grayscale image
//!
//! Every variant has the dimensions of the input frame.

mod clahe;

pub use clahe::clahe;

use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::filter::gaussian_blur_f32;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Preprocessing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// CLAHE clip limit (relative to a uniform histogram)
    #[serde(default = "default_clahe_clip_limit")]
    pub clahe_clip_limit: f32,

    /// CLAHE tiles per axis
    #[serde(default = "default_clahe_grid")]
    pub clahe_grid: u32,

    /// Gaussian sigma applied before Otsu thresholding
    #[serde(default = "default_blur_sigma")]
    pub blur_sigma: f32,

    /// Linear contrast gain
    #[serde(default = "default_contrast_alpha")]
    pub contrast_alpha: f32,

    /// Linear contrast offset
    #[serde(default)]
    pub contrast_beta: f32,
}

fn default_clahe_clip_limit() -> f32 {
    2.0
}

fn default_clahe_grid() -> u32 {
    8
}

fn default_blur_sigma() -> f32 {
    // Sigma OpenCV derives for a 5x5 kernel
    1.1
}

fn default_contrast_alpha() -> f32 {
    1.5
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            clahe_clip_limit: default_clahe_clip_limit(),
            clahe_grid: default_clahe_grid(),
            blur_sigma: default_blur_sigma(),
            contrast_alpha: default_contrast_alpha(),
            contrast_beta: 0.0,
        }
    }
}

/// Named preprocessing step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariantKind {
    Gray,
    Clahe,
    Otsu,
    Contrast,
}

impl VariantKind {
    /// Processing order, cheapest first
    pub const ORDER: [VariantKind; 4] = [
        VariantKind::Gray,
        VariantKind::Clahe,
        VariantKind::Otsu,
        VariantKind::Contrast,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VariantKind::Gray => "GRAY",
            VariantKind::Clahe => "CLAHE",
            VariantKind::Otsu => "OTSU",
            VariantKind::Contrast => "CONTRAST",
        }
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One preprocessed rendition of the input frame
#[derive(Debug, Clone)]
pub struct ImageVariant {
    pub kind: VariantKind,
    pub image: GrayImage,
}

/// Lazily produces the variants of one frame.
///
/// Only the grayscale base is kept for the whole run; every derived variant
/// is built when requested and owned by the caller, so it is released as soon
/// as the caller drops it.
pub struct VariantPipeline {
    gray: GrayImage,
    config: PipelineConfig,
    next: usize,
}

impl VariantPipeline {
    pub fn new(image: &DynamicImage, config: &PipelineConfig) -> Self {
        Self::from_gray(grayscale(image), config)
    }

    pub fn from_gray(gray: GrayImage, config: &PipelineConfig) -> Self {
        Self {
            gray,
            config: config.clone(),
            next: 0,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.gray.dimensions()
    }

    fn build(&self, kind: VariantKind) -> GrayImage {
        match kind {
            VariantKind::Gray => self.gray.clone(),
            VariantKind::Clahe => clahe(
                &self.gray,
                self.config.clahe_clip_limit,
                self.config.clahe_grid,
            ),
            VariantKind::Otsu => otsu_binarize(&self.gray, self.config.blur_sigma),
            VariantKind::Contrast => linear_stretch(
                &self.gray,
                self.config.contrast_alpha,
                self.config.contrast_beta,
            ),
        }
    }
}

impl Iterator for VariantPipeline {
    type Item = ImageVariant;

    fn next(&mut self) -> Option<Self::Item> {
        let kind = *VariantKind::ORDER.get(self.next)?;
        self.next += 1;
        Some(ImageVariant {
            kind,
            image: self.build(kind),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = VariantKind::ORDER.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for VariantPipeline {}

/// All variants of `image`, in processing order.
pub fn generate_variants(image: &DynamicImage, config: &PipelineConfig) -> Vec<ImageVariant> {
    VariantPipeline::new(image, config).collect()
}

pub fn grayscale(image: &DynamicImage) -> GrayImage {
    image.to_luma8()
}

/// Blur, then binarize at the Otsu level: above the level is white.
pub fn otsu_binarize(gray: &GrayImage, sigma: f32) -> GrayImage {
    // gaussian_blur_f32 rejects non-positive sigma
    let blurred = if sigma > 0.0 {
        gaussian_blur_f32(gray, sigma)
    } else {
        gray.clone()
    };
    let level = otsu_level(&blurred);

    let mut out = blurred;
    for pixel in out.pixels_mut() {
        pixel[0] = if pixel[0] > level { 255 } else { 0 };
    }
    out
}

/// `|alpha * v + beta|`, rounded and saturated to 8 bits.
pub fn linear_stretch(gray: &GrayImage, alpha: f32, beta: f32) -> GrayImage {
    let mut out = gray.clone();
    for pixel in out.pixels_mut() {
        let value = (alpha * pixel[0] as f32 + beta).abs().round();
        *pixel = Luma([value.min(255.0) as u8]);
    }
    out
}
