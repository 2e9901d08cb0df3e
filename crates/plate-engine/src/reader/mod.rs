//! OCR reader seam.
//!
//! The recognizer treats text reading as a black box: give it a grayscale
//! image and the characters a plate may contain, get back the raw text
//! fragments found, in detection order. Readers are loaded once and kept
//! resident. They are not assumed to be thread-safe, which is why reading
//! takes `&mut self`: callers either own the reader or serialize access to it.

pub mod onnx;
pub mod scripted;

pub use onnx::{ExecutionProviderKind, OnnxPlateReader, OnnxReaderConfig};
pub use scripted::ScriptedReader;

use anyhow::Result;
use image::GrayImage;

pub trait OcrReader: Send {
    /// Short reader name for logs
    fn name(&self) -> &'static str;

    /// Execution provider actually in use, for metrics labels
    fn execution_provider(&self) -> &str {
        "CPU"
    }

    /// Read every text fragment in `image`, restricted to `allowed` characters.
    fn read_text(&mut self, image: &GrayImage, allowed: &str) -> Result<Vec<String>>;
}

impl<R: OcrReader + ?Sized> OcrReader for Box<R> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn execution_provider(&self) -> &str {
        (**self).execution_provider()
    }

    fn read_text(&mut self, image: &GrayImage, allowed: &str) -> Result<Vec<String>> {
        (**self).read_text(image, allowed)
    }
}
