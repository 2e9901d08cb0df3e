//! Reader that replays canned fragments.
//!
//! Used for demos and tests where no OCR model is available. Call `n`
//! returns the `n`-th scripted response; calls past the end of the script
//! return nothing.

use super::OcrReader;
use anyhow::{bail, Result};
use image::GrayImage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct ScriptedReader {
    responses: Vec<Vec<String>>,
    fail_on: Option<usize>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedReader {
    pub fn new<I, F, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: responses
                .into_iter()
                .map(|fragments| fragments.into_iter().map(Into::into).collect())
                .collect(),
            ..Self::default()
        }
    }

    /// Reader that finds nothing, ever
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fail the `index`-th call (0-based) with an error
    pub fn failing_on(mut self, index: usize) -> Self {
        self.fail_on = Some(index);
        self
    }

    /// Sleep before answering, to simulate slow inference
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared call counter, still readable after the reader is boxed
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl OcrReader for ScriptedReader {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn read_text(&mut self, _image: &GrayImage, _allowed: &str) -> Result<Vec<String>> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        if self.fail_on == Some(index) {
            bail!("scripted failure on call {}", index);
        }

        Ok(self.responses.get(index).cloned().unwrap_or_default())
    }
}
