//! Async front end for the recognizer.
//!
//! The OCR engine is loaded once and shared. Calls are serialized through an
//! async mutex and run on the blocking pool. The configured timeout covers
//! both waiting for the engine and running it, so callers queued behind a
//! hung inference give up without parking a blocking thread. A call that
//! times out or panics is reported as "no plate" and counted once.

use crate::config::EngineConfig;
use crate::error::RecognitionError;
use crate::evaluator::Candidate;
use crate::recognizer::{record_outcome, PlateRecognizer, RecognitionReport};
use anyhow::Result;
use common::plates::ImageInput;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::timeout;

#[derive(Clone)]
pub struct RecognitionService {
    recognizer: Arc<Mutex<PlateRecognizer>>,
    timeout: Duration,
    available: bool,
}

impl RecognitionService {
    pub fn new(recognizer: PlateRecognizer) -> Self {
        Self {
            timeout: recognizer.config().timeout(),
            available: recognizer.is_available(),
            recognizer: Arc::new(Mutex::new(recognizer)),
        }
    }

    /// Load the configured OCR engine, degrading if it cannot start
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        Ok(Self::new(PlateRecognizer::from_config(config)?))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub async fn detect_plate(&self, input: ImageInput) -> Option<String> {
        self.recognize(input).await.map(|c| c.plate)
    }

    pub async fn recognize(&self, input: ImageInput) -> Option<Candidate> {
        match self.recognize_detailed(input).await {
            Ok(report) => report.into_best(),
            Err(RecognitionError::EngineUnavailable) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Plate recognition failed");
                None
            }
        }
    }

    pub async fn recognize_detailed(
        &self,
        input: ImageInput,
    ) -> Result<RecognitionReport, RecognitionError> {
        let start = Instant::now();
        if !self.available {
            let result = Err(RecognitionError::EngineUnavailable);
            record_outcome(&result, start.elapsed());
            return result;
        }

        let recognizer = Arc::clone(&self.recognizer);
        let call = async move {
            let mut guard = recognizer.lock_owned().await;
            // The guard travels with the blocking call and is released when it
            // returns or unwinds, even if this future was dropped on timeout.
            tokio::task::spawn_blocking(move || guard.recognize_unmetered(&input)).await
        };

        let result = match timeout(self.timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                tracing::error!(error = %join_error, "Recognition task failed");
                Err(RecognitionError::Internal(join_error.to_string()))
            }
            Err(_) => {
                let millis = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(timeout_ms = millis, "Plate recognition timed out");
                Err(RecognitionError::Timeout(millis))
            }
        };
        record_outcome(&result, start.elapsed());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecognitionPolicy;
    use crate::reader::{OcrReader, ScriptedReader};
    use image::{DynamicImage, GrayImage, Luma};
    use std::io::Cursor;
    use std::sync::atomic::Ordering;

    /// Panics on its first read, answers normally afterwards
    struct PanicsOnceReader {
        panicked: bool,
    }

    impl OcrReader for PanicsOnceReader {
        fn name(&self) -> &'static str {
            "panics-once"
        }

        fn read_text(&mut self, _image: &GrayImage, _allowed: &str) -> anyhow::Result<Vec<String>> {
            if !self.panicked {
                self.panicked = true;
                panic!("inference crashed");
            }
            Ok(vec!["ABC123".to_string()])
        }
    }

    fn png_input() -> ImageInput {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(32, 16, Luma([128])));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        ImageInput::bytes(bytes)
    }

    fn service(reader: ScriptedReader) -> RecognitionService {
        let recognizer = PlateRecognizer::new(EngineConfig::default(), Box::new(reader)).unwrap();
        RecognitionService::new(recognizer)
    }

    #[tokio::test]
    async fn test_detect_plate() {
        let svc = service(ScriptedReader::new([vec!["XYZ987"]]));
        assert!(svc.is_available());
        assert_eq!(svc.timeout(), Duration::from_secs(10));
        assert_eq!(svc.detect_plate(png_input()).await, Some("XYZ987".to_string()));
    }

    #[tokio::test]
    async fn test_timeout_is_none() {
        let svc = service(
            ScriptedReader::new([vec!["XYZ987"]]).with_delay(Duration::from_millis(300)),
        )
        .with_timeout(Duration::from_millis(20));

        assert!(matches!(
            svc.recognize_detailed(png_input()).await,
            Err(RecognitionError::Timeout(20))
        ));
        assert!(svc.detect_plate(png_input()).await.is_none());
    }

    #[tokio::test]
    async fn test_unavailable_engine() {
        let svc = RecognitionService::new(
            PlateRecognizer::unavailable(EngineConfig::default()).unwrap(),
        );
        assert!(!svc.is_available());
        assert!(svc.detect_plate(png_input()).await.is_none());
    }

    #[tokio::test]
    async fn test_shared_across_tasks() {
        let svc = service(ScriptedReader::new([
            vec!["ABC123"],
            vec![],
            vec![],
            vec![],
            vec!["DEF456"],
        ]));

        let first = svc.clone();
        let second = svc.clone();
        let (a, b) = tokio::join!(first.detect_plate(png_input()), second.detect_plate(png_input()));

        // Calls are serialized: one sees the first script entry, the other the fifth.
        let mut plates = vec![a.unwrap(), b.unwrap()];
        plates.sort();
        assert_eq!(plates, vec!["ABC123".to_string(), "DEF456".to_string()]);
    }

    #[tokio::test]
    async fn test_recovers_after_panicking_call() {
        let recognizer = PlateRecognizer::new(
            EngineConfig::default(),
            Box::new(PanicsOnceReader { panicked: false }),
        )
        .unwrap();
        let svc = RecognitionService::new(recognizer);

        assert!(matches!(
            svc.recognize_detailed(png_input()).await,
            Err(RecognitionError::Internal(_))
        ));
        // The engine stays usable once the panicking call has unwound
        assert_eq!(svc.detect_plate(png_input()).await, Some("ABC123".to_string()));
    }

    #[tokio::test]
    async fn test_queued_calls_time_out_without_running() {
        let reader = ScriptedReader::new([vec!["ABC123"], vec!["DEF456"], vec!["GHI789"]])
            .with_delay(Duration::from_millis(300));
        let calls = reader.call_counter();
        let config = EngineConfig {
            policy: RecognitionPolicy::EarlyExit,
            ..Default::default()
        };
        let svc = RecognitionService::new(PlateRecognizer::new(config, Box::new(reader)).unwrap())
            .with_timeout(Duration::from_millis(50));

        let started = Instant::now();
        let (a, b, c) = tokio::join!(
            svc.detect_plate(png_input()),
            svc.detect_plate(png_input()),
            svc.detect_plate(png_input()),
        );
        assert!(a.is_none() && b.is_none() && c.is_none());
        // Waiters give up at the deadline instead of queueing behind the hung call
        assert!(started.elapsed() < Duration::from_millis(250));

        tokio::time::sleep(Duration::from_millis(500)).await;
        // Only the call that held the engine ever reached the reader
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // The engine is free again after the slow call finished
        let svc = svc.with_timeout(Duration::from_secs(5));
        assert_eq!(svc.detect_plate(png_input()).await, Some("DEF456".to_string()));
    }
}
