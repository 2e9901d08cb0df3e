use thiserror::Error;

/// Why a recognition call produced no plate.
///
/// These never leave the engine through `detect_plate`: they are logged,
/// counted and collapsed into "no plate detected".
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("decoded image is empty")]
    EmptyImage,

    #[error("OCR engine unavailable")]
    EngineUnavailable,

    #[error("OCR reader failed: {0}")]
    Ocr(String),

    #[error("recognition timed out after {0} ms")]
    Timeout(u64),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RecognitionError {
    /// Outcome label for the `plate_recognitions_total` metric
    pub fn outcome_label(&self) -> &'static str {
        match self {
            RecognitionError::Decode(_) | RecognitionError::EmptyImage => "decode_error",
            RecognitionError::EngineUnavailable => "engine_unavailable",
            RecognitionError::Ocr(_) => "ocr_error",
            RecognitionError::Timeout(_) => "timeout",
            RecognitionError::Internal(_) => "internal",
        }
    }
}
