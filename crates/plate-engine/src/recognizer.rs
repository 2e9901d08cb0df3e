//! Recognition orchestrator.
//!
//! Decodes a frame, runs the OCR reader over each preprocessing variant,
//! turns the accepted fragments into candidates and returns the best one.
//! Recognition is advisory: every failure ends as "no plate detected".

use crate::config::{EngineConfig, RecognitionPolicy};
use crate::error::RecognitionError;
use crate::evaluator::{Candidate, CandidateEvaluator};
use crate::pipeline::{VariantKind, VariantPipeline};
use crate::reader::{OcrReader, OnnxPlateReader};
use anyhow::Result;
use common::plates::ImageInput;
use image::DynamicImage;
use serde::Serialize;
use std::time::{Duration, Instant};
use telemetry::metrics::{
    PLATE_CANDIDATES, PLATE_EARLY_EXITS, PLATE_RECOGNITIONS, PLATE_RECOGNITION_LATENCY,
    PLATE_VARIANTS_PROCESSED,
};

/// Everything one recognition call found
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecognitionReport {
    /// Per-fragment winners, in the order they were found
    pub candidates: Vec<Candidate>,
    /// Variants the reader actually ran on
    pub variants_run: Vec<VariantKind>,
    /// Whether remaining variants were skipped after a perfect candidate
    pub early_exit: bool,
}

impl RecognitionReport {
    /// Highest score; the first one found wins ties.
    pub fn best(&self) -> Option<&Candidate> {
        let mut best: Option<&Candidate> = None;
        for candidate in &self.candidates {
            if best.map_or(true, |b| candidate.score > b.score) {
                best = Some(candidate);
            }
        }
        best
    }

    pub fn into_best(self) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;
        for candidate in self.candidates {
            if best.as_ref().map_or(true, |b| candidate.score > b.score) {
                best = Some(candidate);
            }
        }
        best
    }
}

/// Count one finished recognition call and log what it found.
///
/// Exactly one outcome is recorded per call, whichever layer finished it.
pub fn record_outcome(result: &Result<RecognitionReport, RecognitionError>, elapsed: Duration) {
    PLATE_RECOGNITION_LATENCY.observe(elapsed.as_secs_f64());

    let outcome = match result {
        Ok(report) if report.candidates.is_empty() => "not_detected",
        Ok(_) => "detected",
        Err(e) => e.outcome_label(),
    };
    PLATE_RECOGNITIONS.with_label_values(&[outcome]).inc();

    if let Ok(report) = result {
        match report.best() {
            Some(best) => tracing::info!(
                plate = %best.plate,
                grammar = %best.grammar,
                score = best.score,
                variant = ?best.variant,
                candidates = report.candidates.len(),
                "Plate detected"
            ),
            None => tracing::info!(
                variants = report.variants_run.len(),
                "No valid plate found"
            ),
        }
    }
}

pub struct PlateRecognizer {
    config: EngineConfig,
    evaluator: CandidateEvaluator,
    blacklist: Vec<String>,
    reader: Option<Box<dyn OcrReader>>,
}

impl PlateRecognizer {
    /// Build a recognizer around an already initialized reader.
    pub fn new(config: EngineConfig, reader: Box<dyn OcrReader>) -> Result<Self> {
        Self::build(config, Some(reader))
    }

    /// A recognizer whose OCR engine failed to start: every call reports
    /// "no plate detected".
    pub fn unavailable(config: EngineConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Load the ONNX reader described by `config`. A reader that fails to
    /// load leaves the recognizer running in degraded mode; only invalid
    /// grammar or range settings are errors.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        match OnnxPlateReader::new(config.reader.clone()) {
            Ok(reader) => Self::new(config, Box::new(reader)),
            Err(e) => {
                tracing::error!(
                    error = %format!("{:#}", e),
                    "OCR engine failed to initialize, plate recognition disabled"
                );
                Self::unavailable(config)
            }
        }
    }

    fn build(config: EngineConfig, reader: Option<Box<dyn OcrReader>>) -> Result<Self> {
        config.validate()?;
        let evaluator = CandidateEvaluator::new(config.grammar_set()?);
        let blacklist = config.blacklist.iter().map(|w| w.to_uppercase()).collect();

        if let Some(reader) = reader.as_ref() {
            tracing::info!(
                reader = reader.name(),
                execution_provider = reader.execution_provider(),
                policy = %config.policy,
                grammars = evaluator.grammars().len(),
                "Plate recognizer ready"
            );
        }

        Ok(Self {
            config,
            evaluator,
            blacklist,
            reader,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn policy(&self) -> RecognitionPolicy {
        self.config.policy
    }

    pub fn evaluator(&self) -> &CandidateEvaluator {
        &self.evaluator
    }

    pub fn is_available(&self) -> bool {
        self.reader.is_some()
    }

    /// Plate string of the best candidate, or `None` for "not detected".
    pub fn detect_plate(&mut self, input: &ImageInput) -> Option<String> {
        self.recognize(input).map(|c| c.plate)
    }

    /// Best candidate, or `None` for "not detected".
    pub fn recognize(&mut self, input: &ImageInput) -> Option<Candidate> {
        match self.recognize_detailed(input) {
            Ok(report) => report.into_best(),
            Err(RecognitionError::EngineUnavailable) => {
                tracing::debug!("Recognition skipped, OCR engine unavailable");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Plate recognition failed");
                None
            }
        }
    }

    /// Run a full recognition and report every candidate collected.
    pub fn recognize_detailed(
        &mut self,
        input: &ImageInput,
    ) -> Result<RecognitionReport, RecognitionError> {
        let start = Instant::now();
        let result = self.recognize_unmetered(input);
        record_outcome(&result, start.elapsed());
        result
    }

    /// Same as [`recognize_detailed`](Self::recognize_detailed) but leaves
    /// outcome metrics and logging to the caller.
    pub fn recognize_unmetered(
        &mut self,
        input: &ImageInput,
    ) -> Result<RecognitionReport, RecognitionError> {
        if !self.is_available() {
            return Err(RecognitionError::EngineUnavailable);
        }

        // The encoded payload and the decoded frame only live until the
        // grayscale base has been derived.
        let pipeline = {
            let bytes = input
                .encoded_bytes()
                .map_err(|e| RecognitionError::Decode(format!("{:#}", e)))?;
            let image = image::load_from_memory(&bytes)
                .map_err(|e| RecognitionError::Decode(e.to_string()))?;
            if image.width() == 0 || image.height() == 0 {
                return Err(RecognitionError::EmptyImage);
            }
            VariantPipeline::new(&image, &self.config.pipeline)
        };

        self.run_pipeline(pipeline)
    }

    /// Recognize an already decoded frame.
    pub fn recognize_image(
        &mut self,
        image: &DynamicImage,
    ) -> Result<RecognitionReport, RecognitionError> {
        if !self.is_available() {
            return Err(RecognitionError::EngineUnavailable);
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(RecognitionError::EmptyImage);
        }
        let pipeline = VariantPipeline::new(image, &self.config.pipeline);
        self.run_pipeline(pipeline)
    }

    /// Whether an OCR fragment is worth evaluating
    pub fn accepts_fragment(&self, fragment: &str) -> bool {
        let upper = fragment.to_uppercase();
        upper.chars().count() >= self.config.min_fragment_len
            && !self.blacklist.iter().any(|word| upper.contains(word.as_str()))
    }

    fn run_pipeline(
        &mut self,
        pipeline: VariantPipeline,
    ) -> Result<RecognitionReport, RecognitionError> {
        let (width, height) = pipeline.dimensions();
        tracing::debug!(width, height, policy = %self.config.policy, "Analyzing frame");

        let mut report = RecognitionReport::default();

        for variant in pipeline {
            let fragments = {
                let reader = self
                    .reader
                    .as_mut()
                    .ok_or(RecognitionError::EngineUnavailable)?;
                reader
                    .read_text(&variant.image, &self.config.allowed_chars)
                    .map_err(|e| RecognitionError::Ocr(format!("{:#}", e)))?
            };
            let kind = variant.kind;
            // Release the variant buffer before evaluating
            drop(variant);

            PLATE_VARIANTS_PROCESSED.with_label_values(&[kind.as_str()]).inc();
            report.variants_run.push(kind);

            for fragment in &fragments {
                if !self.accepts_fragment(fragment) {
                    tracing::trace!(variant = %kind, fragment = %fragment, "Fragment discarded");
                    continue;
                }
                if let Some(candidate) = self.evaluator.evaluate(&fragment.to_uppercase()) {
                    tracing::debug!(
                        variant = %kind,
                        plate = %candidate.plate,
                        score = candidate.score,
                        "Candidate found"
                    );
                    PLATE_CANDIDATES
                        .with_label_values(&[candidate.grammar.as_str()])
                        .inc();
                    report.candidates.push(candidate.with_variant(kind));
                }
            }

            if self.config.policy == RecognitionPolicy::EarlyExit
                && report.candidates.iter().any(Candidate::is_perfect)
            {
                report.early_exit = true;
                PLATE_EARLY_EXITS.inc();
                tracing::debug!(variant = %kind, "Perfect candidate found, skipping remaining variants");
                break;
            }
        }

        Ok(report)
    }
}
