//! License plate recognition engine.
//!
//! Turns a captured frame into a validated plate string: the frame is
//! preprocessed into several variants, an OCR reader extracts raw text from
//! each, and every fragment is corrected against the known plate grammars
//! and scored. The best candidate wins.

pub mod config;
pub mod confusion;
pub mod corrector;
pub mod error;
pub mod evaluator;
pub mod grammar;
pub mod pipeline;
pub mod reader;
pub mod recognizer;
pub mod service;

pub use config::{EngineConfig, RecognitionPolicy};
pub use confusion::{ConfusionMap, STANDARD_CONFUSIONS};
pub use corrector::{correct, correct_with, Correction, MaskMismatch};
pub use error::RecognitionError;
pub use evaluator::{Candidate, CandidateEvaluator};
pub use grammar::{CharClass, GrammarSet, GrammarSpec, PlateGrammar};
pub use pipeline::{generate_variants, ImageVariant, PipelineConfig, VariantKind, VariantPipeline};
pub use reader::{OcrReader, OnnxPlateReader, OnnxReaderConfig, ScriptedReader};
pub use recognizer::{PlateRecognizer, RecognitionReport};
pub use service::RecognitionService;
