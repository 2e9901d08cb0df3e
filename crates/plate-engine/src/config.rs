use crate::grammar::{standard_grammar_specs, GrammarSet, GrammarSpec};
use crate::pipeline::PipelineConfig;
use crate::reader::{ExecutionProviderKind, OnnxReaderConfig};
use anyhow::{anyhow, bail, Context, Result};
use common::validation::validate_range;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// How many image variants a recognition call runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionPolicy {
    /// Always run every variant and keep the best candidate overall
    #[default]
    Exhaustive,
    /// Stop as soon as a variant yields a perfect candidate
    EarlyExit,
}

impl RecognitionPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "exhaustive" => Some(Self::Exhaustive),
            "early_exit" | "earlyexit" | "fast" => Some(Self::EarlyExit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exhaustive => "exhaustive",
            Self::EarlyExit => "early_exit",
        }
    }
}

impl fmt::Display for RecognitionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recognition engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub policy: RecognitionPolicy,

    /// OCR fragments shorter than this (in characters) are ignored
    #[serde(default = "default_min_fragment_len")]
    pub min_fragment_len: usize,

    /// Characters the OCR reader may emit
    #[serde(default = "default_allowed_chars")]
    pub allowed_chars: String,

    /// Fragments containing any of these words are plate-frame noise
    #[serde(default = "default_blacklist")]
    pub blacklist: Vec<String>,

    /// Known plate shapes, in tie-break order
    #[serde(default = "standard_grammar_specs")]
    pub grammars: Vec<GrammarSpec>,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub reader: OnnxReaderConfig,

    /// Per-call deadline enforced by the async service
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_min_fragment_len() -> usize {
    5
}

fn default_allowed_chars() -> String {
    "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-".to_string()
}

fn default_blacklist() -> Vec<String> {
    [
        "COLOMBIA",
        "BOGOTA",
        "MEDELLIN",
        "ANTIGUO",
        "AUTO",
        "MOVIL",
        "TRANSITO",
        "SERVICIO",
        "PARTICULAR",
        "ENVIGADO",
        "SABANETA",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy: RecognitionPolicy::default(),
            min_fragment_len: default_min_fragment_len(),
            allowed_chars: default_allowed_chars(),
            blacklist: default_blacklist(),
            grammars: standard_grammar_specs(),
            pipeline: PipelineConfig::default(),
            reader: OnnxReaderConfig::default(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl EngineConfig {
    /// Defaults, then the JSON file named by `PLATE_ENGINE_CONFIG` if set,
    /// then individual `PLATE_*` overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = match env::var("PLATE_ENGINE_CONFIG") {
            Ok(path) => Self::from_json_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid engine config {}", path.display()))
    }

    /// Apply `PLATE_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(policy) = lookup("PLATE_POLICY") {
            self.policy = RecognitionPolicy::parse(&policy)
                .ok_or_else(|| anyhow!("Invalid PLATE_POLICY '{}'", policy))?;
        }
        if let Some(path) = lookup("PLATE_OCR_MODEL") {
            self.reader.recognition_model_path = path;
        }
        if let Some(path) = lookup("PLATE_DETECTION_MODEL") {
            self.reader.detection_model_path = Some(path).filter(|p| !p.trim().is_empty());
        }
        if let Some(provider) = lookup("PLATE_EXECUTION_PROVIDER") {
            self.reader.execution_provider = ExecutionProviderKind::parse(&provider)
                .ok_or_else(|| anyhow!("Invalid PLATE_EXECUTION_PROVIDER '{}'", provider))?;
        }
        if let Some(device_id) = lookup("PLATE_DEVICE_ID") {
            self.reader.device_id = device_id.parse().context("Invalid PLATE_DEVICE_ID")?;
        }
        if let Some(timeout) = lookup("PLATE_TIMEOUT_MS") {
            self.timeout_ms = timeout.parse().context("Invalid PLATE_TIMEOUT_MS")?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.allowed_chars.is_empty() {
            bail!("allowed_chars cannot be empty");
        }
        validate_range(self.min_fragment_len, 1, 64, "min_fragment_len")?;
        validate_range(self.timeout_ms, 1, 600_000, "timeout_ms")?;
        validate_range(self.pipeline.clahe_grid, 1, 64, "pipeline.clahe_grid")?;
        validate_range(self.pipeline.blur_sigma, 0.0, 10.0, "pipeline.blur_sigma")?;
        // The contrast variant only adds anything when it stretches
        if self.pipeline.contrast_alpha <= 1.0 || self.pipeline.contrast_alpha > 10.0 {
            bail!(
                "pipeline.contrast_alpha must be in (1, 10], got {}",
                self.pipeline.contrast_alpha
            );
        }
        validate_range(
            self.reader.confidence_threshold,
            0.0,
            1.0,
            "reader.confidence_threshold",
        )?;
        validate_range(self.reader.iou_threshold, 0.0, 1.0, "reader.iou_threshold")?;
        // A blank word is a substring of every fragment
        if let Some(index) = self.blacklist.iter().position(|w| w.trim().is_empty()) {
            bail!("blacklist entry {} is blank", index);
        }
        self.grammar_set()?;
        Ok(())
    }

    /// Compile the configured grammars
    pub fn grammar_set(&self) -> Result<GrammarSet> {
        GrammarSet::from_specs(&self.grammars)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
