//! Candidate evaluation: from one raw OCR fragment to its best plate reading.
//!
//! A fragment is normalized to uppercase alphanumerics, split into candidate
//! substrings (the whole string plus sliding windows sized to every known
//! plate length) and each substring is corrected against every grammar of
//! matching length. The highest score wins; ties go to the first candidate
//! found, substrings in generation order and grammars in declaration order.

use crate::confusion::{ConfusionMap, STANDARD_CONFUSIONS};
use crate::corrector::correct_with;
use crate::grammar::GrammarSet;
use crate::pipeline::VariantKind;
use common::plates::{normalize_plate_text, PlateReading};
use serde::Serialize;

/// Score of a reading that needed no substitution
pub const BASE_SCORE: i32 = 100;

/// Points lost per substituted character
pub const PENALTY_WEIGHT: i32 = 10;

/// Points gained when the strict pattern confirms the corrected reading
pub const PATTERN_BONUS: i32 = 5;

/// `100 - 10 * penalty`, plus the pattern bonus. Not capped: an exact
/// confirmed reading scores 105.
pub fn score(penalty: u32, strict_match: bool) -> i32 {
    let penalty = i32::try_from(penalty).unwrap_or(i32::MAX);
    let bonus = if strict_match { PATTERN_BONUS } else { 0 };
    BASE_SCORE
        .saturating_sub(PENALTY_WEIGHT.saturating_mul(penalty))
        .saturating_add(bonus)
}

/// A provisional plate reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    /// Corrected plate text, always as long as its grammar
    pub plate: String,
    pub score: i32,
    /// Id of the grammar the reading was corrected against
    pub grammar: String,
    pub penalty: u32,
    /// Raw OCR fragment the reading came from
    pub fragment: String,
    /// Image variant the fragment was read from, once known
    pub variant: Option<VariantKind>,
}

impl Candidate {
    /// A reading that needed no substitution at all
    pub fn is_perfect(&self) -> bool {
        self.penalty == 0
    }

    pub fn with_variant(mut self, variant: VariantKind) -> Self {
        self.variant = Some(variant);
        self
    }

    pub fn into_reading(self) -> PlateReading {
        PlateReading {
            plate: self.plate,
            grammar: self.grammar,
            score: self.score,
            penalty: self.penalty,
            variant: self
                .variant
                .map(|v| v.as_str().to_string())
                .unwrap_or_default(),
            fragment: self.fragment,
        }
    }
}

/// Evaluates raw OCR fragments against a fixed grammar set
#[derive(Debug, Clone)]
pub struct CandidateEvaluator {
    grammars: GrammarSet,
    confusions: ConfusionMap,
}

impl CandidateEvaluator {
    pub fn new(grammars: GrammarSet) -> Self {
        Self::with_confusions(grammars, STANDARD_CONFUSIONS)
    }

    pub fn with_confusions(grammars: GrammarSet, confusions: ConfusionMap) -> Self {
        Self {
            grammars,
            confusions,
        }
    }

    pub fn grammars(&self) -> &GrammarSet {
        &self.grammars
    }

    /// Candidate substrings of an already normalized string, in evaluation
    /// order. Windows are only cut when the string is longer than the
    /// shortest grammar, and only for lengths shorter than the string.
    pub fn substrings<'a>(&self, cleaned: &'a str) -> Vec<&'a str> {
        let mut subs = vec![cleaned];
        // Normalized text is ASCII, so byte offsets are char offsets.
        let len = cleaned.len();
        if len <= self.grammars.shortest_len() {
            return subs;
        }

        for width in self.grammars.distinct_lengths() {
            if len > width {
                subs.extend((0..=len - width).map(|start| &cleaned[start..start + width]));
            }
        }
        subs
    }

    /// Best candidate hidden in `raw_text`, if any substring fits a grammar.
    pub fn evaluate(&self, raw_text: &str) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;
        for candidate in self.evaluate_all(raw_text) {
            if best.as_ref().map_or(true, |b| candidate.score > b.score) {
                best = Some(candidate);
            }
        }
        best
    }

    /// Every successful (substring, grammar) correction, in evaluation order.
    pub fn evaluate_all(&self, raw_text: &str) -> Vec<Candidate> {
        let cleaned = normalize_plate_text(raw_text);
        if cleaned.is_empty() {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for sub in self.substrings(&cleaned) {
            for grammar in self.grammars.iter().filter(|g| g.len() == sub.len()) {
                let Ok(correction) = correct_with(sub, grammar, &self.confusions) else {
                    continue;
                };

                let strict = grammar.is_strict_match(&correction.text);
                candidates.push(Candidate {
                    score: score(correction.penalty, strict),
                    plate: correction.text,
                    grammar: grammar.id().to_string(),
                    penalty: correction.penalty,
                    fragment: raw_text.to_string(),
                    variant: None,
                });
            }
        }
        candidates
    }
}
