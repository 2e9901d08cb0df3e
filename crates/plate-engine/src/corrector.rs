//! Mask correction: coerce a raw reading into a grammar's shape.

use crate::confusion::{ConfusionMap, STANDARD_CONFUSIONS};
use crate::grammar::{CharClass, PlateGrammar};
use thiserror::Error;

/// Penalty reported for a reading that cannot be coerced at all
pub const IMPOSSIBLE_PENALTY: u32 = 999;

/// A reading forced into a grammar's mask
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correction {
    pub text: String,
    /// Number of substituted characters (0 = already well-formed)
    pub penalty: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MaskMismatch {
    #[error("expected {expected} characters, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("character '{found}' at position {position} cannot stand in for a {expected:?}")]
    Uncorrectable {
        position: usize,
        found: char,
        expected: CharClass,
    },
}

impl MaskMismatch {
    pub fn penalty(&self) -> u32 {
        IMPOSSIBLE_PENALTY
    }
}

/// Correct `raw` against `grammar` using the standard confusion tables.
pub fn correct(raw: &str, grammar: &PlateGrammar) -> Result<Correction, MaskMismatch> {
    correct_with(raw, grammar, &STANDARD_CONFUSIONS)
}

/// Correct `raw` against `grammar` using `confusions`.
///
/// Every position that already has the expected class is kept. Any other
/// position is replaced through the confusion table and costs one penalty
/// point. A position with no table entry fails the whole correction.
pub fn correct_with(
    raw: &str,
    grammar: &PlateGrammar,
    confusions: &ConfusionMap,
) -> Result<Correction, MaskMismatch> {
    let actual = raw.chars().count();
    if actual != grammar.len() {
        return Err(MaskMismatch::Length {
            expected: grammar.len(),
            actual,
        });
    }

    let mut text = String::with_capacity(raw.len());
    let mut penalty = 0;

    for (position, (ch, &expected)) in raw.chars().zip(grammar.mask()).enumerate() {
        if expected.accepts(ch) {
            text.push(ch);
            continue;
        }

        match confusions.substitute(ch, expected) {
            Some(replacement) => {
                text.push(replacement);
                penalty += 1;
            }
            None => {
                return Err(MaskMismatch::Uncorrectable {
                    position,
                    found: ch,
                    expected,
                })
            }
        }
    }

    Ok(Correction { text, penalty })
}
