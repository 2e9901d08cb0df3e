//! Known plate shapes.
//!
//! A grammar is a fixed-length position mask (letter or digit per slot) plus
//! a strict pattern that confirms a corrected reading. The set of grammars is
//! built once when the recognizer starts and never changes afterwards.

use anyhow::{anyhow, bail, Context, Result};
use common::validation::{validate_id, validate_regex_pattern};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Expected character class of one plate position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharClass {
    Letter,
    Digit,
}

impl CharClass {
    /// Mask notation: `L` for letter, `N` for digit
    pub fn from_mask_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'L' => Some(CharClass::Letter),
            'N' => Some(CharClass::Digit),
            _ => None,
        }
    }

    pub fn mask_char(&self) -> char {
        match self {
            CharClass::Letter => 'L',
            CharClass::Digit => 'N',
        }
    }

    pub fn accepts(&self, c: char) -> bool {
        match self {
            CharClass::Letter => c.is_ascii_alphabetic(),
            CharClass::Digit => c.is_ascii_digit(),
        }
    }

    fn sample(&self) -> char {
        match self {
            CharClass::Letter => 'A',
            CharClass::Digit => '0',
        }
    }
}

/// Declarative grammar definition, as found in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarSpec {
    /// Grammar identifier (e.g. "COL_CARRO")
    pub id: String,

    /// Position mask, `L` = letter, `N` = digit (e.g. "LLLNNN")
    pub mask: String,

    /// Strict confirming pattern (e.g. `^[A-Z]{3}[0-9]{3}$`)
    pub pattern: String,
}

impl GrammarSpec {
    pub fn new(id: &str, mask: &str, pattern: &str) -> Self {
        Self {
            id: id.to_string(),
            mask: mask.to_string(),
            pattern: pattern.to_string(),
        }
    }
}

/// Colombian car, Colombian motorcycle and Venezuelan car plates
pub fn standard_grammar_specs() -> Vec<GrammarSpec> {
    vec![
        GrammarSpec::new("COL_CARRO", "LLLNNN", r"^[A-Z]{3}[0-9]{3}$"),
        GrammarSpec::new("COL_MOTO", "LLLNNL", r"^[A-Z]{3}[0-9]{2}[A-Z]$"),
        GrammarSpec::new("VEN_AUTO", "LLNNNLL", r"^[A-Z]{2}[0-9]{3}[A-Z]{2}$"),
    ]
}

/// A compiled plate grammar
#[derive(Debug, Clone)]
pub struct PlateGrammar {
    id: String,
    mask: Vec<CharClass>,
    pattern: Regex,
}

impl PlateGrammar {
    pub fn new(id: &str, mask: &str, pattern: &str) -> Result<Self> {
        validate_id(id, "grammar id")?;

        let mask = mask
            .chars()
            .map(|c| {
                CharClass::from_mask_char(c)
                    .ok_or_else(|| anyhow!("Grammar '{}' has invalid mask character '{}'", id, c))
            })
            .collect::<Result<Vec<_>>>()?;
        if mask.is_empty() {
            bail!("Grammar '{}' has an empty mask", id);
        }

        let pattern = validate_regex_pattern(pattern)
            .with_context(|| format!("Grammar '{}' has an invalid pattern", id))?;

        let grammar = Self {
            id: id.to_string(),
            mask,
            pattern,
        };

        // The pattern must accept the shape the mask describes.
        let sample = grammar.sample();
        if !grammar.is_strict_match(&sample) {
            bail!(
                "Grammar '{}' pattern does not accept its own mask shape ({})",
                id,
                sample
            );
        }

        Ok(grammar)
    }

    pub fn from_spec(spec: &GrammarSpec) -> Result<Self> {
        Self::new(&spec.id, &spec.mask, &spec.pattern)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of characters on the plate
    pub fn len(&self) -> usize {
        self.mask.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    pub fn mask(&self) -> &[CharClass] {
        &self.mask
    }

    /// Mask in `L`/`N` notation
    pub fn mask_string(&self) -> String {
        self.mask.iter().map(CharClass::mask_char).collect()
    }

    /// Whether every position of `text` already has the expected class
    pub fn fits_mask(&self, text: &str) -> bool {
        text.chars().count() == self.mask.len()
            && text.chars().zip(&self.mask).all(|(c, class)| class.accepts(c))
    }

    /// Whether `text` satisfies the strict confirming pattern
    pub fn is_strict_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    fn sample(&self) -> String {
        self.mask.iter().map(CharClass::sample).collect()
    }
}

impl fmt::Display for PlateGrammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.mask_string())
    }
}

/// Ordered, immutable set of grammars
///
/// Declaration order is significant: it is the tie-break order when two
/// grammars score the same reading equally.
#[derive(Debug, Clone)]
pub struct GrammarSet {
    grammars: Arc<[PlateGrammar]>,
}

impl GrammarSet {
    pub fn new(grammars: Vec<PlateGrammar>) -> Result<Self> {
        if grammars.is_empty() {
            bail!("At least one plate grammar must be configured");
        }

        let mut ids = HashSet::new();
        for grammar in &grammars {
            if !ids.insert(grammar.id()) {
                bail!("Duplicate plate grammar id '{}'", grammar.id());
            }
        }

        Ok(Self {
            grammars: grammars.into(),
        })
    }

    pub fn from_specs(specs: &[GrammarSpec]) -> Result<Self> {
        let grammars = specs
            .iter()
            .map(PlateGrammar::from_spec)
            .collect::<Result<Vec<_>>>()?;
        Self::new(grammars)
    }

    /// The built-in grammar set
    pub fn standard() -> Result<Self> {
        Self::from_specs(&standard_grammar_specs())
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlateGrammar> {
        self.grammars.iter()
    }

    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&PlateGrammar> {
        self.grammars.iter().find(|g| g.id() == id)
    }

    /// Distinct plate lengths, in the order they are first declared
    pub fn distinct_lengths(&self) -> Vec<usize> {
        let mut lengths = Vec::new();
        for grammar in self.iter() {
            if !lengths.contains(&grammar.len()) {
                lengths.push(grammar.len());
            }
        }
        lengths
    }

    pub fn shortest_len(&self) -> usize {
        self.iter().map(PlateGrammar::len).min().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_grammars() {
        let set = GrammarSet::standard().unwrap();
        assert_eq!(set.len(), 3);

        let ids: Vec<&str> = set.iter().map(PlateGrammar::id).collect();
        assert_eq!(ids, vec!["COL_CARRO", "COL_MOTO", "VEN_AUTO"]);

        let carro = set.get("COL_CARRO").unwrap();
        assert_eq!(carro.len(), 6);
        assert_eq!(carro.mask_string(), "LLLNNN");
        assert_eq!(set.get("VEN_AUTO").unwrap().len(), 7);
    }

    #[test]
    fn test_distinct_lengths_in_declaration_order() {
        let set = GrammarSet::standard().unwrap();
        assert_eq!(set.distinct_lengths(), vec![6, 7]);
        assert_eq!(set.shortest_len(), 6);
    }

    #[test]
    fn test_fits_mask_and_strict_match() {
        let set = GrammarSet::standard().unwrap();
        let moto = set.get("COL_MOTO").unwrap();

        assert!(moto.fits_mask("ABC12D"));
        assert!(moto.is_strict_match("ABC12D"));
        assert!(!moto.fits_mask("ABC123"));
        assert!(!moto.fits_mask("ABC12"));
        assert!(!moto.is_strict_match("abc12d"));
    }

    #[test]
    fn test_invalid_mask_rejected() {
        assert!(PlateGrammar::new("BAD", "LLX", "^.*$").is_err());
        assert!(PlateGrammar::new("EMPTY", "", "^$").is_err());
    }

    #[test]
    fn test_pattern_must_accept_mask_shape() {
        // Mask says three digits, pattern says letters
        let result = PlateGrammar::new("MISMATCH", "LLLNNN", r"^[A-Z]{6}$");
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let specs = vec![
            GrammarSpec::new("X", "LLLNNN", r"^[A-Z]{3}[0-9]{3}$"),
            GrammarSpec::new("X", "LLNNNLL", r"^[A-Z]{2}[0-9]{3}[A-Z]{2}$"),
        ];
        assert!(GrammarSet::from_specs(&specs).is_err());
        assert!(GrammarSet::from_specs(&[]).is_err());
    }

    #[test]
    fn test_lowercase_mask_accepted() {
        let grammar = PlateGrammar::new("LOWER", "llnn", r"^[A-Z]{2}[0-9]{2}$").unwrap();
        assert_eq!(grammar.mask_string(), "LLNN");
    }
}
