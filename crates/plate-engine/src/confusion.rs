//! Character confusion tables.
//!
//! OCR engines routinely read a letter where the plate has a digit and vice
//! versa (`O`/`0`, `B`/`8`, `S`/`5`, ...). These tables map a misread
//! character to the character of the opposite class it most likely was.
//! They are deliberately partial: a character with no entry cannot be
//! coerced and the correction attempt fails.

use crate::grammar::CharClass;

/// Letter read where a digit was expected
const LETTER_TO_DIGIT: &[(char, char)] = &[
    ('O', '0'),
    ('Q', '0'),
    ('D', '0'),
    ('U', '0'),
    ('C', '0'),
    ('I', '1'),
    ('J', '1'),
    ('L', '1'),
    ('Z', '2'),
    ('E', '3'),
    ('A', '4'),
    ('S', '5'),
    ('G', '6'),
    ('T', '7'),
    ('Y', '7'),
    ('B', '8'),
    ('R', '8'),
    ('P', '9'),
];

/// Digit read where a letter was expected
const DIGIT_TO_LETTER: &[(char, char)] = &[
    ('0', 'O'),
    ('1', 'I'),
    ('2', 'Z'),
    ('3', 'E'),
    ('4', 'A'),
    ('5', 'S'),
    ('6', 'G'),
    ('7', 'T'),
    ('8', 'B'),
];

/// A pair of static letter/digit confusion mappings
#[derive(Debug, Clone, Copy)]
pub struct ConfusionMap {
    letter_to_digit: &'static [(char, char)],
    digit_to_letter: &'static [(char, char)],
}

/// Confusions observed on Colombian and Venezuelan plates
pub const STANDARD_CONFUSIONS: ConfusionMap = ConfusionMap {
    letter_to_digit: LETTER_TO_DIGIT,
    digit_to_letter: DIGIT_TO_LETTER,
};

impl ConfusionMap {
    pub const fn new(
        letter_to_digit: &'static [(char, char)],
        digit_to_letter: &'static [(char, char)],
    ) -> Self {
        Self {
            letter_to_digit,
            digit_to_letter,
        }
    }

    /// Digit most likely misread as `letter`
    pub fn digit_for(&self, letter: char) -> Option<char> {
        lookup(self.letter_to_digit, letter)
    }

    /// Letter most likely misread as `digit`
    pub fn letter_for(&self, digit: char) -> Option<char> {
        lookup(self.digit_to_letter, digit)
    }

    /// Coerce `ch` into the `expected` class, if the tables know how.
    pub fn substitute(&self, ch: char, expected: CharClass) -> Option<char> {
        match expected {
            CharClass::Digit => self.digit_for(ch),
            CharClass::Letter => self.letter_for(ch),
        }
    }
}

impl Default for ConfusionMap {
    fn default() -> Self {
        STANDARD_CONFUSIONS
    }
}

fn lookup(table: &[(char, char)], key: char) -> Option<char> {
    table
        .iter()
        .find_map(|&(from, to)| (from == key).then_some(to))
}
