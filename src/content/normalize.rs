//! Unicode handling for Malayalam text

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Zero width non-joiner, used in Malayalam to break conjuncts
pub const ZWNJ: char = '\u{200C}';

/// Zero width joiner, used in Malayalam to form chillu letters
pub const ZWJ: char = '\u{200D}';

/// Whether `c` lies in the Malayalam block (U+0D00..U+0D7F)
pub fn is_malayalam(c: char) -> bool {
    ('\u{0D00}'..='\u{0D7F}').contains(&c)
}

/// Letters, digits, underscore and combining marks
///
/// Malayalam vowel signs and the virama are combining marks, so a plain
/// alphanumeric test would split words in the middle.
pub fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || is_combining_mark(c) || is_malayalam(c)
}

/// Canonical composition (NFC)
pub fn nfc(text: &str) -> String {
    text.nfc().collect()
}

/// Share of letters that belong to the Malayalam block, in `[0, 1]`
pub fn malayalam_ratio(text: &str) -> f64 {
    let mut letters = 0usize;
    let mut malayalam = 0usize;

    for c in text.chars() {
        if c.is_alphabetic() || is_combining_mark(c) {
            letters += 1;
            if is_malayalam(c) {
                malayalam += 1;
            }
        }
    }

    if letters == 0 {
        0.0
    } else {
        malayalam as f64 / letters as f64
    }
}
