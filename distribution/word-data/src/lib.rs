//! Bundled word lists for synthetic identity generation.
//!
//! Adjectives become first names and nouns become last names, e.g. "Hazy Heron".
//! Each file holds one word per line.

use once_cell::sync::Lazy;

/// Raw contents of `data/adjectives.txt`
pub const ADJECTIVES_TXT: &str = include_str!("../data/adjectives.txt");

/// Raw contents of `data/nouns.txt`
pub const NOUNS_TXT: &str = include_str!("../data/nouns.txt");

pub static ADJECTIVES: Lazy<Vec<&'static str>> = Lazy::new(|| split_words(ADJECTIVES_TXT));

pub static NOUNS: Lazy<Vec<&'static str>> = Lazy::new(|| split_words(NOUNS_TXT));

/// Look up a bundled list by category name.
pub fn by_name(name: &str) -> Option<&'static [&'static str]> {
    match name {
        "adjectives" => Some(ADJECTIVES.as_slice()),
        "nouns" => Some(NOUNS.as_slice()),
        _ => None,
    }
}

fn split_words(raw: &'static str) -> Vec<&'static str> {
    raw.lines().map(str::trim).filter(|w| !w.is_empty()).collect()
}
