//! Card label normalization.
//!
//! Scraped labels look like `"Dusclops 14"`, `"Altaria ex Lv.3 90"` or
//! `"Charizard Full Art Secret Rare"`. The functions here split the trailing
//! collector number off, drop marketing/rarity words and reduce number
//! cells such as `"079/100"` or `"TG10/TG30"` to a single search token.
//! None of them can fail: empty input produces empty output.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const DEFAULT_IGNORE_WORDS: &[&str] = &[
    "full",
    "art",
    "secret",
    "rare",
    "hyper",
    "alternative",
    "alternate",
    "reverse",
    "holo",
    "bs",
];

const DEFAULT_VARIANT_PREFIXES: &[&str] = &["tg", "gg", "rc", "sv", "h", "sl", "sh"];

lazy_static! {
    static ref LEVEL_RE: Regex = Regex::new(r"(?i)^lv\.[0-9]+$").unwrap();
    static ref DIGITS_RE: Regex = Regex::new(r"[0-9]+").unwrap();
    static ref NUMERIC_RE: Regex = Regex::new(r"^[0-9]+$").unwrap();
    static ref DELTA_RE: Regex = Regex::new(r"(?i)\x{03b4}\s*delta\s*species").unwrap();
    static ref DEFAULT_NORMALIZER: Normalizer = Normalizer::new(&NormalizerConfig::default());
}

/// Word tables that drive [`Normalizer`]. These are product tuning, so they
/// are read from the config file rather than baked in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Lower-case words dropped by [`Normalizer::sanitize`].
    pub ignore_words: BTreeSet<String>,
    /// Letter prefixes recognised in front of a collector number (`tg10`, `rc11`).
    pub variant_prefixes: Vec<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        NormalizerConfig {
            ignore_words: DEFAULT_IGNORE_WORDS.iter().map(|w| w.to_string()).collect(),
            variant_prefixes: DEFAULT_VARIANT_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

/// A label split into its name part and its first number-like token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NameNumber {
    pub name: String,
    /// Uppercased, e.g. `"14"`, `"TG10"`, `"079/100"`.
    pub num: String,
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    ignore_words: BTreeSet<String>,
    prefix_re: Option<Regex>,
}

impl Normalizer {
    pub fn new(config: &NormalizerConfig) -> Self {
        let ignore_words = config
            .ignore_words
            .iter()
            .map(|w| w.to_lowercase())
            .collect();

        let prefixes: Vec<String> = config
            .variant_prefixes
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| regex::escape(p))
            .collect();
        let prefix_re = if prefixes.is_empty() {
            None
        } else {
            let pattern = format!(r"(?i)^(?:{})[0-9]+", prefixes.join("|"));
            match Regex::new(&pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    log::warn!("Ignoring variant prefixes, pattern did not compile: {}", e);
                    None
                }
            }
        };

        Normalizer {
            ignore_words,
            prefix_re,
        }
    }

    /// Drop ignore-words (case-insensitive) and collapse whitespace.
    pub fn sanitize(&self, text: &str) -> String {
        text.split_whitespace()
            .filter(|w| !self.ignore_words.contains(&w.to_lowercase()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Reduce a number cell to a search token.
    ///
    /// Only the part before `/` counts. A recognised variant prefix followed
    /// by digits wins (returned lower-case), otherwise the first digit run.
    pub fn first_num(&self, token: &str) -> String {
        let first = token.split('/').next().unwrap_or("").to_uppercase();
        if first.is_empty() {
            return String::new();
        }
        if let Some(m) = self.prefix_re.as_ref().and_then(|re| re.find(&first)) {
            return m.as_str().to_lowercase();
        }
        DIGITS_RE
            .find(&first)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Normalizer::new(&NormalizerConfig::default())
    }
}

/// Split a label into name and trailing number token.
///
/// Scanning stops at the first word containing a digit, except level
/// markers like `Lv.3`, which stay part of the name.
pub fn split_name_num(text: &str) -> NameNumber {
    let mut name = Vec::new();
    let mut num = String::new();

    for word in text.split_whitespace() {
        if word.chars().any(|c| c.is_ascii_digit()) {
            if LEVEL_RE.is_match(word) {
                name.push(word);
                continue;
            }
            num = word.to_uppercase();
            break;
        }
        name.push(word);
    }

    NameNumber {
        name: name.join(" "),
        num,
    }
}

/// [`Normalizer::sanitize`] with the default word table.
pub fn sanitize(text: &str) -> String {
    DEFAULT_NORMALIZER.sanitize(text)
}

/// [`Normalizer::first_num`] with the default prefix table.
pub fn first_num(token: &str) -> String {
    DEFAULT_NORMALIZER.first_num(token)
}

/// True for a non-empty run of ASCII digits.
pub fn is_numeric(token: &str) -> bool {
    NUMERIC_RE.is_match(token)
}

/// Left-pad a purely numeric token to three digits; other tokens pass through.
pub fn pad_number(token: &str) -> String {
    if is_numeric(token) {
        format!("{:0>3}", token)
    } else {
        token.to_string()
    }
}

/// TCGplayer indexes the "δ Delta Species" sets under plain "delta".
pub fn fix_delta(query: &str) -> String {
    DELTA_RE.replace_all(query, "delta").into_owned()
}
