use crate::normalize::{Normalizer, split_name_num};
use serde::{Deserialize, Serialize};
use std::fmt;

/// External shops a card can be looked up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Marketplace {
    Cardmarket,
    Tcgplayer,
}

impl Marketplace {
    /// Logical name of the browser tab reused for this marketplace.
    pub fn window_name(&self) -> &'static str {
        match self {
            Marketplace::Cardmarket => "MCMWindow",
            Marketplace::Tcgplayer => "TCGWindow",
        }
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marketplace::Cardmarket => write!(f, "Cardmarket"),
            Marketplace::Tcgplayer => write!(f, "TCGplayer"),
        }
    }
}

/// The catalog's own primary key for a card.
///
/// `"0"` is the source data's "no card" sentinel, so it is rejected along
/// with empty input. Holding a `CatalogId` means a lookup is allowed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CatalogId(String);

impl CatalogId {
    pub fn parse(raw: &str) -> Option<CatalogId> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "0" {
            None
        } else {
            Some(CatalogId(trimmed.to_string()))
        }
    }

    pub fn from_number(raw: u64) -> Option<CatalogId> {
        Self::parse(&raw.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a page script scraped about one card.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardDescriptor {
    /// Label text as shown, possibly with a trailing number (`"Dusclops 14"`).
    pub raw_name: String,
    /// Full expansion name, possibly with parenthetical qualifiers.
    pub set_full: String,
    /// Collector number cell (`"079/100"`, `"tg10"`), if the page has one.
    #[serde(default)]
    pub number: Option<String>,
    /// Internal catalog id, if the page exposes one.
    #[serde(default)]
    pub catalog_id: Option<String>,
}

impl CardDescriptor {
    pub fn new(raw_name: &str, set_full: &str) -> Self {
        CardDescriptor {
            raw_name: raw_name.to_string(),
            set_full: set_full.to_string(),
            number: None,
            catalog_id: None,
        }
    }

    pub fn with_number(mut self, number: &str) -> Self {
        self.number = Some(number.to_string());
        self
    }

    pub fn with_catalog_id(mut self, id: &str) -> Self {
        self.catalog_id = Some(id.to_string());
        self
    }

    /// The catalog id, if it is usable for lookups.
    pub fn valid_catalog_id(&self) -> Option<CatalogId> {
        self.catalog_id.as_deref().and_then(CatalogId::parse)
    }

    /// Name without its trailing number token.
    pub fn name_part(&self) -> String {
        split_name_num(&self.raw_name).name
    }

    /// The explicit number cell, or the token split off the raw name.
    pub fn number_part(&self) -> String {
        match self.number.as_deref() {
            Some(n) if !n.trim().is_empty() => n.trim().to_string(),
            _ => split_name_num(&self.raw_name).num,
        }
    }

    pub fn normalize(&self, normalizer: &Normalizer) -> NormalizedQuery {
        NormalizedQuery {
            clean_name: normalizer.sanitize(&self.name_part()),
            numeric_token: normalizer.first_num(&self.number_part()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedQuery {
    pub clean_name: String,
    /// Digit run or lower-case prefix + digits; empty when none was found.
    pub numeric_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_id_rejects_sentinels() {
        assert_eq!(CatalogId::parse("0"), None);
        assert_eq!(CatalogId::parse(""), None);
        assert_eq!(CatalogId::parse("  "), None);
        assert_eq!(CatalogId::from_number(0), None);
        assert_eq!(CatalogId::parse(" 123 ").unwrap().as_str(), "123");
        assert_eq!(CatalogId::from_number(42).unwrap().to_string(), "42");
    }

    #[test]
    fn test_descriptor_catalog_id() {
        let card = CardDescriptor::new("Pikachu", "Base Set");
        assert_eq!(card.valid_catalog_id(), None);
        assert_eq!(card.clone().with_catalog_id("0").valid_catalog_id(), None);
        assert_eq!(
            card.with_catalog_id("981").valid_catalog_id(),
            CatalogId::parse("981")
        );
    }

    #[test]
    fn test_normalize_uses_name_token_without_number_cell() {
        let normalizer = Normalizer::default();
        let card = CardDescriptor::new("Dusclops Reverse Holo 14", "Phantom Forces");
        let query = card.normalize(&normalizer);
        assert_eq!(query.clean_name, "Dusclops");
        assert_eq!(query.numeric_token, "14");
    }

    #[test]
    fn test_normalize_prefers_number_cell() {
        let normalizer = Normalizer::default();
        let card = CardDescriptor::new("Dusclops 14", "Phantom Forces").with_number("TG10/TG30");
        let query = card.normalize(&normalizer);
        assert_eq!(query.clean_name, "Dusclops");
        assert_eq!(query.numeric_token, "tg10");
    }

    #[test]
    fn test_descriptor_deserializes_without_optionals() {
        let card: CardDescriptor =
            serde_json::from_str(r#"{"raw_name": "Mew 151", "set_full": "151"}"#).unwrap();
        assert_eq!(card.number, None);
        assert_eq!(card.number_part(), "151");
    }

    #[test]
    fn test_window_names() {
        assert_eq!(Marketplace::Cardmarket.window_name(), "MCMWindow");
        assert_eq!(Marketplace::Tcgplayer.window_name(), "TCGWindow");
    }
}
