//! Search queries and URLs for each marketplace.

use crate::config::UrlTemplates;
use crate::crossref::CrossRefResolver;
use crate::models::{CardDescriptor, Marketplace};
use crate::normalize::{Normalizer, fix_delta, is_numeric, pad_number, split_name_num};
use crate::set_abbreviations::AbbreviationResolver;
use crate::source::DocumentSource;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use tracing::debug;

/// Everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`, like a browser's
/// `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_uri_component(text: &str) -> String {
    utf8_percent_encode(text, URI_COMPONENT).to_string()
}

/// A strict Cardmarket query and a looser one to try when it finds nothing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CardmarketQuery {
    pub primary: String,
    pub backup: String,
}

pub struct QueryBuilder {
    normalizer: Normalizer,
    templates: UrlTemplates,
}

impl QueryBuilder {
    pub fn new(normalizer: Normalizer, templates: UrlTemplates) -> Self {
        QueryBuilder {
            normalizer,
            templates,
        }
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub async fn cardmarket_query<S: DocumentSource>(
        &self,
        abbreviations: &AbbreviationResolver<S>,
        card: &CardDescriptor,
    ) -> CardmarketQuery {
        let abbr = abbreviations.resolve(&card.set_full).await;
        self.cardmarket_query_with_abbr(card, &abbr)
    }

    /// Build both Cardmarket queries from an already resolved set code.
    pub fn cardmarket_query_with_abbr(
        &self,
        card: &CardDescriptor,
        abbr: &str,
    ) -> CardmarketQuery {
        let normalized = card.normalize(&self.normalizer);
        let name = normalized.clean_name;
        let pn = normalized.numeric_token;

        let primary = match (abbr.is_empty(), pn.is_empty()) {
            (false, false) => format!("{} {}{}", name, abbr, pad_number(&pn)),
            (true, false) => format!("{} {}", name, pad_number(&pn)),
            _ => name.clone(),
        };
        let backup = if pn.is_empty() {
            name
        } else {
            format!("{} {}", name, pad_number(&pn))
        };

        debug!(
            card = %card.raw_name,
            abbr = %abbr,
            numeric = is_numeric(&pn),
            primary = %primary,
            "Built Cardmarket query"
        );
        CardmarketQuery { primary, backup }
    }

    /// Card name plus the last word of the set name.
    pub fn tcgplayer_query(&self, name: &str, set_full: &str) -> String {
        let split = split_name_num(name);
        let base = if split.name.is_empty() { name } else { split.name.as_str() };
        let clean = self.normalizer.sanitize(base);

        let last = if set_full.trim().eq_ignore_ascii_case("expedition base set") {
            "Expedition"
        } else {
            set_full.split_whitespace().last().unwrap_or("")
        };

        fix_delta(&self.normalizer.sanitize(&format!("{} {}", clean, last)))
    }

    /// Product page for a known marketplace product id.
    pub fn product_url(&self, marketplace: Marketplace, product_id: &str) -> String {
        let template = match marketplace {
            Marketplace::Cardmarket => &self.templates.cardmarket_direct,
            Marketplace::Tcgplayer => &self.templates.tcgplayer_direct,
        };
        template.replace("{id}", product_id)
    }

    /// Product page for a catalog id, if it has a cross-reference.
    pub async fn direct_url<S: DocumentSource>(
        &self,
        crossref: &CrossRefResolver<S>,
        marketplace: Marketplace,
        catalog_id: &str,
    ) -> Option<String> {
        let product_id = match marketplace {
            Marketplace::Cardmarket => crossref.cardmarket_id(catalog_id).await,
            Marketplace::Tcgplayer => crossref.tcgplayer_id(catalog_id).await,
        }?;
        Some(self.product_url(marketplace, &product_id))
    }

    pub fn search_url(&self, marketplace: Marketplace, query: &str) -> String {
        let template = match marketplace {
            Marketplace::Cardmarket => &self.templates.cardmarket_search,
            Marketplace::Tcgplayer => &self.templates.tcgplayer_search,
        };
        template.replace("{query}", &encode_uri_component(query))
    }

    pub fn store_manager_url(&self, name: &str, set_full: &str) -> String {
        self.templates
            .store_manager_search
            .replace("{name}", &encode_uri_component(name))
            .replace("{set}", &encode_uri_component(set_full))
    }
}

impl Default for QueryBuilder {
    fn default() -> Self {
        QueryBuilder::new(Normalizer::default(), UrlTemplates::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CROSS_REFERENCE_URL, RemoteDocumentConfig, SET_ABBREVIATIONS_URL};
    use crate::source::StaticSource;
    use crate::store::{ManualClock, MemoryStore};
    use serde_json::json;
    use std::sync::Arc;

    fn card(name: &str, set: &str, number: &str) -> CardDescriptor {
        CardDescriptor::new(name, set).with_number(number)
    }

    #[test]
    fn test_encode_uri_component() {
        assert_eq!(encode_uri_component("Pikachu V 025"), "Pikachu%20V%20025");
        assert_eq!(encode_uri_component("Farfetch'd (Promo)"), "Farfetch'd%20(Promo)");
        assert_eq!(encode_uri_component("a&b=c/d?"), "a%26b%3Dc%2Fd%3F");
        assert_eq!(encode_uri_component("Flabébé"), "Flab%C3%A9b%C3%A9");
        assert_eq!(encode_uri_component("-_.!~*"), "-_.!~*");
    }

    #[test]
    fn test_cardmarket_query_with_abbreviation() {
        let builder = QueryBuilder::default();
        let dusclops = card("Dusclops", "Base Set", "14/102");
        let query = builder.cardmarket_query_with_abbr(&dusclops, "BS");
        assert_eq!(query.primary, "Dusclops BS014");
        assert_eq!(query.backup, "Dusclops 014");

        let gallery = card("Dusclops", "Lost Origin", "tg10");
        let query = builder.cardmarket_query_with_abbr(&gallery, "LOR");
        assert_eq!(query.primary, "Dusclops LORtg10");
        assert_eq!(query.backup, "Dusclops tg10");
    }

    #[test]
    fn test_cardmarket_query_without_abbreviation() {
        let builder = QueryBuilder::default();
        let full_art = card("Pikachu Full Art", "Unknown", "7");
        let query = builder.cardmarket_query_with_abbr(&full_art, "");
        assert_eq!(query.primary, "Pikachu 007");
        assert_eq!(query.backup, "Pikachu 007");

        let unnumbered = CardDescriptor::new("Pikachu", "Unknown");
        let query = builder.cardmarket_query_with_abbr(&unnumbered, "");
        assert_eq!(query.primary, "Pikachu");
        assert_eq!(query.backup, "Pikachu");

        // abbreviation alone is not appended without a number
        let unnumbered = CardDescriptor::new("Pikachu", "Base Set");
        let query = builder.cardmarket_query_with_abbr(&unnumbered, "BS");
        assert_eq!(query.primary, "Pikachu");
    }

    #[test]
    fn test_cardmarket_query_takes_number_from_name() {
        let builder = QueryBuilder::default();
        let numbered_name = CardDescriptor::new("Dusclops 14", "Base Set");
        let query = builder.cardmarket_query_with_abbr(&numbered_name, "BS");
        assert_eq!(query.primary, "Dusclops BS014");
    }

    #[test]
    fn test_tcgplayer_query() {
        let builder = QueryBuilder::default();
        assert_eq!(builder.tcgplayer_query("Dusclops 14", "Deoxys"), "Dusclops Deoxys");
        assert_eq!(
            builder.tcgplayer_query("Charizard Reverse Holo", "Expedition Base Set"),
            "Charizard Expedition"
        );
        assert_eq!(
            builder.tcgplayer_query("Latias", "Dragon Frontiers \u{03b4} Delta Species"),
            "Latias Species"
        );
        assert_eq!(
            builder.tcgplayer_query("Latias \u{03b4} Delta Species", "Holon Phantoms"),
            "Latias delta Phantoms"
        );
        assert_eq!(builder.tcgplayer_query("Mew", ""), "Mew");
        assert_eq!(builder.tcgplayer_query("", ""), "");
    }

    #[test]
    fn test_search_and_store_manager_urls() {
        let builder = QueryBuilder::default();
        assert_eq!(
            builder.search_url(Marketplace::Cardmarket, "Dusclops BS014"),
            "https://www.cardmarket.com/en/Pokemon/Products/Search?searchString=Dusclops%20BS014"
        );
        assert_eq!(
            builder.search_url(Marketplace::Tcgplayer, "Mew & Mewtwo"),
            "https://www.tcgplayer.com/search/pokemon/product?Language=English&ProductTypeName=Cards&productLineName=pokemon&q=Mew%20%26%20Mewtwo&view=grid"
        );
        assert_eq!(
            builder.store_manager_url("Mr. Mime", "Jungle"),
            "https://poromagia.com/store_manager/pokemon/?name=Mr.%20Mime&set=Jungle"
        );
        assert_eq!(
            builder.product_url(Marketplace::Tcgplayer, "480001"),
            "https://www.tcgplayer.com/product/480001"
        );
    }

    #[tokio::test]
    async fn test_resolved_queries_and_direct_urls() {
        let source = Arc::new(StaticSource::new());
        source.serve(SET_ABBREVIATIONS_URL, json!({"Base Set": "BS"}));
        source.serve(CROSS_REFERENCE_URL, json!({"1001": {"mcmId": "273001"}}));
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let abbreviations = AbbreviationResolver::new(
            &RemoteDocumentConfig::set_abbreviations(),
            source.clone(),
            store.clone(),
            clock.clone(),
        );
        let crossref = CrossRefResolver::new(
            &RemoteDocumentConfig::cross_reference(),
            source.clone(),
            store,
            clock,
        );
        let builder = QueryBuilder::default();

        let query = builder
            .cardmarket_query(&abbreviations, &card("Dusclops", "Base Set (Shadowless)", "14"))
            .await;
        assert_eq!(query.primary, "Dusclops BS014");

        assert_eq!(
            builder.direct_url(&crossref, Marketplace::Cardmarket, "1001").await.as_deref(),
            Some("https://www.cardmarket.com/Pokemon/Products?idProduct=273001")
        );
        assert_eq!(builder.direct_url(&crossref, Marketplace::Tcgplayer, "1001").await, None);
        assert_eq!(builder.direct_url(&crossref, Marketplace::Cardmarket, "0").await, None);
    }
}
