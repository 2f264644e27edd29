//! Link buttons as plain command objects.
//!
//! The factory resolves everything a button needs up front (direct URL,
//! search URL, backup URL) so a click is a pure choice plus one
//! [`dispatch`] into the named-tab opener.

use crate::crossref::CrossRefResolver;
use crate::models::{CardDescriptor, Marketplace};
use crate::normalize::split_name_num;
use crate::query::QueryBuilder;
use crate::set_abbreviations::AbbreviationResolver;
use crate::source::DocumentSource;
use crate::tabs::{TabOpener, WindowHost};
use serde::Serialize;
use tracing::debug;

pub const STORE_MANAGER_WINDOW: &str = "PMWindow";

const CARDMARKET_INDICATOR: &str = "3px solid #4CAF50";
const TCGPLAYER_INDICATOR: &str = "3px solid #2196F3";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    #[default]
    Button,
    Anchor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonOptions {
    pub text: String,
    pub class_name: String,
    pub style: String,
    pub element: ElementKind,
    /// Mark buttons that go straight to a product page.
    pub show_direct_indicator: bool,
}

impl ButtonOptions {
    fn with_label(text: &str) -> Self {
        ButtonOptions {
            text: text.to_string(),
            class_name: String::new(),
            style: String::new(),
            element: ElementKind::Button,
            show_direct_indicator: true,
        }
    }

    pub fn cardmarket() -> Self {
        Self::with_label("M")
    }

    pub fn tcgplayer() -> Self {
        Self::with_label("T")
    }

    pub fn store_manager() -> Self {
        Self::with_label("PM")
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn class_name(mut self, class_name: &str) -> Self {
        self.class_name = class_name.to_string();
        self
    }

    pub fn style(mut self, style: &str) -> Self {
        self.style = style.to_string();
        self
    }

    pub fn element(mut self, element: ElementKind) -> Self {
        self.element = element;
        self
    }

    pub fn show_direct_indicator(mut self, show: bool) -> Self {
        self.show_direct_indicator = show;
        self
    }
}

/// Plain click or modifier-key click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClickGesture {
    #[default]
    Plain,
    Alternate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkCommand {
    pub label: String,
    pub title: String,
    pub element: ElementKind,
    pub class_name: String,
    pub style: String,
    /// Border style marking a direct link, if shown.
    pub indicator: Option<String>,
    pub window_name: String,
    pub direct_url: Option<String>,
    pub search_url: String,
    pub backup_url: Option<String>,
}

impl LinkCommand {
    /// The URL a click opens. The alternate gesture prefers the backup
    /// search when there is one; otherwise direct beats search.
    pub fn target(&self, gesture: ClickGesture) -> &str {
        if gesture == ClickGesture::Alternate {
            if let Some(backup) = &self.backup_url {
                return backup;
            }
        }
        self.direct_url.as_deref().unwrap_or(&self.search_url)
    }

    pub fn is_direct(&self) -> bool {
        self.direct_url.is_some()
    }
}

/// Open the command's target in its named tab and return the URL opened.
pub fn dispatch<H: WindowHost>(
    opener: &TabOpener<H>,
    command: &LinkCommand,
    gesture: ClickGesture,
) -> String {
    let url = command.target(gesture).to_string();
    debug!(
        window = %command.window_name,
        url = %url,
        direct = command.is_direct(),
        "Dispatching link"
    );
    opener.open_named(&url, &command.window_name);
    url
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchButtons {
    pub tcgplayer: LinkCommand,
    pub cardmarket: LinkCommand,
}

pub struct ButtonFactory<'a, S> {
    queries: &'a QueryBuilder,
    abbreviations: &'a AbbreviationResolver<S>,
    crossref: &'a CrossRefResolver<S>,
}

impl<'a, S: DocumentSource> ButtonFactory<'a, S> {
    pub fn new(
        queries: &'a QueryBuilder,
        abbreviations: &'a AbbreviationResolver<S>,
        crossref: &'a CrossRefResolver<S>,
    ) -> Self {
        ButtonFactory {
            queries,
            abbreviations,
            crossref,
        }
    }

    async fn direct_url(&self, marketplace: Marketplace, card: &CardDescriptor) -> Option<String> {
        let catalog_id = card.valid_catalog_id()?;
        self.queries
            .direct_url(self.crossref, marketplace, catalog_id.as_str())
            .await
    }

    pub async fn cardmarket_button(
        &self,
        card: &CardDescriptor,
        options: &ButtonOptions,
    ) -> LinkCommand {
        let direct_url = self.direct_url(Marketplace::Cardmarket, card).await;
        let query = self.queries.cardmarket_query(self.abbreviations, card).await;

        let title = if direct_url.is_some() {
            "Direct MCM link"
        } else {
            "Search on Cardmarket (Alt = backup)"
        };
        LinkCommand {
            label: options.text.clone(),
            title: title.to_string(),
            element: options.element,
            class_name: options.class_name.clone(),
            style: options.style.clone(),
            indicator: indicator(options, direct_url.is_some(), CARDMARKET_INDICATOR),
            window_name: Marketplace::Cardmarket.window_name().to_string(),
            search_url: self.queries.search_url(Marketplace::Cardmarket, &query.primary),
            backup_url: Some(self.queries.search_url(Marketplace::Cardmarket, &query.backup)),
            direct_url,
        }
    }

    pub async fn tcgplayer_button(
        &self,
        card: &CardDescriptor,
        options: &ButtonOptions,
    ) -> LinkCommand {
        let direct_url = self.direct_url(Marketplace::Tcgplayer, card).await;
        let query = self.queries.tcgplayer_query(&card.raw_name, &card.set_full);
        if card.valid_catalog_id().is_none() {
            debug!(
                card = %card.raw_name,
                set = %card.set_full,
                query = %query,
                "TCGplayer search fallback"
            );
        }

        let title = if direct_url.is_some() {
            "Direct TCGplayer link"
        } else {
            "Search on TCGplayer"
        };
        LinkCommand {
            label: options.text.clone(),
            title: title.to_string(),
            element: options.element,
            class_name: options.class_name.clone(),
            style: options.style.clone(),
            indicator: indicator(options, direct_url.is_some(), TCGPLAYER_INDICATOR),
            window_name: Marketplace::Tcgplayer.window_name().to_string(),
            search_url: self.queries.search_url(Marketplace::Tcgplayer, &query),
            backup_url: None,
            direct_url,
        }
    }

    pub fn store_manager_button(
        &self,
        card: &CardDescriptor,
        options: &ButtonOptions,
    ) -> LinkCommand {
        LinkCommand {
            label: options.text.clone(),
            title: "Search on Poromagia store manager".to_string(),
            element: options.element,
            class_name: options.class_name.clone(),
            style: options.style.clone(),
            indicator: None,
            window_name: STORE_MANAGER_WINDOW.to_string(),
            direct_url: None,
            search_url: self.queries.store_manager_url(&card.raw_name, &card.set_full),
            backup_url: None,
        }
    }

    pub async fn search_buttons(
        &self,
        card: &CardDescriptor,
        tcgplayer: &ButtonOptions,
        cardmarket: &ButtonOptions,
    ) -> SearchButtons {
        SearchButtons {
            tcgplayer: self.tcgplayer_button(card, tcgplayer).await,
            cardmarket: self.cardmarket_button(card, cardmarket).await,
        }
    }

    /// The toolbar shortcut: search both marketplaces for whatever is typed
    /// in the manager's name filter. Any number in the filter is dropped and
    /// no set is known there, so no lookups happen.
    pub fn filter_shortcut(&self, filter_text: &str) -> Vec<LinkCommand> {
        let split = split_name_num(filter_text.trim());
        let clean = self.queries.normalizer().sanitize(&split.name);
        let tcgplayer_query = self.queries.tcgplayer_query(&clean, "");
        let cardmarket_query = clean;

        [
            (Marketplace::Cardmarket, cardmarket_query),
            (Marketplace::Tcgplayer, tcgplayer_query),
        ]
        .into_iter()
        .map(|(marketplace, query)| LinkCommand {
            label: "OPEN MCM/TCG".to_string(),
            title: "Open/reuse persistent tabs based on current filter query.".to_string(),
            element: ElementKind::Button,
            class_name: String::new(),
            style: String::new(),
            indicator: None,
            window_name: marketplace.window_name().to_string(),
            direct_url: None,
            search_url: self.queries.search_url(marketplace, &query),
            backup_url: None,
        })
        .collect()
    }
}

fn indicator(options: &ButtonOptions, is_direct: bool, style: &str) -> Option<String> {
    (options.show_direct_indicator && is_direct).then(|| style.to_string())
}
