//! Listing page parser
//!
//! Extracts from a listing document:
//! - The summary region text ("Showing 1 to 3 of 3 entries")
//! - Observation indicators, in document order, with their targets
//! - The state of the next-page control

use crate::config::PortalConfig;
use crate::portal::IndicatorHandle;
use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Compiled selectors for one portal's listing markup
#[derive(Debug, Clone)]
pub struct ListingSelectors {
    summary: Selector,
    indicator: Selector,
    next: Selector,
    link: Selector,
    disabled_class: String,
}

impl ListingSelectors {
    pub fn from_config(config: &PortalConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            summary: parse_selector(&config.summary_selector)?,
            indicator: parse_selector(&config.indicator_selector)?,
            next: parse_selector(&config.next_selector)?,
            link: parse_selector("a[href]")?,
            disabled_class: config.disabled_class.clone(),
        })
    }
}

fn parse_selector(raw: &str) -> Result<Selector, ConfigError> {
    Selector::parse(raw).map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", raw, e)))
}

/// State of the next-page control on the current page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextControl {
    /// The page has no next control at all
    Absent,

    /// The control is present but marked as disabled
    Disabled,

    /// The control leads to this absolute location
    Link(String),

    /// The control is enabled but carries no followable location
    Unfollowable,
}

impl NextControl {
    /// Returns true if this control ends the listing
    pub fn is_last_page(&self) -> bool {
        !matches!(self, Self::Link(_))
    }
}

/// A parsed listing page
///
/// `scraper::Html` is not `Send`, so documents are parsed on demand inside
/// synchronous calls rather than held across awaits.
pub struct ListingMarkup<'a> {
    document: Html,
    base_url: &'a Url,
    selectors: &'a ListingSelectors,
}

impl<'a> ListingMarkup<'a> {
    pub fn parse(html: &str, base_url: &'a Url, selectors: &'a ListingSelectors) -> Self {
        Self {
            document: Html::parse_document(html),
            base_url,
            selectors,
        }
    }

    /// Whitespace-normalized text of the first summary region
    pub fn summary_text(&self) -> Option<String> {
        self.document
            .select(&self.selectors.summary)
            .next()
            .map(|element| normalize_whitespace(&element.text().collect::<String>()))
    }

    /// All observation indicators on the page, in document order
    pub fn indicators(&self) -> Vec<IndicatorHandle> {
        self.document
            .select(&self.selectors.indicator)
            .enumerate()
            .map(|(ordinal, element)| IndicatorHandle {
                ordinal,
                label: indicator_label(&element),
                target: self.indicator_target(&element),
            })
            .collect()
    }

    /// Reads the next-page control
    pub fn next_control(&self) -> NextControl {
        let Some(control) = self.document.select(&self.selectors.next).next() else {
            return NextControl::Absent;
        };

        let element = control.value();
        let disabled = element
            .classes()
            .any(|class| class == self.selectors.disabled_class)
            || element.attr("disabled").is_some()
            || element.attr("aria-disabled") == Some("true");
        if disabled {
            return NextControl::Disabled;
        }

        let href = element.attr("href").or_else(|| {
            control
                .select(&self.selectors.link)
                .next()
                .and_then(|link| link.value().attr("href"))
        });

        match href.and_then(|href| resolve_link(href, self.base_url)) {
            Some(url) => NextControl::Link(url),
            None => NextControl::Unfollowable,
        }
    }

    /// Finds where an indicator leads: its own link attributes first, then
    /// the nearest enclosing link
    fn indicator_target(&self, element: &ElementRef<'_>) -> Option<String> {
        let own = ["href", "data-href", "data-url"]
            .iter()
            .find_map(|attr| element.value().attr(attr));

        let href = own.or_else(|| {
            element
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find_map(|ancestor| ancestor.value().attr("href"))
        })?;

        resolve_link(href, self.base_url)
    }
}

fn indicator_label(element: &ElementRef<'_>) -> String {
    element
        .value()
        .attr("aria-label")
        .map(normalize_whitespace)
        .unwrap_or_else(|| normalize_whitespace(&element.text().collect::<String>()))
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolves an href to an absolute http(s) URL
///
/// Returns None for script links, fragment-only links and anything that does
/// not resolve to http or https.
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute) if absolute.scheme() == "http" || absolute.scheme() == "https" => {
            Some(absolute.to_string())
        }
        _ => None,
    }
}
