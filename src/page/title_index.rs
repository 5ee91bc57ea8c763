//! Index of descriptive titles for numbered-designation pages
//!
//! The wiki's numbered pages carry their real titles only on a few series
//! listing pages. The index is built from those listing pages' stored HTML
//! and maps page URL to descriptive title. Construction is explicit so the
//! build-at-most-once invariant lives in [`crate::page::Snapshot`], not in
//! hidden attribute memoization.

use crate::page::Snapshot;
use crate::Result;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::{HashMap, HashSet};

/// Listing pages that carry designation/title pairs
const SERIES_SLUGS: [&str; 3] = ["scp-series", "scp-series-2", "scp-series-3"];

/// Maps page URL to descriptive title
#[derive(Debug, Default)]
pub struct TitleIndex {
    entries: HashMap<String, String>,
}

impl TitleIndex {
    /// Builds the index by scraping the series listing pages in the snapshot
    ///
    /// Each list entry's text splits into a short designation code and a
    /// descriptive title. Entries whose target is tagged `splash` are keyed
    /// by a derived URL (site origin plus the lowercased designation)
    /// instead of the entry's own anchor target.
    pub fn build(snapshot: &Snapshot) -> Result<TitleIndex> {
        tracing::info!("constructing title index");

        let designation =
            Regex::new(r"[SCP]+-[0-9]+").map_err(|e| crate::WikisnapError::Crawl(e.to_string()))?;
        let splash_urls: HashSet<String> =
            snapshot.store().pages_with_tag("splash")?.into_iter().collect();

        let mut entries = HashMap::new();
        for slug in SERIES_SLUGS {
            let page = snapshot.page(slug);
            let Some(html) = page.html()? else {
                tracing::warn!("Series listing {} is not in the snapshot", slug);
                continue;
            };
            index_listing(
                &html,
                snapshot.site(),
                &designation,
                &splash_urls,
                &mut entries,
            );
        }

        Ok(TitleIndex { entries })
    }

    pub fn get(&self, url: &str) -> Option<&str> {
        self.entries.get(url).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn index_listing(
    html: &str,
    site: &str,
    designation: &Regex,
    splash_urls: &HashSet<String>,
    entries: &mut HashMap<String, String>,
) {
    let document = Html::parse_document(html);
    let (Ok(items), Ok(anchors)) = (Selector::parse("ul > li"), Selector::parse("a")) else {
        return;
    };

    for item in document.select(&items) {
        let text: String = item.text().collect();
        if !designation.is_match(&text) {
            continue;
        }
        let Some(href) = item
            .select(&anchors)
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            continue;
        };
        let url = format!("{}{}", site.trim_end_matches('/'), href);

        // "SCP-173 - The Sculpture"; a few entries drop the space before
        // the separator.
        let Some((code, title)) = text
            .split_once(" - ")
            .or_else(|| text.split_once("- "))
        else {
            continue;
        };

        if splash_urls.contains(&url) {
            let true_url = format!("{}{}", site, code.trim().to_lowercase());
            entries.insert(true_url, title.trim().to_string());
        } else {
            entries.insert(url, title.trim().to_string());
        }
    }
}
