//! Parent/child derivation between snapshot pages
//!
//! Hierarchy is not stored; it is derived on demand from each page's tags,
//! outbound links and breadcrumb trail.

use crate::page::Page;
use crate::Result;
use scraper::{Html, Selector};

const SKIP_CHILD_TAGS: [&str; 2] = ["supplement", "splash"];
const HUB_CANDIDATE_TAGS: [&str; 3] = ["tale", "goi-format", "goi2014"];

/// Child URLs of `page`, per its position in the wiki's structure
///
/// Skip articles and splash pages own their supplements outright. Hub pages
/// for tales and GoI-format works collect linked candidates, preferring the
/// ones that acknowledge the hub back.
pub fn children(page: &Page<'_>) -> Result<Vec<String>> {
    let tags = page.tags()?;
    if tags.iter().any(|t| t == "scp" || t == "splash") {
        children_of_skip(page)
    } else if tags.iter().any(|t| t == "hub")
        && tags.iter().any(|t| t == "tale" || t == "goi2014")
    {
        children_of_hub(page)
    } else {
        Ok(Vec::new())
    }
}

fn children_of_skip(page: &Page<'_>) -> Result<Vec<String>> {
    let mut children = Vec::new();
    for url in page.links()? {
        let linked = page.snapshot().page(url);
        if linked
            .tags()?
            .iter()
            .any(|t| SKIP_CHILD_TAGS.contains(&t.as_str()))
        {
            children.push(url.clone());
        }
    }
    Ok(children)
}

fn children_of_hub(page: &Page<'_>) -> Result<Vec<String>> {
    let mut candidates = Vec::new();
    let mut confirmed = Vec::new();
    for url in page.links()? {
        let linked = page.snapshot().page(url);
        if !linked
            .tags()?
            .iter()
            .any(|t| HUB_CANDIDATE_TAGS.contains(&t.as_str()))
        {
            continue;
        }
        candidates.push(url.clone());
        if acknowledges_hub(&linked, page)? {
            confirmed.push(url.clone());
        }
    }
    // An unacknowledged hub keeps all its candidates.
    if confirmed.is_empty() {
        Ok(candidates)
    } else {
        Ok(confirmed)
    }
}

/// True when `linked` links back to the hub or lists it last in its
/// breadcrumb trail
fn acknowledges_hub(linked: &Page<'_>, hub: &Page<'_>) -> Result<bool> {
    if linked.links()?.iter().any(|l| l.as_str() == hub.url()) {
        return Ok(true);
    }
    let Some(html) = linked.html()? else {
        return Ok(false);
    };
    Ok(breadcrumb_parent(&html, linked.snapshot().site()).as_deref() == Some(hub.url()))
}

/// URL of the last breadcrumb anchor, absolutized against the site origin
fn breadcrumb_parent(html: &str, site: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let anchors = Selector::parse("#breadcrumbs a").ok()?;
    let href = document
        .select(&anchors)
        .last()
        .and_then(|a| a.value().attr("href"))?;
    Some(format!("{}{}", site.trim_end_matches('/'), href))
}
