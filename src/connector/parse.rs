//! Parsers for wiki pages and module-endpoint HTML fragments
//!
//! Every function here is pure: it takes page HTML or a fragment returned by
//! the module endpoint and produces typed records. Missing or malformed DOM
//! resolves to empty defaults, never an error, so that one anomalous page
//! cannot abort a crawl.

use crate::store::{ForumPost, Revision, Vote};
use chrono::DateTime;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn element_text(el: ElementRef) -> String {
    el.text().collect::<String>()
}

/// Extracts the site-assigned page id embedded in the page's script state
pub fn parse_page_id(html: &str) -> Option<i64> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RE
        .get_or_init(|| Regex::new(r"pageId = ([^;]*);").ok())
        .as_ref()?;
    re.captures(html)?.get(1)?.as_str().trim().parse().ok()
}

/// Extracts the discussion thread id from the discuss button's href
pub fn parse_discussion_id(html: &str) -> Option<i64> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RE
        .get_or_init(|| Regex::new(r"/forum/t-([0-9]+)/").ok())
        .as_ref()?;

    let document = Html::parse_document(html);
    let button = selector("#discuss-button")?;
    let href = document.select(&button).next()?.value().attr("href")?;
    re.captures(href)?.get(1)?.as_str().parse().ok()
}

/// The on-wiki page title, empty when the title element is missing
pub fn parse_page_title(html: &str) -> String {
    let document = Html::parse_document(html);
    let Some(title) = selector("#page-title") else {
        return String::new();
    };
    document
        .select(&title)
        .next()
        .map(|el| element_text(el).trim().to_string())
        .unwrap_or_default()
}

/// The page's main-content subtree, which is what gets persisted
pub fn parse_main_content(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let main = selector("#main-content")?;
    document.select(&main).next().map(|el| el.html())
}

/// Tags listed in the page's tag block
pub fn parse_tags(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Some(anchors) = selector("div.page-tags a") else {
        return Vec::new();
    };
    document
        .select(&anchors)
        .map(|a| element_text(a).trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Unix seconds carried in an `odate` span's class list, as `time_<secs>`
fn odate_unix(el: ElementRef) -> Option<i64> {
    el.value()
        .classes()
        .find_map(|c| c.strip_prefix("time_"))
        .and_then(|s| s.parse().ok())
}

/// Normalizes unix seconds to the snapshot's `YYYY-MM-DD HH:mm:ss` form
fn format_unix_time(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

/// Parses a revision-list fragment into ordered revisions
///
/// The fragment is a table; the first row is a header. Columns: number,
/// flags, ..., user (4), odate (5), comment (6).
pub fn parse_revisions(fragment: &str, page_id: i64) -> Vec<Revision> {
    let document = Html::parse_fragment(fragment);
    let (Some(rows), Some(cells), Some(odate)) =
        (selector("tr"), selector("td"), selector("span.odate"))
    else {
        return Vec::new();
    };

    let mut revisions = Vec::new();
    for row in document.select(&rows).skip(1) {
        let tds: Vec<ElementRef> = row.select(&cells).collect();
        if tds.len() < 7 {
            continue;
        }
        let Ok(number) = element_text(tds[0]).trim().trim_end_matches('.').parse() else {
            continue;
        };
        let time = tds[5]
            .select(&odate)
            .next()
            .and_then(odate_unix)
            .map(format_unix_time)
            .unwrap_or_default();
        revisions.push(Revision {
            page_id,
            number,
            user: element_text(tds[4]).trim().to_string(),
            time,
            comment: element_text(tds[6]).trim().to_string(),
        });
    }
    revisions
}

/// Parses a who-rated fragment into votes
///
/// Each voter is a `span.printuser`; the vote sign is the following element
/// sibling's text.
pub fn parse_votes(fragment: &str, page_id: i64) -> Vec<Vote> {
    let document = Html::parse_fragment(fragment);
    let Some(users) = selector("span.printuser") else {
        return Vec::new();
    };

    let mut votes = Vec::new();
    for user_el in document.select(&users) {
        let sign = user_el
            .next_siblings()
            .find_map(ElementRef::wrap)
            .map(|el| element_text(el).trim().to_string())
            .unwrap_or_default();
        let value = if sign == "+" { 1 } else { -1 };
        votes.push(Vote {
            page_id,
            user: element_text(user_el).trim().to_string(),
            value,
        });
    }
    votes
}

/// Extracts page source text from a view-source fragment
///
/// The fragment's text carries an 11-character label prefix before the
/// source itself.
pub fn parse_source(fragment: &str) -> String {
    let document = Html::parse_fragment(fragment);
    let text: String = document.root_element().text().collect();
    text.chars().skip(11).collect::<String>().trim().to_string()
}

/// Reads a pager label of the form "N of M", defaulting to one page
pub fn parse_pager_page_count(fragment: &str) -> usize {
    let document = Html::parse_fragment(fragment);
    let Some(pager) = selector("span.pager-no") else {
        return 1;
    };
    document
        .select(&pager)
        .next()
        .and_then(|el| {
            let text = element_text(el);
            text.split(" of ").nth(1)?.trim().parse().ok()
        })
        .unwrap_or(1)
}

/// Parses one page of a forum thread into posts
///
/// A post's parent is inferred from container nesting: when the grandparent
/// of a `div.post` is itself a `post-container`, the first post inside that
/// container is the parent.
pub fn parse_forum_posts(fragment: &str, thread_id: i64) -> Vec<ForumPost> {
    let document = Html::parse_fragment(fragment);
    let (Some(post_sel), Some(title_sel), Some(content_sel), Some(user_sel), Some(odate_sel)) = (
        selector("div.post"),
        selector("div.title"),
        selector("div.content"),
        selector("span.printuser"),
        selector("span.odate"),
    ) else {
        return Vec::new();
    };

    let mut posts = Vec::new();
    for post in document.select(&post_sel) {
        let Some(post_id) = post_element_id(post) else {
            continue;
        };
        let title = post
            .select(&title_sel)
            .next()
            .map(|el| element_text(el).trim().to_string())
            .unwrap_or_default();
        let content = post
            .select(&content_sel)
            .next()
            .map(|el| el.inner_html())
            .unwrap_or_default();
        let user = post
            .select(&user_sel)
            .next()
            .map(|el| element_text(el).trim().to_string())
            .unwrap_or_default();
        let time = post
            .select(&odate_sel)
            .next()
            .and_then(odate_unix)
            .map(format_unix_time)
            .unwrap_or_default();
        let parent_id = parent_post_id(post, &post_sel);

        posts.push(ForumPost {
            thread_id,
            post_id,
            title,
            content,
            user,
            time,
            parent_id,
        });
    }
    posts
}

/// Numeric id from a post element's `post-<n>` id attribute
fn post_element_id(post: ElementRef) -> Option<i64> {
    post.value().attr("id")?.split('-').nth(1)?.parse().ok()
}

fn parent_element(el: ElementRef) -> Option<ElementRef> {
    el.parent().and_then(ElementRef::wrap)
}

fn parent_post_id(post: ElementRef, post_sel: &Selector) -> Option<i64> {
    let container = parent_element(post)?;
    let grandparent = parent_element(container)?;
    if !grandparent.value().classes().any(|c| c == "post-container") {
        return None;
    }
    grandparent.select(post_sel).next().and_then(post_element_id)
}

/// Number of the last index page, read from the index pager
pub fn parse_last_index_page(html: &str) -> usize {
    let document = Html::parse_document(html);
    let Some(pager) = selector("div.pager span.pager-no") else {
        return 1;
    };
    document
        .select(&pager)
        .next()
        .and_then(|el| {
            let text = element_text(el);
            text.split_whitespace().last()?.parse().ok()
        })
        .unwrap_or(1)
}

/// Page URLs listed on one index page, absolutized against the site origin
pub fn parse_index_urls(html: &str, site: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Some(anchors) = selector("div.list-pages-item a") else {
        return Vec::new();
    };
    document
        .select(&anchors)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| format!("{}{}", site.trim_end_matches('/'), href))
        .collect()
}

/// Rows of a two-column auxiliary listing table, header skipped
pub fn parse_table_rows(html: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    let (Some(rows), Some(cells)) = (selector("tr"), selector("td")) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for row in document.select(&rows).skip(1) {
        let tds: Vec<ElementRef> = row.select(&cells).collect();
        if tds.len() < 2 {
            continue;
        }
        out.push((
            element_text(tds[0]).trim().to_string(),
            element_text(tds[1]).trim().to_string(),
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_id() {
        let html = "<script>WIKIREQUEST.info.pageId = 1956234;</script>";
        assert_eq!(parse_page_id(html), Some(1956234));
        assert_eq!(parse_page_id("<html></html>"), None);
    }

    #[test]
    fn test_parse_discussion_id() {
        let html = r#"<a id="discuss-button" href="/forum/t-485638/scp-902">Discuss</a>"#;
        assert_eq!(parse_discussion_id(html), Some(485638));

        let no_button = "<html><body></body></html>";
        assert_eq!(parse_discussion_id(no_button), None);
    }

    #[test]
    fn test_parse_page_title() {
        let html = r#"<div id="page-title">  SCP-902  </div>"#;
        assert_eq!(parse_page_title(html), "SCP-902");
        assert_eq!(parse_page_title("<html></html>"), "");
    }

    #[test]
    fn test_parse_tags() {
        let html = r#"<div class="page-tags"><span><a href="/system:page-tags/tag/scp">scp</a>
            <a href="/system:page-tags/tag/euclid">euclid</a></span></div>"#;
        assert_eq!(parse_tags(html), vec!["scp", "euclid"]);
    }

    #[test]
    fn test_parse_revisions() {
        let fragment = r#"<table>
            <tr><td>rev.</td><td></td><td></td><td></td><td>by</td><td>date</td><td>comments</td></tr>
            <tr><td>2.</td><td></td><td></td><td></td><td>alice</td>
                <td><span class="odate time_1388534400">date</span></td><td>fixed typo</td></tr>
            <tr><td>1.</td><td></td><td></td><td></td><td>bob</td>
                <td><span class="odate time_1388448000">date</span></td><td></td></tr>
        </table>"#;

        let revisions = parse_revisions(fragment, 7);
        assert_eq!(revisions.len(), 2);
        assert_eq!(revisions[0].number, 2);
        assert_eq!(revisions[0].user, "alice");
        assert_eq!(revisions[0].time, "2014-01-01 00:00:00");
        assert_eq!(revisions[0].comment, "fixed typo");
        assert_eq!(revisions[1].number, 1);
        assert_eq!(revisions[1].page_id, 7);
    }

    #[test]
    fn test_parse_votes() {
        let fragment = r#"<div>
            <span class="printuser">alice</span> <span>+</span><br>
            <span class="printuser">bob</span> <span>-</span><br>
        </div>"#;

        let votes = parse_votes(fragment, 7);
        assert_eq!(votes.len(), 2);
        assert_eq!(votes[0].user, "alice");
        assert_eq!(votes[0].value, 1);
        assert_eq!(votes[1].user, "bob");
        assert_eq!(votes[1].value, -1);
    }

    #[test]
    fn test_parse_source_strips_label_prefix() {
        // "page source" label plus separator is 11 characters of text
        let fragment = "<div class=\"page-source\">page source**Item #:** SCP-902</div>";
        assert_eq!(parse_source(fragment), "**Item #:** SCP-902");
    }

    #[test]
    fn test_parse_pager_page_count() {
        let fragment = r#"<div class="pager"><span class="pager-no">1 of 4</span></div>"#;
        assert_eq!(parse_pager_page_count(fragment), 4);
        assert_eq!(parse_pager_page_count("<div></div>"), 1);
    }

    fn post(id: i64, inner: &str) -> String {
        format!(
            r#"<div class="post-container"><div class="post" id="post-{}">
                <div class="title"> Re </div>
                <div class="content"><p>body {}</p></div>
                <span class="printuser">carol</span>
                <span class="odate time_1388534400">date</span>
            </div>{}</div>"#,
            id, id, inner
        )
    }

    #[test]
    fn test_parse_forum_posts_nesting() {
        let reply = post(200, "");
        let fragment = post(100, &reply);

        let posts = parse_forum_posts(&fragment, 5);
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].post_id, 100);
        assert_eq!(posts[0].parent_id, None);
        assert_eq!(posts[0].title, "Re");
        assert!(posts[0].content.contains("body 100"));
        assert_eq!(posts[1].post_id, 200);
        assert_eq!(posts[1].parent_id, Some(100));
        assert_eq!(posts[1].thread_id, 5);
    }

    #[test]
    fn test_parse_index_urls() {
        let html = r#"<div class="list-pages-item"><a href="/scp-002">SCP-002</a></div>
            <div class="list-pages-item"><a href="/scp-003">SCP-003</a></div>"#;
        let urls = parse_index_urls(html, "http://www.scp-wiki.net/");
        assert_eq!(
            urls,
            vec![
                "http://www.scp-wiki.net/scp-002".to_string(),
                "http://www.scp-wiki.net/scp-003".to_string()
            ]
        );
    }

    #[test]
    fn test_parse_last_index_page() {
        let html = r#"<div class="pager"><span class="pager-no">page 1 of 291</span></div>"#;
        assert_eq!(parse_last_index_page(html), 291);
        assert_eq!(parse_last_index_page("<div></div>"), 1);
    }

    #[test]
    fn test_parse_table_rows_skips_header() {
        let html = r#"<table>
            <tr><th>url</th><th>author</th></tr>
            <tr><td>scp-093</td><td>:override:alice</td></tr>
            <tr><td>scp-1437</td><td>bob</td></tr>
        </table>"#;
        let rows = parse_table_rows(html);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], ("scp-093".to_string(), ":override:alice".to_string()));
    }
}
