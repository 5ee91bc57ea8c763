//! Source connector for a Wikidot-style wiki
//!
//! This module translates the site's ad-hoc AJAX and HTML responses into the
//! typed records of the snapshot store. Most non-page operations go through a
//! single generic "module" endpoint parameterized by module name and page id,
//! which returns a JSON envelope whose `body` field is an HTML fragment.

pub mod parse;

use crate::store::{AuthorRecord, ForumPost, ImageRecord, Revision, Vote};
use crate::{Result, WikisnapError};
use reqwest::cookie::Jar;
use reqwest::{redirect::Policy, Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Constant session token echoed as both a form field and a cookie; the
/// module endpoint validates the two against each other, not against a
/// server-issued value.
const SESSION_TOKEN: &str = "123456";

/// Transport-level retries before a request error is surfaced
const MAX_TRANSPORT_RETRIES: u32 = 5;

const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Connector for one wiki site
///
/// Stateless apart from the shared HTTP session (cookies, connection reuse,
/// bounded retry on transport errors). Safe to share across fetch workers.
pub struct WikidotConnector {
    site: String,
    client: Client,
}

impl WikidotConnector {
    /// Creates a connector for the given site origin
    pub fn new(site: &str) -> Result<Self> {
        let mut site = site.to_string();
        if !site.ends_with('/') {
            site.push('/');
        }
        let site_url = Url::parse(&site)?;

        // The module endpoint checks the token cookie against the posted
        // field, so seed the jar with the constant token up front.
        let jar = Arc::new(Jar::default());
        jar.add_cookie_str(&format!("wikidot_token7={}", SESSION_TOKEN), &site_url);

        let client = Client::builder()
            .user_agent(concat!("wikisnap/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .redirect(Policy::none()) // missing pages redirect; treat as absent
            .cookie_provider(jar)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self { site, client })
    }

    /// The site origin this connector targets, with a trailing slash
    pub fn site(&self) -> &str {
        &self.site
    }

    // ===== Internal Methods =====

    /// Sends a GET, retrying transport failures a bounded number of times
    async fn get_with_retry(&self, url: &str) -> Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            match self.client.get(url).send().await {
                Ok(response) => return Ok(response),
                Err(e) if is_transport_error(&e) && attempt < MAX_TRANSPORT_RETRIES => {
                    attempt += 1;
                    tracing::debug!("Transport error for {} (attempt {}): {}", url, attempt, e);
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => {
                    return Err(WikisnapError::Http {
                        url: url.to_string(),
                        source: e,
                    })
                }
            }
        }
    }

    /// Calls the generic module endpoint and returns its JSON envelope
    ///
    /// The endpoint accepts both `page_id` and `pageId` spellings; sending
    /// both keeps every module happy.
    pub async fn module(
        &self,
        name: &str,
        page_id: Option<i64>,
        extra: &[(&str, String)],
    ) -> Result<serde_json::Value> {
        tracing::debug!("module call: {} ({:?}) ({:?})", name, page_id, extra);

        let mut form: Vec<(&str, String)> = vec![
            ("moduleName", name.to_string()),
            ("wikidot_token7", SESSION_TOKEN.to_string()),
        ];
        if let Some(id) = page_id {
            form.push(("page_id", id.to_string()));
            form.push(("pageId", id.to_string()));
        }
        form.extend(extra.iter().cloned());

        let url = format!("{}ajax-module-connector.php", self.site);
        let mut attempt = 0;
        let response = loop {
            match self.client.post(&url).form(&form).send().await {
                Ok(response) => break response,
                Err(e) if is_transport_error(&e) && attempt < MAX_TRANSPORT_RETRIES => {
                    attempt += 1;
                    tracing::debug!("Transport error for {} (attempt {}): {}", url, attempt, e);
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => {
                    return Err(WikisnapError::Http {
                        url,
                        source: e,
                    })
                }
            }
        };

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| WikisnapError::Module {
                module: name.to_string(),
                message: format!("invalid JSON envelope: {}", e),
            })
    }

    /// Calls a module and extracts the HTML fragment from its envelope
    async fn module_body(
        &self,
        name: &str,
        page_id: Option<i64>,
        extra: &[(&str, String)],
    ) -> Result<String> {
        let envelope = self.module(name, page_id, extra).await?;
        envelope
            .get("body")
            .and_then(|b| b.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| WikisnapError::Module {
                module: name.to_string(),
                message: "envelope has no body field".to_string(),
            })
    }

    // ===== Page Interface Methods =====

    /// Fetches a page's full HTML without following redirects
    ///
    /// Any non-200 status yields `None`; a missing page must not halt a
    /// crawl.
    pub async fn get_page_html(&self, url: &str) -> Result<Option<String>> {
        let response = self.get_with_retry(url).await?;
        if response.status() == StatusCode::OK {
            Ok(Some(response.text().await?))
        } else {
            tracing::warn!(
                "Page {} returned http status code {}",
                url,
                response.status()
            );
            Ok(None)
        }
    }

    /// Full revision history for a page, oldest first
    pub async fn get_page_history(&self, page_id: Option<i64>) -> Result<Vec<Revision>> {
        let Some(page_id) = page_id else {
            return Ok(Vec::new());
        };
        let body = self
            .module_body(
                "history/PageRevisionListModule",
                Some(page_id),
                &[("page", "1".to_string()), ("perpage", "1000000".to_string())],
            )
            .await?;
        Ok(parse::parse_revisions(&body, page_id))
    }

    /// Individual votes on a page
    pub async fn get_page_votes(&self, page_id: Option<i64>) -> Result<Vec<Vote>> {
        let Some(page_id) = page_id else {
            return Ok(Vec::new());
        };
        let body = self
            .module_body("pagerate/WhoRatedPageModule", Some(page_id), &[])
            .await?;
        Ok(parse::parse_votes(&body, page_id))
    }

    /// Wiki-syntax source of a page
    pub async fn get_page_source(&self, page_id: Option<i64>) -> Result<String> {
        let Some(page_id) = page_id else {
            return Ok(String::new());
        };
        let body = self
            .module_body("viewsource/ViewSourceModule", Some(page_id), &[])
            .await?;
        Ok(parse::parse_source(&body))
    }

    /// All posts of a discussion thread, across every pager page
    pub async fn get_forum_thread(&self, thread_id: Option<i64>) -> Result<Vec<ForumPost>> {
        let Some(thread_id) = thread_id else {
            return Ok(Vec::new());
        };

        let first = self.forum_thread_page(thread_id, 1).await?;
        let page_count = parse::parse_pager_page_count(&first);

        let mut posts = parse::parse_forum_posts(&first, thread_id);
        for page_no in 2..=page_count {
            let body = self.forum_thread_page(thread_id, page_no).await?;
            posts.extend(parse::parse_forum_posts(&body, thread_id));
        }
        Ok(posts)
    }

    async fn forum_thread_page(&self, thread_id: i64, page_no: usize) -> Result<String> {
        self.module_body(
            "forum/ForumViewThreadPostsModule",
            None,
            &[
                ("t", thread_id.to_string()),
                ("pageNo", page_no.to_string()),
            ],
        )
        .await
    }

    // ===== Read-only Methods =====

    /// Enumerates the URL of every page on the site
    ///
    /// Walks the paginated list-all-pages index sequentially. Re-invoking
    /// re-issues all index requests; failures here are crawl-fatal since
    /// there is no per-item isolation yet.
    pub async fn list_all_pages(&self) -> Result<Vec<String>> {
        let index_url = |n: usize| format!("{}system:list-all-pages/p/{}", self.site, n);

        let first = self.get_page_html(&index_url(1)).await?.ok_or_else(|| {
            WikisnapError::Enumeration("page index returned no content".to_string())
        })?;
        let last_page = parse::parse_last_index_page(&first);

        let mut urls = Vec::new();
        for index in 1..=last_page {
            tracing::info!("Downloading index: {}/{}", index, last_page);
            let html = self.get_page_html(&index_url(index)).await?.ok_or_else(|| {
                WikisnapError::Enumeration(format!("index page {} returned no content", index))
            })?;
            urls.extend(parse::parse_index_urls(&html, &self.site));
        }
        Ok(urls)
    }

    /// Scrapes the image whitelist table and downloads each image's bytes
    ///
    /// A row whose image fails to download is skipped with a warning; the
    /// rest of the whitelist still goes through.
    pub async fn scrape_images(&self, listing_url: &str) -> Result<Vec<ImageRecord>> {
        let Some(html) = self.get_page_html(listing_url).await? else {
            return Err(WikisnapError::Enumeration(format!(
                "image whitelist {} returned no content",
                listing_url
            )));
        };

        let mut images = Vec::new();
        for (image_url, source) in parse::parse_table_rows(&html) {
            let response = match self.get_with_retry(&image_url).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("Skipping image {}: {}", image_url, e);
                    continue;
                }
            };
            let data = match response.bytes().await {
                Ok(b) => b.to_vec(),
                Err(e) => {
                    tracing::warn!("Skipping image {}: {}", image_url, e);
                    continue;
                }
            };
            images.push(ImageRecord {
                url: image_url,
                source,
                data,
            });
        }
        Ok(images)
    }

    /// Scrapes the author override table
    ///
    /// An `:override:` prefix on the author cell marks the row as replacing,
    /// rather than supplementing, the on-wiki attribution.
    pub async fn scrape_authors(&self, listing_url: &str) -> Result<Vec<AuthorRecord>> {
        let Some(html) = self.get_page_html(listing_url).await? else {
            return Err(WikisnapError::Enumeration(format!(
                "author listing {} returned no content",
                listing_url
            )));
        };

        let authors = parse::parse_table_rows(&html)
            .into_iter()
            .map(|(slug, author)| {
                let (author, is_override) = match author.strip_prefix(":override:") {
                    Some(rest) => (rest.to_string(), true),
                    None => (author, false),
                };
                AuthorRecord {
                    url: format!("{}{}", self.site, slug),
                    author,
                    is_override,
                }
            })
            .collect();
        Ok(authors)
    }

    // ===== Active Methods =====
    // Not exercised by the read-only crawl path; part of the connector's
    // contract for tooling that edits the live site.

    /// Logs the session in; subsequent module calls carry the session cookie
    pub async fn auth(&self, username: &str, password: &str) -> Result<()> {
        let form = [
            ("login", username),
            ("password", password),
            ("action", "Login2Action"),
            ("event", "login"),
        ];
        let url = "https://www.wikidot.com/default--flow/login__LoginPopupScreen";
        self.client
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(|e| WikisnapError::Http {
                url: url.to_string(),
                source: e,
            })?;
        Ok(())
    }

    /// Replaces a page's source and title
    pub async fn edit_page(
        &self,
        page_id: i64,
        url: &str,
        source: &str,
        title: &str,
        comments: Option<&str>,
    ) -> Result<()> {
        let wiki_page = url.rsplit('/').next().unwrap_or(url);

        // Editing requires a lock issued by the edit module.
        let lock = self
            .module(
                "edit/PageEditModule",
                Some(page_id),
                &[("mode", "page".to_string())],
            )
            .await?;
        let lock_field = |name: &str| -> Result<String> {
            lock.get(name)
                .map(json_field_to_string)
                .ok_or_else(|| WikisnapError::Module {
                    module: "edit/PageEditModule".to_string(),
                    message: format!("missing lock field {}", name),
                })
        };

        let params = [
            ("source", source.to_string()),
            ("comments", comments.unwrap_or_default().to_string()),
            ("title", title.to_string()),
            ("lock_id", lock_field("lock_id")?),
            ("lock_secret", lock_field("lock_secret")?),
            ("revision_id", lock_field("page_revision_id")?),
            ("action", "WikiPageAction".to_string()),
            ("event", "savePage".to_string()),
            ("wiki_page", wiki_page.to_string()),
        ];
        self.module("Empty", Some(page_id), &params).await?;
        Ok(())
    }

    /// Posts a new top-level message in a forum thread
    pub async fn post_in_thread(
        &self,
        thread_id: i64,
        source: &str,
        title: Option<&str>,
    ) -> Result<()> {
        let params = [
            ("threadId", thread_id.to_string()),
            ("title", title.unwrap_or_default().to_string()),
            ("source", source.to_string()),
            ("action", "ForumAction".to_string()),
            ("event", "savePost".to_string()),
        ];
        self.module("Empty", None, &params).await?;
        Ok(())
    }

    /// Replaces a page's tag set
    pub async fn set_page_tags(&self, page_id: i64, tags: &[&str]) -> Result<()> {
        let params = [
            ("tags", tags.join(" ")),
            ("action", "WikiPageAction".to_string()),
            ("event", "saveTags".to_string()),
        ];
        self.module("Empty", Some(page_id), &params).await?;
        Ok(())
    }
}

fn is_transport_error(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_request()
}

fn json_field_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn connector(server: &MockServer) -> WikidotConnector {
        WikidotConnector::new(&server.uri()).unwrap()
    }

    #[tokio::test]
    async fn test_site_gets_trailing_slash() {
        let conn = WikidotConnector::new("http://www.scp-wiki.net").unwrap();
        assert_eq!(conn.site(), "http://www.scp-wiki.net/");
    }

    #[tokio::test]
    async fn test_get_page_html_missing_page_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/scp-404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let conn = connector(&server).await;
        let html = conn
            .get_page_html(&format!("{}/scp-404", server.uri()))
            .await
            .unwrap();
        assert!(html.is_none());
    }

    #[tokio::test]
    async fn test_get_page_html_does_not_follow_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/moved"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/elsewhere"))
            .mount(&server)
            .await;

        let conn = connector(&server).await;
        let html = conn
            .get_page_html(&format!("{}/moved", server.uri()))
            .await
            .unwrap();
        assert!(html.is_none());
    }

    #[tokio::test]
    async fn test_module_posts_token_as_field_and_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ajax-module-connector.php"))
            .and(body_string_contains("wikidot_token7=123456"))
            .and(body_string_contains("moduleName=pagerate"))
            .and(header("cookie", "wikidot_token7=123456"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "body": "<span class=\"printuser\">alice</span><span>+</span>"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let conn = connector(&server).await;
        let votes = conn.get_page_votes(Some(42)).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].value, 1);
    }

    #[tokio::test]
    async fn test_absent_page_id_short_circuits() {
        // No mock server at all: a network call would fail the test.
        let conn = WikidotConnector::new("http://127.0.0.1:9/").unwrap();
        assert!(conn.get_page_history(None).await.unwrap().is_empty());
        assert!(conn.get_page_votes(None).await.unwrap().is_empty());
        assert_eq!(conn.get_page_source(None).await.unwrap(), "");
        assert!(conn.get_forum_thread(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_forum_thread_merges_pager_pages() {
        let server = MockServer::start().await;

        let page1 = r#"<div><span class="pager-no">1 of 2</span>
            <div class="post-container"><div class="post" id="post-1">
              <div class="title">a</div><div class="content">x</div>
              <span class="printuser">u</span><span class="odate time_0">d</span>
            </div></div></div>"#;
        let page2 = r#"<div><div class="post-container"><div class="post" id="post-2">
              <div class="title">b</div><div class="content">y</div>
              <span class="printuser">u</span><span class="odate time_0">d</span>
            </div></div></div>"#;

        Mock::given(method("POST"))
            .and(path("/ajax-module-connector.php"))
            .and(body_string_contains("pageNo=1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "body": page1 })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ajax-module-connector.php"))
            .and(body_string_contains("pageNo=2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "body": page2 })),
            )
            .mount(&server)
            .await;

        let conn = connector(&server).await;
        let posts = conn.get_forum_thread(Some(9)).await.unwrap();
        let ids: Vec<i64> = posts.iter().map(|p| p.post_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(posts.iter().all(|p| p.thread_id == 9));
    }

    #[tokio::test]
    async fn test_module_envelope_without_body_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ajax-module-connector.php"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "wrong_token"
            })))
            .mount(&server)
            .await;

        let conn = connector(&server).await;
        let result = conn.get_page_votes(Some(1)).await;
        assert!(matches!(result, Err(WikisnapError::Module { .. })));
    }

    #[tokio::test]
    async fn test_list_all_pages_walks_index() {
        let server = MockServer::start().await;

        let index1 = r#"<div class="pager"><span class="pager-no">page 1 of 2</span></div>
            <div class="list-pages-item"><a href="/scp-002">x</a></div>"#;
        let index2 = r#"<div class="pager"><span class="pager-no">page 2 of 2</span></div>
            <div class="list-pages-item"><a href="/scp-003">y</a></div>"#;

        Mock::given(method("GET"))
            .and(path("/system:list-all-pages/p/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(index1))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/system:list-all-pages/p/2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(index2))
            .mount(&server)
            .await;

        let conn = connector(&server).await;
        let urls = conn.list_all_pages().await.unwrap();
        assert_eq!(
            urls,
            vec![
                format!("{}/scp-002", server.uri()),
                format!("{}/scp-003", server.uri()),
            ]
        );
    }

    #[tokio::test]
    async fn test_scrape_authors_override_prefix() {
        let server = MockServer::start().await;
        let html = r#"<table>
            <tr><th>page</th><th>author</th></tr>
            <tr><td>scp-093</td><td>:override:alice</td></tr>
            <tr><td>scp-1437</td><td>bob</td></tr>
        </table>"#;
        Mock::given(method("GET"))
            .and(path("/alexandra-rewrite"))
            .respond_with(ResponseTemplate::new(200).set_body_string(html))
            .mount(&server)
            .await;

        let conn = connector(&server).await;
        let authors = conn
            .scrape_authors(&format!("{}/alexandra-rewrite", server.uri()))
            .await
            .unwrap();
        assert_eq!(authors.len(), 2);
        assert_eq!(authors[0].author, "alice");
        assert!(authors[0].is_override);
        assert_eq!(authors[1].author, "bob");
        assert!(!authors[1].is_override);
    }
}
