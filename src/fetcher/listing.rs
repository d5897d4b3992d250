//! HTML directory index parsing

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::fetcher::http::ReqwestHttpClient;
use crate::fetcher::{DirectoryLister, FetcherError, FetcherResult, HttpFetch};

static ANCHOR_HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<a\s[^>]*?href\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
        .unwrap_or_else(|e| panic!("FATAL: invalid anchor pattern: {e}"))
});

/// Extract the child entries of `page_url` from an index page.
///
/// Only links that resolve to a direct child of the page are kept, so parent
/// links, sort links with a query, fragments and links to other hosts drop
/// out. Directory entries keep their trailing `/`. Duplicates are removed,
/// first occurrence wins.
pub fn parse_entries(html: &str, page_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let base_str = base.as_str();

    let mut entries: Vec<String> = Vec::new();
    for caps in ANCHOR_HREF.captures_iter(html) {
        let Some(href) = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)) else {
            continue;
        };
        let href = href.as_str().trim();
        if href.is_empty() || href.contains('?') || href.contains('#') {
            continue;
        }

        let Ok(resolved) = base.join(href) else {
            debug!("Ignoring unparsable link {:?} on {}", href, page_url);
            continue;
        };
        let Some(entry) = resolved.as_str().strip_prefix(base_str) else {
            debug!("Ignoring link outside {}: {}", page_url, href);
            continue;
        };

        let name = entry.strip_suffix('/').unwrap_or(entry);
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            continue;
        }

        if !entries.iter().any(|e| e == entry) {
            entries.push(entry.to_string());
        }
    }

    entries
}

/// [`DirectoryLister`] over any [`HttpFetch`]
#[derive(Clone)]
pub struct HtmlDirectoryLister {
    http: Arc<dyn HttpFetch>,
}

impl HtmlDirectoryLister {
    /// Lister issuing its requests through `http`
    pub fn new(http: Arc<dyn HttpFetch>) -> Self {
        Self { http }
    }
}

impl Default for HtmlDirectoryLister {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestHttpClient::new()))
    }
}

#[async_trait]
impl DirectoryLister for HtmlDirectoryLister {
    async fn list_entries(&self, url: &str) -> FetcherResult<Vec<String>> {
        let response = self.http.get(url).await?;
        if !response.is_success() {
            return Err(FetcherError::ListingError(format!(
                "HTTP {} for {}",
                response.status, url
            )));
        }

        let body = response.into_bytes().await?;
        let html = String::from_utf8_lossy(&body);
        let entries = parse_entries(&html, url);
        debug!("Listed {} entries at {}", entries.len(), url);
        Ok(entries)
    }
}
