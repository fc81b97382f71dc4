// arXiv paper search via the Atom export API.
// arXiv asks clients to space calls at least three seconds apart; the
// default page delay in `ArxivSettings` covers that.

use threadscout_common::config::{ArxivSettings, PageLimits};
use threadscout_common::{DiscussionRecord, Platform};
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::http::read_bytes;
use crate::text::collapse_whitespace;
use crate::types::{PageCursor, SearchPage};

const ARXIV_API_URL: &str = "https://export.arxiv.org/api";
const ARXIV_ABS_PREFIXES: [&str; 2] = ["http://arxiv.org/abs/", "https://arxiv.org/abs/"];
/// Entries with this id prefix describe a query error, not a paper.
const ARXIV_ERROR_ID: &str = "api/errors";

pub struct ArxivClient {
    http: reqwest::Client,
    base_url: String,
    settings: ArxivSettings,
}

impl ArxivClient {
    pub fn new(http: reqwest::Client, settings: ArxivSettings) -> Self {
        Self {
            http,
            base_url: ARXIV_API_URL.to_string(),
            settings,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn limits(&self) -> PageLimits {
        self.settings.limits
    }

    pub async fn fetch_page(&self, keyword: &str, cursor: &PageCursor) -> Result<SearchPage> {
        let offset = match cursor {
            PageCursor::Offset(n) => *n,
            _ => 0,
        };
        let page_size = self.settings.limits.page_size;

        let req = self
            .http
            .get(format!("{}/query", self.base_url))
            .query(&[
                ("search_query", format!("all:\"{keyword}\"")),
                ("sortBy", "submittedDate".to_string()),
                ("sortOrder", "descending".to_string()),
            ])
            .query(&[("start", offset), ("max_results", page_size)]);

        let bytes = read_bytes(req.send().await?).await?;
        let page = parse_feed(&bytes, offset, page_size)?;

        debug!(
            keyword,
            offset,
            records = page.records.len(),
            skipped = page.skipped,
            "arxiv: page fetched"
        );
        Ok(page)
    }
}

fn paper_id(entry_id: &str) -> &str {
    ARXIV_ABS_PREFIXES
        .iter()
        .find_map(|prefix| entry_id.strip_prefix(prefix))
        .unwrap_or(entry_id)
}

/// Parse an Atom result page starting at `offset`. A full page implies more results.
pub fn parse_feed(bytes: &[u8], offset: u32, page_size: u32) -> Result<SearchPage> {
    let feed = feed_rs::parser::parse(bytes)
        .map_err(|e| ClientError::Parse(format!("arxiv feed: {e}")))?;

    if let Some(err) = feed.entries.iter().find(|e| e.id.contains(ARXIV_ERROR_ID)) {
        let detail = err
            .summary
            .as_ref()
            .map(|s| s.content.trim().to_string())
            .unwrap_or_default();
        return Err(ClientError::Api {
            status: 400,
            message: detail,
        });
    }

    let entry_count = feed.entries.len() as u32;
    let mut page = SearchPage::default();

    for entry in feed.entries {
        let url = entry
            .links
            .iter()
            .find(|l| l.rel.as_deref() == Some("alternate"))
            .or_else(|| entry.links.first())
            .map(|l| l.href.clone())
            .unwrap_or_else(|| entry.id.clone());

        let title = entry.title.map(|t| collapse_whitespace(&t.content)).unwrap_or_default();
        let summary = entry.summary.map(|s| collapse_whitespace(&s.content)).unwrap_or_default();
        let authors: Vec<String> = entry.authors.into_iter().map(|p| p.name).collect();

        let record = DiscussionRecord::new(Platform::Arxiv, paper_id(&entry.id), title, summary, url)
            .map(|r| {
                r.with_author((!authors.is_empty()).then(|| authors.join(", ")))
                    .with_created_at(entry.published.or(entry.updated))
            });

        match record {
            Some(r) => page.records.push(r),
            None => page.skipped += 1,
        }
    }

    if page_size > 0 && entry_count >= page_size {
        page.next = Some(PageCursor::Offset(offset + entry_count));
    }

    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, title: &str) -> String {
        format!(
            r#"<entry>
    <id>http://arxiv.org/abs/{id}</id>
    <published>2024-03-01T18:00:00Z</published>
    <updated>2024-03-02T18:00:00Z</updated>
    <title>{title}</title>
    <summary>  We study how autonomous
  agents discover peers.  </summary>
    <author><name>Ada Lovelace</name></author>
    <author><name>Alan Turing</name></author>
    <link href="http://arxiv.org/abs/{id}" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/{id}" rel="related" type="application/pdf"/>
  </entry>"#
        )
    }

    fn feed(entries: &[String]) -> Vec<u8> {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <id>http://arxiv.org/api/query</id>
  <title>ArXiv Query</title>
  <updated>2024-03-05T00:00:00Z</updated>
  {}
</feed>"#,
            entries.join("\n")
        )
        .into_bytes()
    }

    #[test]
    fn parses_entries() {
        let bytes = feed(&[entry("2403.00001v1", "Agent\n  Discovery Protocols")]);
        let page = parse_feed(&bytes, 0, 10).unwrap();

        let r = &page.records[0];
        assert_eq!(r.original_id, "2403.00001v1");
        assert_eq!(r.title, "Agent Discovery Protocols");
        assert_eq!(r.body, "We study how autonomous agents discover peers.");
        assert_eq!(r.url, "http://arxiv.org/abs/2403.00001v1");
        assert_eq!(r.author.as_deref(), Some("Ada Lovelace, Alan Turing"));
        assert!(r.created_at.is_some());
        assert!(page.is_last());
    }

    #[test]
    fn full_page_advances_offset() {
        let entries: Vec<String> = (0..2).map(|i| entry(&format!("2403.0000{i}"), "Paper")).collect();
        let page = parse_feed(&feed(&entries), 20, 2).unwrap();
        assert_eq!(page.next, Some(PageCursor::Offset(22)));
    }

    #[test]
    fn error_entry_is_an_api_error() {
        let err_entry = r#"<entry>
    <id>http://arxiv.org/api/errors#incorrect_id_format</id>
    <title>Error</title>
    <summary>incorrect id format</summary>
    <updated>2024-03-05T00:00:00Z</updated>
  </entry>"#
            .to_string();
        let err = parse_feed(&feed(&[err_entry]), 0, 10).unwrap_err();
        assert!(matches!(err, ClientError::Api { status: 400, .. }));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = parse_feed(b"<html>nope", 0, 10).unwrap_err();
        assert!(matches!(err, ClientError::Parse(_)));
    }
}
