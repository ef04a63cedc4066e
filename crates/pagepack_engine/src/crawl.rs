use std::collections::{HashSet, VecDeque};

use pagepack_logging::pack_info;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::decode::decode_text;
use crate::discover::discover_page_links;
use crate::fetch::ResourceFetcher;
use crate::inspect::{DocumentInspector, ParsedDocument};
use crate::JobError;

/// Hard cap on crawled pages per job.
pub const DEFAULT_MAX_PAGES: usize = 64;

/// Breadth-first crawl frontier. A URL joins `known` the moment it is
/// enqueued or marked, so every page is fetched at most once even when linked
/// from several places.
#[derive(Debug, Default)]
pub struct CrawlState {
    known: HashSet<String>,
    pending: VecDeque<Url>,
}

impl CrawlState {
    pub fn mark_visited(&mut self, url: &Url) {
        self.known.insert(url.to_string());
    }

    pub fn enqueue(&mut self, url: Url) {
        if self.known.insert(url.to_string()) {
            self.pending.push_back(url);
        }
    }

    pub fn next(&mut self) -> Option<Url> {
        self.pending.pop_front()
    }
}

/// A secondary page captured during the crawl, still in its original form.
#[derive(Debug, Clone)]
pub struct CapturedPage {
    pub url: Url,
    pub html: String,
}

/// Fetches every same-origin page reachable from the starting document,
/// breadth first, up to `max_pages`. Fetch and decode failures become
/// warnings rather than aborting the crawl.
pub async fn crawl_pages(
    start: &dyn DocumentInspector,
    fetcher: &dyn ResourceFetcher,
    cancel: &CancellationToken,
    max_pages: usize,
) -> Result<(Vec<CapturedPage>, Vec<String>), JobError> {
    let mut state = CrawlState::default();
    let mut pages = Vec::new();
    let mut warnings = Vec::new();

    let mut start_url = start.base_url().clone();
    start_url.set_fragment(None);
    state.mark_visited(&start_url);
    for link in discover_page_links(start) {
        state.enqueue(link);
    }

    while let Some(url) = state.next() {
        if cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        if pages.len() >= max_pages {
            warnings.push(format!("Crawl stopped after {max_pages} pages"));
            break;
        }
        match fetcher.retrieve(&url).await {
            Ok(retrieved) => {
                match decode_text(&retrieved.bytes, retrieved.content_type.as_deref()) {
                    Ok(decoded) => {
                        let document = ParsedDocument::parse(&decoded.text, url.clone());
                        for link in discover_page_links(&document) {
                            state.enqueue(link);
                        }
                        pack_info!("Crawled page {url}");
                        pages.push(CapturedPage {
                            url,
                            html: decoded.text,
                        });
                    }
                    Err(err) => warnings.push(format!("Failed to decode page {url}: {err}")),
                }
            }
            Err(err) => warnings.push(format!("Failed to fetch page {url}: {err}")),
        }
    }

    Ok((pages, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn frontier_never_revisits() {
        let mut state = CrawlState::default();
        let a = Url::parse("https://example.com/a").unwrap();
        let b = Url::parse("https://example.com/b").unwrap();
        state.mark_visited(&a);
        state.enqueue(a.clone());
        state.enqueue(b.clone());
        state.enqueue(b.clone());
        assert_eq!(state.next(), Some(b));
        assert_eq!(state.next(), None);
    }
}
