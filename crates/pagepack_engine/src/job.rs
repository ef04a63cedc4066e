use std::collections::HashSet;

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use pagepack_core::{
    JobConfiguration, PathAssigner, PathPolicy, ProgressState, ResourceKind, CATEGORY_SHARE,
};
use pagepack_logging::{pack_debug, pack_info, pack_warn};
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::archive::{suggested_archive_name, ArchiveError, ArchiveSink};
use crate::crawl::{crawl_pages, CapturedPage, DEFAULT_MAX_PAGES};
use crate::decode::decode_text;
use crate::discover::{self, Discovered, IconHeuristics};
use crate::fetch::ResourceFetcher;
use crate::inspect::DocumentInspector;
use crate::rewrite::{PathMap, Rewriter};
use crate::types::{
    ArchiveArtifact, FetchOutcome, FetchedResource, Payload, RefLocation, ResourceReference,
    StatusEvent, StatusSink,
};

/// Fatal job failures. Per-resource problems never appear here; they are
/// tolerated, reported through the status stream and the final report.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("archive generation failed: {0}")]
    Archive(#[from] ArchiveError),
    #[error("capture cancelled")]
    Cancelled,
}

/// Outcome of a completed job: the artifact plus everything that went wrong
/// along the way without stopping it.
#[derive(Debug)]
pub struct JobReport {
    pub artifact: ArchiveArtifact,
    pub errors: Vec<String>,
    pub failed_urls: Vec<String>,
}

/// One capture run: discover, retrieve, assign paths, rewrite, pack.
///
/// `run` consumes the job, so a job can never execute twice. The final status
/// event always carries `done`, whether the run finished or failed.
pub struct ArchiveJob<'a> {
    config: JobConfiguration,
    inspector: &'a dyn DocumentInspector,
    fetcher: &'a dyn ResourceFetcher,
    status: &'a dyn StatusSink,
    sink: &'a mut dyn ArchiveSink,
    cancel: CancellationToken,
    icon_heuristics: IconHeuristics,
    max_pages: usize,
}

impl<'a> ArchiveJob<'a> {
    pub fn new(
        config: JobConfiguration,
        inspector: &'a dyn DocumentInspector,
        fetcher: &'a dyn ResourceFetcher,
        status: &'a dyn StatusSink,
        sink: &'a mut dyn ArchiveSink,
    ) -> Self {
        Self {
            config,
            inspector,
            fetcher,
            status,
            sink,
            cancel: CancellationToken::new(),
            icon_heuristics: IconHeuristics::default(),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// External cancellation handle. Cancellation takes effect at the next
    /// suspend point; already-retrieved content is discarded.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_icon_heuristics(mut self, heuristics: IconHeuristics) -> Self {
        self.icon_heuristics = heuristics;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub async fn run(mut self) -> Result<JobReport, JobError> {
        match self.execute().await {
            Ok(report) => Ok(report),
            Err(err) => {
                pack_warn!("Capture failed: {err}");
                self.status
                    .emit(StatusEvent::failed("Capture failed", err.to_string()));
                Err(err)
            }
        }
    }

    async fn execute(&mut self) -> Result<JobReport, JobError> {
        let base = self.inspector.base_url().clone();
        let policy = if self.config.preserve_origin_structure {
            PathPolicy::Preserve
        } else {
            PathPolicy::Flat
        };
        let mut progress = ProgressState::for_config(&self.config);
        let mut assigner = PathAssigner::new(policy);
        let mut registry: HashSet<String> = HashSet::new();
        let mut resources: Vec<FetchedResource> = Vec::new();

        pack_info!("Starting capture of {base}");
        self.emit_phase("Starting capture", &progress);

        // Secondary pages are fetched up front so every page path exists
        // before any markup is rewritten.
        let mut pages: Vec<CapturedPage> = Vec::new();
        if self.config.capture_markup && self.config.multi_page {
            self.emit_phase("Crawling linked pages", &progress);
            let (crawled, warnings) =
                crawl_pages(self.inspector, self.fetcher, &self.cancel, self.max_pages).await?;
            for warning in warnings {
                self.soft_error(&mut progress, warning);
            }
            pages = crawled;
            progress.add_weight(CATEGORY_SHARE);
        }

        if self.config.capture_styles {
            self.emit_phase("Capturing CSS", &progress);
            let discovered = discover::discover_stylesheets(self.inspector);
            let refs = self.register(discovered, &mut registry, &mut progress);
            self.retrieve_category(refs, CATEGORY_SHARE, &mut progress, &mut resources)
                .await?;
        }

        if self.config.capture_scripts {
            self.emit_phase("Capturing JavaScript", &progress);
            let discovered = discover::discover_scripts(self.inspector);
            let refs = self.register(discovered, &mut registry, &mut progress);
            self.retrieve_category(refs, CATEGORY_SHARE, &mut progress, &mut resources)
                .await?;
        }

        if self.config.capture_images {
            self.emit_phase("Capturing images", &progress);
            let discovered = discover::discover_images(self.inspector);
            let refs = self.register(discovered, &mut registry, &mut progress);
            self.retrieve_category(refs, CATEGORY_SHARE, &mut progress, &mut resources)
                .await?;
        }

        if self.config.capture_fonts {
            self.emit_phase("Capturing fonts", &progress);
            let sheets = self.stylesheet_texts(&base, &resources, &mut progress).await?;
            let discovered = discover::discover_fonts(&sheets);
            let refs = self.register(discovered, &mut registry, &mut progress);
            self.retrieve_category(refs, CATEGORY_SHARE, &mut progress, &mut resources)
                .await?;
        }

        if self.config.capture_video {
            self.emit_phase("Capturing video", &progress);
            let discovered = discover::discover_media(self.inspector, ResourceKind::Video);
            let refs = self.register(discovered, &mut registry, &mut progress);
            self.retrieve_category(refs, CATEGORY_SHARE, &mut progress, &mut resources)
                .await?;
        }

        if self.config.capture_audio {
            self.emit_phase("Capturing audio", &progress);
            let discovered = discover::discover_media(self.inspector, ResourceKind::Audio);
            let refs = self.register(discovered, &mut registry, &mut progress);
            self.retrieve_category(refs, CATEGORY_SHARE, &mut progress, &mut resources)
                .await?;
        }

        // Background images and icons ride under the image toggle and carry
        // no weight of their own.
        if self.config.capture_images {
            self.emit_phase("Capturing background images", &progress);
            let discovered = discover::discover_background_images(self.inspector);
            let refs = self.register(discovered, &mut registry, &mut progress);
            self.retrieve_category(refs, 0.0, &mut progress, &mut resources)
                .await?;

            self.emit_phase("Capturing icons", &progress);
            let discovered = discover::discover_icons(self.inspector, &self.icon_heuristics);
            let refs = self.register(discovered, &mut registry, &mut progress);
            self.retrieve_category(refs, 0.0, &mut progress, &mut resources)
                .await?;
        }

        self.check_cancel()?;
        self.emit_phase("Generating archive", &progress);

        // Path assignment happens in one place, after all retrieval, so
        // collision suffixes are deterministic for a given discovery order.
        let mut map = PathMap::default();
        let manifest_path = assigner.reserve("manifest.json".to_string());
        let active_page_path = if self.config.capture_markup {
            let path = assigner.reserve("index.html".to_string());
            map.insert_page(&base, &path);
            Some(path)
        } else {
            None
        };
        let pages: Vec<(CapturedPage, String)> = pages
            .into_iter()
            .map(|page| {
                let path = assigner.assign_page(&page.url);
                map.insert_page(&page.url, &path);
                (page, path)
            })
            .collect();

        let mut packed: Vec<(String, ResourceKind, Payload, Option<Url>)> = Vec::new();
        let mut failed_urls: Vec<String> = Vec::new();
        for resource in &resources {
            match resource.payload() {
                Some(payload) => {
                    let path = match &resource.reference.location {
                        RefLocation::Remote(url) => {
                            let path = assigner.assign(resource.reference.kind, url);
                            map.insert_resource(url, &path);
                            path
                        }
                        RefLocation::Inline { .. } => {
                            let path = assigner.assign_inline(resource.reference.kind);
                            map.mark_local(&path);
                            path
                        }
                    };
                    packed.push((
                        path,
                        resource.reference.kind,
                        payload.clone(),
                        resource.reference.url().cloned(),
                    ));
                }
                None => {
                    if let Some(url) = resource.reference.url() {
                        failed_urls.push(url.to_string());
                    }
                }
            }
        }

        let mut entries: Vec<String> = Vec::new();
        let rewriter = Rewriter::new(&map, &self.config, policy);
        if let Some(path) = &active_page_path {
            let html = rewriter.rewrite_markup(&self.inspector.serialize(), &base, path);
            self.sink.put(path, &Payload::Text(html))?;
            entries.push(path.clone());
        }
        for (page, path) in &pages {
            let html = rewriter.rewrite_markup(&page.html, &page.url, path);
            self.sink.put(path, &Payload::Text(html))?;
            entries.push(path.clone());
        }
        for (path, kind, payload, origin) in packed {
            let content = match (kind, payload) {
                (ResourceKind::Stylesheet, Payload::Text(css)) => {
                    let css_base = origin.unwrap_or_else(|| base.clone());
                    Payload::Text(rewriter.rewrite_css(&css, &css_base, &path))
                }
                (_, payload) => payload,
            };
            self.sink.put(&path, &content)?;
            entries.push(path);
        }

        let generated_at = Utc::now();
        let manifest = build_manifest(&base, &entries, &failed_urls, generated_at);
        self.sink.put(&manifest_path, &Payload::Text(manifest))?;
        entries.push(manifest_path);

        let bytes = self.sink.finish()?;
        progress.complete_archive();

        let suggested_name = match self.config.archive_name.clone() {
            Some(name) if name.ends_with(".zip") => name,
            Some(name) => format!("{name}.zip"),
            None => suggested_archive_name(&base, generated_at),
        };
        pack_info!(
            "Capture of {base} complete: {} entries, {} bytes",
            entries.len(),
            bytes.len()
        );
        self.status.emit(StatusEvent::finished("Archive ready"));

        Ok(JobReport {
            artifact: ArchiveArtifact {
                bytes,
                suggested_name,
                entry_count: entries.len(),
            },
            errors: progress.errors().to_vec(),
            failed_urls,
        })
    }

    /// Retrieves one category with bounded parallelism. `share` is the
    /// progress weight the whole category is worth; an empty category earns
    /// it immediately.
    async fn retrieve_category(
        &self,
        refs: Vec<ResourceReference>,
        share: f64,
        progress: &mut ProgressState,
        out: &mut Vec<FetchedResource>,
    ) -> Result<(), JobError> {
        self.check_cancel()?;
        if refs.is_empty() {
            progress.add_weight(share);
            return Ok(());
        }
        let per_task = share / refs.len() as f64;
        let parallelism = self.config.parallelism.max(1);
        let mut results = stream::iter(
            refs.into_iter()
                .map(|reference| self.retrieve_one(reference)),
        )
        .buffer_unordered(parallelism);
        while let Some(fetched) = results.next().await {
            self.check_cancel()?;
            progress.add_weight(per_task);
            if let FetchOutcome::Failed { reason } = &fetched.outcome {
                self.resource_failure(progress, fetched.reference.url(), reason);
            }
            out.push(fetched);
        }
        Ok(())
    }

    async fn retrieve_one(&self, reference: ResourceReference) -> FetchedResource {
        let outcome = match &reference.location {
            RefLocation::Inline { body } => FetchOutcome::Retrieved {
                payload: Payload::Text(body.clone()),
                fetched_at: Utc::now(),
            },
            RefLocation::Remote(url) => match self.fetcher.retrieve(url).await {
                Ok(retrieved) => {
                    if reference.kind.is_text() {
                        match decode_text(&retrieved.bytes, retrieved.content_type.as_deref()) {
                            Ok(decoded) => FetchOutcome::Retrieved {
                                payload: Payload::Text(decoded.text),
                                fetched_at: Utc::now(),
                            },
                            Err(err) => FetchOutcome::Failed {
                                reason: format!(
                                    "Failed to decode {} from {url}: {err}",
                                    reference.kind
                                ),
                            },
                        }
                    } else {
                        FetchOutcome::Retrieved {
                            payload: Payload::Binary(retrieved.bytes),
                            fetched_at: Utc::now(),
                        }
                    }
                }
                Err(err) => FetchOutcome::Failed {
                    reason: format!("Failed to capture {} from {url}: {err}", reference.kind),
                },
            },
        };
        FetchedResource { reference, outcome }
    }

    /// Deduplicates against every earlier category so a URL is retrieved at
    /// most once per job, and surfaces discovery warnings.
    fn register(
        &self,
        discovered: Discovered,
        registry: &mut HashSet<String>,
        progress: &mut ProgressState,
    ) -> Vec<ResourceReference> {
        for warning in discovered.warnings {
            self.soft_error(progress, warning);
        }
        discovered
            .references
            .into_iter()
            .filter(|reference| match reference.url() {
                Some(url) => registry.insert(url.to_string()),
                None => true,
            })
            .collect()
    }

    /// All stylesheet texts available for font scanning, each paired with the
    /// URL its relative references resolve against. Inline sheets resolve
    /// against the page itself. When styles are not being captured, external
    /// sheets are still fetched for the scan; their bodies are read and
    /// discarded, never archived.
    async fn stylesheet_texts(
        &self,
        base: &Url,
        resources: &[FetchedResource],
        progress: &mut ProgressState,
    ) -> Result<Vec<(Url, String)>, JobError> {
        let mut sheets: Vec<(Url, String)> = Vec::new();
        for resource in resources {
            if resource.reference.kind != ResourceKind::Stylesheet {
                continue;
            }
            let Some(Payload::Text(css)) = resource.payload() else {
                continue;
            };
            let sheet_url = match &resource.reference.location {
                RefLocation::Remote(url) => url.clone(),
                RefLocation::Inline { .. } => base.clone(),
            };
            sheets.push((sheet_url, css.clone()));
        }
        if !self.config.capture_styles {
            let discovered = discover::discover_stylesheets(self.inspector);
            for warning in discovered.warnings {
                self.soft_error(progress, warning);
            }
            for reference in discovered.references {
                self.check_cancel()?;
                match reference.location {
                    RefLocation::Inline { body } => sheets.push((base.clone(), body)),
                    RefLocation::Remote(url) => match self.fetcher.retrieve(&url).await {
                        Ok(retrieved) => {
                            match decode_text(&retrieved.bytes, retrieved.content_type.as_deref()) {
                                Ok(decoded) => sheets.push((url, decoded.text)),
                                Err(err) => self.soft_error(
                                    progress,
                                    format!("Failed to decode stylesheet {url}: {err}"),
                                ),
                            }
                        }
                        Err(err) => self.resource_failure(
                            progress,
                            Some(&url),
                            &format!("Failed to scan stylesheet {url} for fonts: {err}"),
                        ),
                    },
                }
            }
        }
        Ok(sheets)
    }

    fn emit_phase(&self, message: &str, progress: &ProgressState) {
        pack_debug!("{message} ({}%)", progress.percent());
        self.status
            .emit(StatusEvent::phase(message, progress.percent()));
    }

    /// A recoverable problem: recorded, reported, never fatal.
    fn soft_error(&self, progress: &mut ProgressState, message: impl Into<String>) {
        let message = message.into();
        pack_warn!("{message}");
        progress.record_error(message.clone());
        self.status.emit(StatusEvent::warning(message));
    }

    /// A failed resource retrieval. A tolerated cross-origin failure still
    /// surfaces as a warning event; with tolerance off it is only logged.
    fn resource_failure(&self, progress: &mut ProgressState, url: Option<&Url>, reason: &str) {
        let cross_origin = url
            .map(|url| url.origin() != self.inspector.base_url().origin())
            .unwrap_or(false);
        if cross_origin && !self.config.tolerate_cross_origin_failures {
            pack_debug!("{reason}");
            return;
        }
        self.soft_error(progress, reason);
    }

    fn check_cancel(&self) -> Result<(), JobError> {
        if self.cancel.is_cancelled() {
            Err(JobError::Cancelled)
        } else {
            Ok(())
        }
    }
}

fn build_manifest(
    base: &Url,
    entries: &[String],
    failed_urls: &[String],
    generated_at: DateTime<Utc>,
) -> String {
    json!({
        "generator": "pagepack",
        "source": base.as_str(),
        "generated_utc": generated_at.to_rfc3339(),
        "entry_count": entries.len(),
        "entries": entries,
        "failed_urls": failed_urls,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn manifest_lists_entries_and_failures() {
        let base = Url::parse("https://example.com/").unwrap();
        let entries = vec!["index.html".to_string(), "css/site.css".to_string()];
        let failed = vec!["https://cdn.example.com/app.js".to_string()];
        let generated_at = Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap();
        let manifest = build_manifest(&base, &entries, &failed, generated_at);
        let parsed: serde_json::Value = serde_json::from_str(&manifest).unwrap();
        assert_eq!(parsed["entry_count"], 2);
        assert_eq!(parsed["entries"][1], "css/site.css");
        assert_eq!(parsed["failed_urls"][0], "https://cdn.example.com/app.js");
        assert_eq!(parsed["source"], "https://example.com/");
    }
}
