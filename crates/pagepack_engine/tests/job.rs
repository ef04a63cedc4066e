use std::collections::HashMap;
use std::io::Cursor;
use std::io::Read;
use std::sync::Mutex;

use async_trait::async_trait;
use pagepack_core::JobConfiguration;
use pagepack_engine::{
    ArchiveJob, FailureKind, FetchError, JobError, ParsedDocument, ResourceFetcher, Retrieved,
    StatusEvent, StatusSink, ZipSink,
};
use pagepack_logging::initialize_for_tests;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Serves canned responses keyed by URL; everything else is a network error.
#[derive(Default)]
struct CannedFetcher {
    responses: HashMap<String, (Vec<u8>, Option<String>)>,
}

impl CannedFetcher {
    fn with(mut self, url: &str, body: &[u8], content_type: &str) -> Self {
        self.responses.insert(
            url.to_string(),
            (body.to_vec(), Some(content_type.to_string())),
        );
        self
    }
}

#[async_trait]
impl ResourceFetcher for CannedFetcher {
    async fn retrieve(&self, url: &Url) -> Result<Retrieved, FetchError> {
        match self.responses.get(url.as_str()) {
            Some((bytes, content_type)) => Ok(Retrieved {
                bytes: bytes.clone(),
                content_type: content_type.clone(),
                final_url: url.to_string(),
            }),
            None => Err(FetchError {
                kind: FailureKind::Network,
                message: format!("no route to {url}"),
            }),
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<StatusEvent>>,
}

impl RecordingSink {
    fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl StatusSink for RecordingSink {
    fn emit(&self, event: StatusEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn entry_names(bytes: Vec<u8>) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

fn entry_text(bytes: &[u8], name: &str) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut text = String::new();
    entry.read_to_string(&mut text).unwrap();
    text
}

const PAGE: &str = concat!(
    "<html><head>",
    "<link rel=\"stylesheet\" href=\"/css/site.css\">",
    "<script src=\"/js/app.js\"></script>",
    "<script>console.log('a');</script>",
    "<script>console.log('b');</script>",
    "</head><body>",
    "<img src=\"/img/logo.png\">",
    "<a href=\"/about\">About</a>",
    "</body></html>",
);

fn single_page_config() -> JobConfiguration {
    JobConfiguration {
        multi_page: false,
        capture_fonts: false,
        capture_video: false,
        capture_audio: false,
        ..JobConfiguration::default()
    }
}

#[tokio::test]
async fn captures_page_with_resources() {
    initialize_for_tests();
    let base = Url::parse("https://example.com/").unwrap();
    let document = ParsedDocument::parse(PAGE, base);
    let fetcher = CannedFetcher::default()
        .with(
            "https://example.com/css/site.css",
            b".hero { background: url('/img/bg.png'); }",
            "text/css",
        )
        .with(
            "https://example.com/js/app.js",
            b"console.log('app');",
            "text/javascript",
        )
        .with("https://example.com/img/logo.png", &[0x89, 0x50], "image/png")
        .with("https://example.com/img/bg.png", &[0x89, 0x50], "image/png");
    let status = RecordingSink::default();
    let mut sink = ZipSink::new();

    let report = ArchiveJob::new(
        single_page_config(),
        &document,
        &fetcher,
        &status,
        &mut sink,
    )
    .run()
    .await
    .unwrap();

    let names = entry_names(report.artifact.bytes.clone());
    assert!(names.contains(&"index.html".to_string()));
    assert!(names.contains(&"css/site.css".to_string()));
    assert!(names.contains(&"js/app.js".to_string()));
    assert!(names.contains(&"images/logo.png".to_string()));
    assert!(names.contains(&"manifest.json".to_string()));
    // Two inline scripts become two distinct entries.
    assert!(names.contains(&"js/inline-1.js".to_string()));
    assert!(names.contains(&"js/inline-2.js".to_string()));

    let index = entry_text(&report.artifact.bytes, "index.html");
    assert!(index.contains("href=\"css/site.css\""));
    assert!(index.contains("src=\"images/logo.png\""));
    assert!(index.contains("href=\"about.html\""));

    assert!(report.errors.is_empty());
    assert!(report.failed_urls.is_empty());
    assert!(report.artifact.suggested_name.ends_with(".zip"));

    let events = status.events();
    let last = events.last().unwrap();
    assert!(last.done);
    assert_eq!(last.progress_percent, Some(100));
}

#[tokio::test]
async fn css_entries_absolutize_references_left_behind() {
    initialize_for_tests();
    let base = Url::parse("https://example.com/").unwrap();
    let document = ParsedDocument::parse(PAGE, base);
    let fetcher = CannedFetcher::default().with(
        "https://example.com/css/site.css",
        b".hero { background: url('../img/bg.png'); }",
        "text/css",
    );
    let status = RecordingSink::default();
    let mut sink = ZipSink::new();

    let report = ArchiveJob::new(
        single_page_config(),
        &document,
        &fetcher,
        &status,
        &mut sink,
    )
    .run()
    .await
    .unwrap();

    // The sheet's relative reference would dangle inside the archive, so it
    // is resolved back against the sheet's own origin.
    let css = entry_text(&report.artifact.bytes, "css/site.css");
    assert_eq!(css, ".hero { background: url(\"https://example.com/img/bg.png\"); }");
}

#[tokio::test]
async fn failed_fetches_are_tolerated_and_absolutized() {
    initialize_for_tests();
    let base = Url::parse("https://example.com/").unwrap();
    let document = ParsedDocument::parse(PAGE, base);
    // Only the stylesheet resolves; everything else fails.
    let fetcher = CannedFetcher::default().with(
        "https://example.com/css/site.css",
        b"body { margin: 0; }",
        "text/css",
    );
    let status = RecordingSink::default();
    let mut sink = ZipSink::new();

    let report = ArchiveJob::new(
        single_page_config(),
        &document,
        &fetcher,
        &status,
        &mut sink,
    )
    .run()
    .await
    .unwrap();

    assert!(report
        .failed_urls
        .contains(&"https://example.com/img/logo.png".to_string()));
    assert!(!report.errors.is_empty());

    // The page still packs; the missing image points back at its origin.
    let index = entry_text(&report.artifact.bytes, "index.html");
    assert!(index.contains("src=\"https://example.com/img/logo.png\""));

    let last = status.events().last().unwrap().clone();
    assert!(last.done);
    assert!(last.error.is_none());
}

#[tokio::test]
async fn cancellation_aborts_with_a_terminal_event() {
    initialize_for_tests();
    let base = Url::parse("https://example.com/").unwrap();
    let document = ParsedDocument::parse(PAGE, base);
    let fetcher = CannedFetcher::default();
    let status = RecordingSink::default();
    let mut sink = ZipSink::new();
    let token = CancellationToken::new();
    token.cancel();

    let err = ArchiveJob::new(
        single_page_config(),
        &document,
        &fetcher,
        &status,
        &mut sink,
    )
    .with_cancellation(token)
    .run()
    .await
    .unwrap_err();

    assert!(matches!(err, JobError::Cancelled));
    let last = status.events().last().unwrap().clone();
    assert!(last.done);
    assert!(last.error.is_some());
}

#[tokio::test]
async fn multi_page_capture_packs_linked_pages() {
    initialize_for_tests();
    let base = Url::parse("https://example.com/").unwrap();
    let document = ParsedDocument::parse(PAGE, base);
    let about = concat!(
        "<html><body>",
        "<a href=\"/\">Home</a>",
        "</body></html>",
    );
    let fetcher = CannedFetcher::default()
        .with("https://example.com/about", about.as_bytes(), "text/html")
        .with(
            "https://example.com/css/site.css",
            b"body { margin: 0; }",
            "text/css",
        )
        .with(
            "https://example.com/js/app.js",
            b"console.log('app');",
            "text/javascript",
        )
        .with("https://example.com/img/logo.png", &[0x89, 0x50], "image/png");
    let config = JobConfiguration {
        multi_page: true,
        capture_fonts: false,
        capture_video: false,
        capture_audio: false,
        ..JobConfiguration::default()
    };
    let status = RecordingSink::default();
    let mut sink = ZipSink::new();

    let report = ArchiveJob::new(config, &document, &fetcher, &status, &mut sink)
        .run()
        .await
        .unwrap();

    let names = entry_names(report.artifact.bytes.clone());
    assert!(names.contains(&"index.html".to_string()));
    assert!(names.contains(&"about.html".to_string()));

    // Pages reference each other by their archive names.
    let about_html = entry_text(&report.artifact.bytes, "about.html");
    assert!(about_html.contains("href=\"index.html\""));
    let index = entry_text(&report.artifact.bytes, "index.html");
    assert!(index.contains("href=\"about.html\""));
}

#[tokio::test]
async fn fonts_are_captured_even_when_styles_are_skipped() {
    initialize_for_tests();
    let html = concat!(
        "<html><head>",
        "<link rel=\"stylesheet\" href=\"/css/fonts.css\">",
        "</head><body></body></html>",
    );
    let base = Url::parse("https://example.com/").unwrap();
    let document = ParsedDocument::parse(html, base);
    let fetcher = CannedFetcher::default()
        .with(
            "https://example.com/css/fonts.css",
            b"@font-face { font-family: 'A'; src: url('/fonts/a.woff2') format('woff2'); }",
            "text/css",
        )
        .with(
            "https://example.com/fonts/a.woff2",
            &[0x77, 0x4F, 0x46, 0x32],
            "font/woff2",
        );
    let config = JobConfiguration {
        capture_styles: false,
        capture_scripts: false,
        capture_images: false,
        capture_video: false,
        capture_audio: false,
        multi_page: false,
        ..JobConfiguration::default()
    };
    let status = RecordingSink::default();
    let mut sink = ZipSink::new();

    let report = ArchiveJob::new(config, &document, &fetcher, &status, &mut sink)
        .run()
        .await
        .unwrap();

    // The sheet is fetched only to scan its @font-face rules; the font packs,
    // the sheet itself does not.
    let names = entry_names(report.artifact.bytes.clone());
    assert!(names.contains(&"fonts/a.woff2".to_string()));
    assert!(!names.iter().any(|name| name.ends_with(".css")));
    assert!(report.errors.is_empty());
}

#[tokio::test]
async fn tolerated_cross_origin_failures_surface_as_warnings() {
    initialize_for_tests();
    let html = "<img src=\"https://cdn.example.net/pic.png\">";
    let base = Url::parse("https://example.com/").unwrap();
    let document = ParsedDocument::parse(html, base);
    let fetcher = CannedFetcher::default();
    let config = JobConfiguration {
        capture_styles: false,
        capture_scripts: false,
        capture_fonts: false,
        capture_video: false,
        capture_audio: false,
        multi_page: false,
        ..JobConfiguration::default()
    };
    let status = RecordingSink::default();
    let mut sink = ZipSink::new();

    let report = ArchiveJob::new(config, &document, &fetcher, &status, &mut sink)
        .run()
        .await
        .unwrap();

    assert!(report
        .failed_urls
        .contains(&"https://cdn.example.net/pic.png".to_string()));
    assert!(report
        .errors
        .iter()
        .any(|error| error.contains("cdn.example.net")));
    let events = status.events();
    assert!(events.iter().any(|event| !event.done && event.error.is_some()));
}

#[tokio::test]
async fn quiet_cross_origin_failures_are_only_logged() {
    initialize_for_tests();
    let html = "<img src=\"https://cdn.example.net/pic.png\">";
    let base = Url::parse("https://example.com/").unwrap();
    let document = ParsedDocument::parse(html, base);
    let fetcher = CannedFetcher::default();
    let config = JobConfiguration {
        capture_styles: false,
        capture_scripts: false,
        capture_fonts: false,
        capture_video: false,
        capture_audio: false,
        multi_page: false,
        tolerate_cross_origin_failures: false,
        ..JobConfiguration::default()
    };
    let status = RecordingSink::default();
    let mut sink = ZipSink::new();

    let report = ArchiveJob::new(config, &document, &fetcher, &status, &mut sink)
        .run()
        .await
        .unwrap();

    // Still recorded as a failed URL, but no warning event and no report
    // error for it.
    assert!(report
        .failed_urls
        .contains(&"https://cdn.example.net/pic.png".to_string()));
    assert!(report.errors.is_empty());
    let events = status.events();
    assert!(!events.iter().any(|event| !event.done && event.error.is_some()));
}

#[tokio::test]
async fn duplicate_references_are_fetched_once() {
    initialize_for_tests();
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher(AtomicUsize);

    #[async_trait]
    impl ResourceFetcher for CountingFetcher {
        async fn retrieve(&self, url: &Url) -> Result<Retrieved, FetchError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Retrieved {
                bytes: vec![0x89, 0x50],
                content_type: Some("image/png".to_string()),
                final_url: url.to_string(),
            })
        }
    }

    let html = concat!(
        "<img src=\"/img/a.png\">",
        "<img src=\"img/a.png\">",
        "<div style=\"background: url('/img/a.png')\"></div>",
    );
    let base = Url::parse("https://example.com/").unwrap();
    let document = ParsedDocument::parse(html, base);
    let fetcher = CountingFetcher(AtomicUsize::new(0));
    let status = RecordingSink::default();
    let mut sink = ZipSink::new();

    let config = JobConfiguration {
        capture_styles: false,
        capture_scripts: false,
        capture_fonts: false,
        capture_video: false,
        capture_audio: false,
        multi_page: false,
        ..JobConfiguration::default()
    };
    ArchiveJob::new(config, &document, &fetcher, &status, &mut sink)
        .run()
        .await
        .unwrap();

    assert_eq!(fetcher.0.load(Ordering::SeqCst), 1);
}
