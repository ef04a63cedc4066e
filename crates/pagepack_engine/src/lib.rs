//! Capture engine: turns a live page into a self-contained offline archive.
//!
//! The pipeline is harvest, rewrite, pack. Discovery walks a parsed document
//! behind [`DocumentInspector`]; retrieval goes through [`ResourceFetcher`];
//! the finished entries land in an [`ArchiveSink`]. [`ArchiveJob`] wires the
//! stages together and streams progress through a [`StatusSink`].

mod archive;
mod crawl;
mod decode;
mod discover;
mod fetch;
mod inspect;
mod job;
mod rewrite;
mod types;

pub use archive::{suggested_archive_name, ArchiveError, ArchiveSink, ZipSink};
pub use crawl::{crawl_pages, CapturedPage, CrawlState, DEFAULT_MAX_PAGES};
pub use decode::{decode_text, DecodeError, DecodedText};
pub use discover::{
    discover_background_images, discover_fonts, discover_icons, discover_images, discover_media,
    discover_page_links, discover_scripts, discover_stylesheets, looks_like_image_path,
    Discovered, IconHeuristics,
};
pub use fetch::{FetchSettings, ReqwestFetcher, ResourceFetcher, Retrieved};
pub use inspect::{DocumentInspector, ElementSnapshot, ParsedDocument, StylesheetSnapshot};
pub use job::{ArchiveJob, JobError, JobReport};
pub use rewrite::{PathMap, Rewriter};
pub use types::{
    ArchiveArtifact, FailureKind, FetchError, FetchOutcome, FetchedResource, Payload, RefLocation,
    ResourceReference, StatusEvent, StatusSink,
};
