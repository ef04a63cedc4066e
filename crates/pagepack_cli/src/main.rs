//! Command-line front end: fetch a page, run a capture job, write the zip.

mod logging;
mod persist;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use pagepack_core::JobConfiguration;
use pagepack_engine::{
    decode_text, ArchiveJob, FetchSettings, ParsedDocument, ReqwestFetcher, ResourceFetcher,
    StatusEvent, StatusSink, ZipSink,
};
use pagepack_logging::{pack_info, pack_warn};
use tokio_util::sync::CancellationToken;
use url::Url;

use logging::LogDestination;

#[derive(Parser, Debug)]
#[command(
    name = "pagepack",
    version,
    about = "Capture a web page into a self-contained zip archive"
)]
struct Cli {
    /// Page to capture.
    url: Url,

    /// Directory the archive is written into.
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Archive file name; derived from the host and a timestamp when omitted.
    #[arg(long)]
    name: Option<String>,

    /// Skip stylesheets.
    #[arg(long)]
    no_styles: bool,

    /// Skip scripts.
    #[arg(long)]
    no_scripts: bool,

    /// Skip images, background images and icons.
    #[arg(long)]
    no_images: bool,

    /// Skip fonts.
    #[arg(long)]
    no_fonts: bool,

    /// Skip video sources.
    #[arg(long)]
    no_video: bool,

    /// Skip audio sources.
    #[arg(long)]
    no_audio: bool,

    /// Keep each resource's origin directory layout instead of type buckets.
    #[arg(long)]
    preserve_structure: bool,

    /// Also capture same-origin pages linked from the start page.
    #[arg(long)]
    multi_page: bool,

    /// Demote cross-origin fetch failures to debug logs instead of reporting
    /// them as warnings.
    #[arg(long)]
    quiet_cross_origin: bool,

    /// Concurrent fetches per resource category.
    #[arg(long, default_value_t = 4)]
    parallelism: usize,

    /// Where log output goes.
    #[arg(long, value_enum, default_value_t = LogDestination::Terminal)]
    log: LogDestination,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn job_configuration(&self) -> JobConfiguration {
        JobConfiguration {
            capture_styles: !self.no_styles,
            capture_scripts: !self.no_scripts,
            capture_images: !self.no_images,
            capture_fonts: !self.no_fonts,
            capture_video: !self.no_video,
            capture_audio: !self.no_audio,
            preserve_origin_structure: self.preserve_structure,
            multi_page: self.multi_page,
            tolerate_cross_origin_failures: !self.quiet_cross_origin,
            parallelism: self.parallelism,
            archive_name: self.name.clone(),
            ..JobConfiguration::default()
        }
    }
}

/// Forwards the job's status stream to the logger.
struct ConsoleStatus;

impl StatusSink for ConsoleStatus {
    fn emit(&self, event: StatusEvent) {
        if let Some(error) = &event.error {
            pack_warn!("{error}");
        }
        if !event.message.is_empty() {
            match event.progress_percent {
                Some(percent) => pack_info!("[{percent:>3}%] {}", event.message),
                None => pack_info!("{}", event.message),
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::initialize(cli.log, cli.verbose);

    let fetcher = ReqwestFetcher::new(FetchSettings::default())
        .map_err(|err| anyhow::anyhow!("failed to build http client: {err}"))?;

    pack_info!("Fetching {}", cli.url);
    let start = fetcher
        .retrieve(&cli.url)
        .await
        .map_err(|err| anyhow::anyhow!("failed to fetch {}: {err}", cli.url))?;
    let decoded = decode_text(&start.bytes, start.content_type.as_deref())
        .context("failed to decode start page")?;
    let document = ParsedDocument::parse(&decoded.text, cli.url.clone());

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                pack_warn!("Interrupt received; cancelling capture");
                cancel.cancel();
            }
        });
    }

    let status = ConsoleStatus;
    let mut sink = ZipSink::new();
    let report = ArchiveJob::new(cli.job_configuration(), &document, &fetcher, &status, &mut sink)
        .with_cancellation(cancel)
        .run()
        .await
        .context("capture failed")?;

    let writer = persist::AtomicFileWriter::new(cli.output.clone());
    let path = writer.write(&report.artifact.suggested_name, &report.artifact.bytes)?;
    pack_info!(
        "Wrote {} ({} entries, {} bytes)",
        path.display(),
        report.artifact.entry_count,
        report.artifact.bytes.len()
    );
    if !report.errors.is_empty() {
        pack_warn!(
            "{} resource problem(s) during capture; see log for details",
            report.errors.len()
        );
    }
    println!("{}", path.display());
    Ok(())
}
