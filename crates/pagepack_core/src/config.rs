use crate::ResourceKind;

/// Capture options for one archive job. Read-only once the job starts.
///
/// Background images and icons are gated by `capture_images`; internal pages
/// are gated by `multi_page`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfiguration {
    pub capture_markup: bool,
    pub capture_styles: bool,
    pub capture_scripts: bool,
    pub capture_images: bool,
    pub capture_fonts: bool,
    pub capture_video: bool,
    pub capture_audio: bool,
    /// Surface cross-origin fetch failures as warning status events while the
    /// capture continues. When off they are demoted to debug logs.
    pub tolerate_cross_origin_failures: bool,
    /// Mirror origin path structure inside the archive instead of bucketing
    /// by resource kind.
    pub preserve_origin_structure: bool,
    /// Crawl and archive same-origin pages reachable from the start page.
    pub multi_page: bool,
    /// Upper bound on in-flight retrievals per category.
    pub parallelism: usize,
    /// Archive name override; a host-and-timestamp name is derived when unset.
    pub archive_name: Option<String>,
}

impl Default for JobConfiguration {
    fn default() -> Self {
        Self {
            capture_markup: true,
            capture_styles: true,
            capture_scripts: true,
            capture_images: true,
            capture_fonts: true,
            capture_video: true,
            capture_audio: true,
            tolerate_cross_origin_failures: true,
            preserve_origin_structure: false,
            multi_page: false,
            parallelism: 4,
            archive_name: None,
        }
    }
}

impl JobConfiguration {
    /// Whether discovery and retrieval run for the given kind.
    pub fn enabled(&self, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Markup => self.capture_markup,
            ResourceKind::Stylesheet => self.capture_styles,
            ResourceKind::Script => self.capture_scripts,
            ResourceKind::Image | ResourceKind::BackgroundImage | ResourceKind::Icon => {
                self.capture_images
            }
            ResourceKind::Font => self.capture_fonts,
            ResourceKind::Video => self.capture_video,
            ResourceKind::Audio => self.capture_audio,
            ResourceKind::InternalPage => self.multi_page,
        }
    }
}
