use std::fmt;

/// Resource category. Drives archive bucketing, progress weighting and the
/// per-category discovery passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Markup,
    Stylesheet,
    Script,
    Image,
    Font,
    Video,
    Audio,
    BackgroundImage,
    Icon,
    InternalPage,
}

impl ResourceKind {
    /// Archive bucket directory for this kind. Pages live at the root.
    pub fn bucket(self) -> &'static str {
        match self {
            ResourceKind::Markup | ResourceKind::InternalPage => "",
            ResourceKind::Stylesheet => "css",
            ResourceKind::Script => "js",
            ResourceKind::Image => "images",
            ResourceKind::Font => "fonts",
            ResourceKind::Video => "videos",
            ResourceKind::Audio => "audio",
            ResourceKind::BackgroundImage => "images/background",
            ResourceKind::Icon => "images/icons",
        }
    }

    /// Extension used for synthetic (inline or fallback) file names.
    pub fn synthetic_extension(self) -> &'static str {
        match self {
            ResourceKind::Markup | ResourceKind::InternalPage => "html",
            ResourceKind::Stylesheet => "css",
            ResourceKind::Script => "js",
            ResourceKind::Image | ResourceKind::BackgroundImage => "png",
            ResourceKind::Icon => "ico",
            ResourceKind::Font => "woff",
            ResourceKind::Video => "mp4",
            ResourceKind::Audio => "mp3",
        }
    }

    /// Text kinds are decoded and rewritten; everything else stays binary.
    pub fn is_text(self) -> bool {
        matches!(
            self,
            ResourceKind::Markup
                | ResourceKind::Stylesheet
                | ResourceKind::Script
                | ResourceKind::InternalPage
        )
    }

    /// Human-readable label for status events and log lines.
    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::Markup => "HTML",
            ResourceKind::Stylesheet => "CSS",
            ResourceKind::Script => "JavaScript",
            ResourceKind::Image => "images",
            ResourceKind::Font => "fonts",
            ResourceKind::Video => "videos",
            ResourceKind::Audio => "audio",
            ResourceKind::BackgroundImage => "background images",
            ResourceKind::Icon => "icons",
            ResourceKind::InternalPage => "pages",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
