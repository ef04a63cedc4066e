use std::collections::HashSet;

use pagepack_core::{css_urls, font_face_sources, normalize, Normalized, ResourceKind};
use pagepack_logging::pack_debug;
use url::Url;

use crate::inspect::{DocumentInspector, ElementSnapshot, StylesheetSnapshot};
use crate::ResourceReference;

/// Style properties whose computed values can carry image references.
const IMAGE_STYLE_PROPERTIES: &[&str] = &[
    "background-image",
    "background",
    "border-image",
    "border-image-source",
    "list-style-image",
];

/// Class-name patterns identifying icon-font/sprite elements.
///
/// A page's visual dependency graph is not fully described by declared
/// attributes; icon conventions hide image references behind class names, so
/// the matching policy is a swappable predicate set.
#[derive(Debug, Clone)]
pub struct IconHeuristics {
    patterns: Vec<String>,
}

impl Default for IconHeuristics {
    fn default() -> Self {
        Self::new(["icon", "sprite", "fa-", "glyphicon", "material-icons"])
    }
}

impl IconHeuristics {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, element: &ElementSnapshot) -> bool {
        element.classes().any(|class| {
            self.patterns
                .iter()
                .any(|pattern| class.to_ascii_lowercase().contains(pattern.as_str()))
        })
    }
}

/// Candidate references for one category, deduplicated, plus soft warnings
/// raised while inspecting (inaccessible stylesheets and the like).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Discovered {
    pub references: Vec<ResourceReference>,
    pub warnings: Vec<String>,
}

struct RefCollector {
    kind: ResourceKind,
    base: Url,
    seen: HashSet<String>,
    out: Discovered,
}

impl RefCollector {
    fn new(kind: ResourceKind, base: &Url) -> Self {
        Self {
            kind,
            base: base.clone(),
            seen: HashSet::new(),
            out: Discovered::default(),
        }
    }

    /// Normalize a raw reference against a base and record it once.
    /// Malformed and `data:` references are skipped, never fatal.
    fn push_raw_against(&mut self, raw: &str, base: &Url) {
        match normalize(raw, base) {
            Ok(Normalized::Absolute(url)) => self.push_url(raw, url),
            Ok(Normalized::Data) | Err(_) => {}
        }
    }

    fn push_raw(&mut self, raw: &str) {
        let base = self.base.clone();
        self.push_raw_against(raw, &base);
    }

    fn push_url(&mut self, raw: &str, mut url: Url) {
        url.set_fragment(None);
        if self.seen.insert(url.to_string()) {
            self.out
                .references
                .push(ResourceReference::remote(self.kind, raw, url));
        }
    }

    fn push_inline(&mut self, body: &str) {
        self.out
            .references
            .push(ResourceReference::inline(self.kind, body));
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.out.warnings.push(message.into());
    }

    fn finish(self) -> Discovered {
        pack_debug!(
            "discovered {} {} reference(s)",
            self.out.references.len(),
            self.kind
        );
        self.out
    }
}

/// Stylesheet origins: external hrefs and inline bodies. Inaccessible sheets
/// produce a soft warning and are skipped.
pub fn discover_stylesheets(inspector: &dyn DocumentInspector) -> Discovered {
    let mut refs = RefCollector::new(ResourceKind::Stylesheet, inspector.base_url());
    for sheet in inspector.stylesheets() {
        match sheet {
            StylesheetSnapshot::External { href } => refs.push_raw(&href),
            StylesheetSnapshot::Inline { body } => refs.push_inline(&body),
            StylesheetSnapshot::Inaccessible { href } => refs.warn(format!(
                "Failed to access stylesheet {}",
                href.as_deref().unwrap_or("(inline)")
            )),
        }
    }
    refs.finish()
}

/// Script sources and inline script bodies.
pub fn discover_scripts(inspector: &dyn DocumentInspector) -> Discovered {
    let mut refs = RefCollector::new(ResourceKind::Script, inspector.base_url());
    for element in inspector.elements() {
        if element.tag != "script" {
            continue;
        }
        if let Some(src) = element.attr("src") {
            refs.push_raw(src);
        } else if let Some(body) = &element.text {
            refs.push_inline(body);
        }
    }
    refs.finish()
}

/// Every image element's resolved source.
pub fn discover_images(inspector: &dyn DocumentInspector) -> Discovered {
    let mut refs = RefCollector::new(ResourceKind::Image, inspector.base_url());
    for element in inspector.elements() {
        if element.tag == "img" {
            if let Some(src) = element.attr("src") {
                refs.push_raw(src);
            }
        }
        // Poster frames render as images even though they hang off media tags.
        if element.tag == "video" {
            if let Some(poster) = element.attr("poster") {
                refs.push_raw(poster);
            }
        }
    }
    refs.finish()
}

/// `@font-face src` references across the given stylesheet texts, each
/// resolved against its own sheet's location.
pub fn discover_fonts(sheets: &[(Url, String)]) -> Discovered {
    let base = sheets
        .first()
        .map(|(url, _)| url.clone())
        .unwrap_or_else(|| Url::parse("about:blank").expect("about:blank url"));
    let mut refs = RefCollector::new(ResourceKind::Font, &base);
    for (sheet_url, css) in sheets {
        for raw in font_face_sources(css) {
            refs.push_raw_against(raw, sheet_url);
        }
    }
    refs.finish()
}

/// Media sources from `video`/`audio` elements and their nested `source`
/// children, preferring an actively-playing source over a declared one.
pub fn discover_media(inspector: &dyn DocumentInspector, kind: ResourceKind) -> Discovered {
    debug_assert!(matches!(kind, ResourceKind::Video | ResourceKind::Audio));
    let tag = if kind == ResourceKind::Video { "video" } else { "audio" };

    let mut refs = RefCollector::new(kind, inspector.base_url());
    for element in inspector.elements() {
        let owning_tag = if element.tag == "source" {
            element.parent_tag.as_deref().unwrap_or("")
        } else {
            element.tag.as_str()
        };
        if owning_tag != tag {
            continue;
        }
        let source = element
            .current_src
            .as_deref()
            .or_else(|| element.attr("src"));
        if let Some(raw) = source {
            refs.push_raw(raw);
        }
    }
    refs.finish()
}

/// Image references reachable only through style: background and derived
/// image properties, custom-property values, and image-looking `data-*`
/// attributes, inspected for every element in the tree.
pub fn discover_background_images(inspector: &dyn DocumentInspector) -> Discovered {
    let mut refs = RefCollector::new(ResourceKind::BackgroundImage, inspector.base_url());
    for element in inspector.elements() {
        harvest_style_refs(&element, &mut refs);
    }
    refs.finish()
}

/// Explicit icon links plus heuristically detected icon/sprite elements.
pub fn discover_icons(inspector: &dyn DocumentInspector, heuristics: &IconHeuristics) -> Discovered {
    let mut refs = RefCollector::new(ResourceKind::Icon, inspector.base_url());
    for element in inspector.elements() {
        match element.tag.as_str() {
            "link" => {
                let rel = element.attr("rel").unwrap_or("").to_ascii_lowercase();
                if rel.contains("icon") {
                    if let Some(href) = element.attr("href") {
                        refs.push_raw(href);
                    }
                }
            }
            // SVG sprite/symbol usage; the fragment names a symbol inside the
            // sprite file, so only the file part is fetchable.
            "use" => {
                let href = element.attr("href").or_else(|| element.attr("xlink:href"));
                if let Some(raw) = href {
                    let file = raw.split('#').next().unwrap_or("");
                    if !file.is_empty() {
                        refs.push_raw(file);
                    }
                }
            }
            _ => {
                if heuristics.matches(&element) {
                    harvest_style_refs(&element, &mut refs);
                }
            }
        }
    }
    refs.finish()
}

/// Same-origin anchor targets for multi-page capture, deduplicated and with
/// fragments stripped.
pub fn discover_page_links(inspector: &dyn DocumentInspector) -> Vec<Url> {
    let base = inspector.base_url();
    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for element in inspector.elements() {
        if element.tag != "a" {
            continue;
        }
        let Some(href) = element.attr("href") else { continue };
        let Ok(Normalized::Absolute(mut url)) = normalize(href, base) else {
            continue;
        };
        if url.origin() != base.origin() {
            continue;
        }
        url.set_fragment(None);
        if seen.insert(url.to_string()) {
            links.push(url);
        }
    }
    links
}

fn harvest_style_refs(element: &ElementSnapshot, refs: &mut RefCollector) {
    for (property, value) in &element.style {
        let is_image_property = IMAGE_STYLE_PROPERTIES
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(property));
        let is_custom_property = property.starts_with("--") && value.contains("url(");
        if !is_image_property && !is_custom_property {
            continue;
        }
        if value == "none" {
            continue;
        }
        let urls: Vec<String> = css_urls(value).map(str::to_string).collect();
        for raw in urls {
            refs.push_raw(&raw);
        }
    }
    let data_attrs: Vec<String> = element
        .attrs
        .iter()
        .filter(|(name, value)| name.starts_with("data-") && looks_like_image_path(value))
        .map(|(_, value)| value.clone())
        .collect();
    for raw in data_attrs {
        refs.push_raw(&raw);
    }
}

/// Heuristic for `data-*` attribute values that name an image file.
pub fn looks_like_image_path(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.starts_with("data:") {
        return false;
    }
    let without_query = trimmed
        .split(['?', '#'])
        .next()
        .unwrap_or(trimmed);
    let Some((_, extension)) = without_query.rsplit_once('.') else {
        return false;
    };
    matches!(
        extension.to_ascii_lowercase().as_str(),
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "ico" | "avif" | "bmp"
    )
}
