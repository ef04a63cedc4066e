use std::collections::{HashMap, HashSet};

use ego_tree::NodeId;
use pagepack_core::{
    normalize, page_file_name, relativize, rewrite_urls, JobConfiguration, Normalized,
    PathPolicy, ResourceKind,
};
use scraper::node::{Element, Node};
use scraper::Html;
use url::Url;

use crate::discover::looks_like_image_path;

/// Mapping from absolute origin URLs to archive paths, plus the set of
/// already-local paths so a second rewrite pass is a no-op.
#[derive(Debug, Default, Clone)]
pub struct PathMap {
    resources: HashMap<String, String>,
    pages: HashMap<String, String>,
    locals: HashSet<String>,
}

impl PathMap {
    pub fn insert_resource(&mut self, url: &Url, virtual_path: &str) {
        self.resources
            .insert(Self::key(url), virtual_path.to_string());
        self.locals.insert(virtual_path.to_string());
    }

    pub fn insert_page(&mut self, url: &Url, virtual_path: &str) {
        self.pages.insert(Self::key(url), virtual_path.to_string());
        self.locals.insert(virtual_path.to_string());
    }

    /// Record a path with no origin URL (synthetic inline entries).
    pub fn mark_local(&mut self, virtual_path: &str) {
        self.locals.insert(virtual_path.to_string());
    }

    pub fn resource_path(&self, url: &Url) -> Option<&str> {
        self.resources.get(&Self::key(url)).map(String::as_str)
    }

    pub fn page_path(&self, url: &Url) -> Option<&str> {
        self.pages.get(&Self::key(url)).map(String::as_str)
    }

    /// True when `value` already names an archive path (possibly relative to
    /// a nested entry), meaning it must not be rewritten again.
    pub fn is_local(&self, value: &str) -> bool {
        let stripped = value.trim().trim_start_matches("../");
        self.locals.contains(stripped)
    }

    fn key(url: &Url) -> String {
        let mut key = url.clone();
        key.set_fragment(None);
        key.to_string()
    }
}

/// Rewrites markup and CSS references to the paths they occupy inside the
/// archive.
///
/// Markup is rewritten on a parsed document tree; CSS through textual
/// `url(...)` substitution. Successfully archived resources become relative
/// local paths; everything else resolvable becomes its absolute remote URL,
/// so a packed entry never contains a dangling local reference. References in
/// disabled categories are left untouched, as are data URIs and values that
/// cannot be resolved. Embedded script content is never executed or altered.
pub struct Rewriter<'a> {
    map: &'a PathMap,
    config: &'a JobConfiguration,
    policy: PathPolicy,
    /// Whether unarchived CSS references are absolutized; off when neither
    /// images nor fonts were captured.
    absolutize_css: bool,
}

impl<'a> Rewriter<'a> {
    pub fn new(map: &'a PathMap, config: &'a JobConfiguration, policy: PathPolicy) -> Self {
        Self {
            map,
            config,
            policy,
            absolutize_css: config.capture_images || config.capture_fonts,
        }
    }

    /// Rewrites every known resource- or page-carrying attribute of `html`,
    /// the inline `style` attributes, and `<style>` bodies. `entry_path` is
    /// the archive path this markup will occupy; targets are relativized
    /// against its directory.
    pub fn rewrite_markup(&self, html: &str, base: &Url, entry_path: &str) -> String {
        let mut doc = Html::parse_document(html);

        // Read pass: collect node ids plus the owning-tag context needed
        // while mutating.
        let mut element_nodes: Vec<(NodeId, Option<String>)> = Vec::new();
        let mut style_text_nodes: Vec<NodeId> = Vec::new();
        for node in doc.tree.nodes() {
            match node.value() {
                Node::Element(_) => {
                    let parent_tag = node.parent().and_then(|parent| match parent.value() {
                        Node::Element(element) => {
                            Some(element.name.local.as_ref().to_ascii_lowercase())
                        }
                        _ => None,
                    });
                    element_nodes.push((node.id(), parent_tag));
                }
                Node::Text(_) => {
                    let in_style = node.parent().is_some_and(|parent| match parent.value() {
                        Node::Element(element) => {
                            element.name.local.as_ref().eq_ignore_ascii_case("style")
                        }
                        _ => false,
                    });
                    if in_style {
                        style_text_nodes.push(node.id());
                    }
                }
                _ => {}
            }
        }

        for (id, parent_tag) in element_nodes {
            let Some(mut node) = doc.tree.get_mut(id) else { continue };
            if let Node::Element(element) = node.value() {
                self.rewrite_element(element, parent_tag.as_deref(), base, entry_path);
            }
        }

        for id in style_text_nodes {
            let Some(mut node) = doc.tree.get_mut(id) else { continue };
            if let Node::Text(text) = node.value() {
                let rewritten = self.rewrite_css(&text.text, base, entry_path);
                if &*text.text != rewritten.as_str() {
                    text.text = rewritten.as_str().into();
                }
            }
        }

        doc.html()
    }

    /// Rewrites every `url(...)` token in a CSS text found at `base`.
    pub fn rewrite_css(&self, css: &str, base: &Url, entry_path: &str) -> String {
        rewrite_urls(css, |raw| {
            if raw.starts_with("data:") {
                return None;
            }
            match normalize(raw, base) {
                Ok(Normalized::Absolute(mut url)) => {
                    url.set_fragment(None);
                    match self.map.resource_path(&url) {
                        Some(target) => Some(relativize(entry_path, target)),
                        // Unmapped but textually an archive path: already
                        // rewritten by an earlier pass.
                        None if self.map.is_local(raw) => None,
                        None => self.absolutize_css.then(|| url.to_string()),
                    }
                }
                _ => None,
            }
        })
    }

    fn rewrite_element(
        &self,
        element: &mut Element,
        parent_tag: Option<&str>,
        base: &Url,
        entry_path: &str,
    ) {
        let tag = element.name.local.as_ref().to_ascii_lowercase();
        let rel = element
            .attr("rel")
            .map(|value| value.to_ascii_lowercase())
            .unwrap_or_default();

        for (name, value) in element.attrs.iter_mut() {
            let attr = name.local.as_ref().to_ascii_lowercase();
            let current = value.to_string();
            let replacement = match (tag.as_str(), attr.as_str()) {
                ("link", "href") if rel.contains("stylesheet") => {
                    self.resource_target(ResourceKind::Stylesheet, &current, base, entry_path)
                }
                ("link", "href") if rel.contains("icon") => {
                    self.resource_target(ResourceKind::Icon, &current, base, entry_path)
                }
                ("script", "src") => {
                    self.resource_target(ResourceKind::Script, &current, base, entry_path)
                }
                ("img", "src") => {
                    self.resource_target(ResourceKind::Image, &current, base, entry_path)
                }
                ("video", "poster") => {
                    self.resource_target(ResourceKind::Image, &current, base, entry_path)
                }
                ("video", "src") => {
                    self.resource_target(ResourceKind::Video, &current, base, entry_path)
                }
                ("audio", "src") => {
                    self.resource_target(ResourceKind::Audio, &current, base, entry_path)
                }
                ("source", "src") => {
                    let kind = match parent_tag {
                        Some("audio") => ResourceKind::Audio,
                        _ => ResourceKind::Video,
                    };
                    self.resource_target(kind, &current, base, entry_path)
                }
                ("use", "href") => self.symbol_target(&current, base, entry_path),
                ("a", "href") => self.page_target(&current, base, entry_path),
                (_, "style") => {
                    let rewritten = self.rewrite_css(&current, base, entry_path);
                    (rewritten != current).then_some(rewritten)
                }
                _ if attr.starts_with("data-") && looks_like_image_path(&current) => {
                    self.resource_target(ResourceKind::BackgroundImage, &current, base, entry_path)
                }
                _ => None,
            };
            if let Some(new_value) = replacement {
                if new_value != current {
                    *value = new_value.as_str().into();
                }
            }
        }
    }

    /// Local archive target for a resource reference, or its absolute remote
    /// URL when the resource was not archived. `None` leaves the attribute
    /// untouched (disabled category, data URI, unresolvable, already local).
    fn resource_target(
        &self,
        kind: ResourceKind,
        raw: &str,
        base: &Url,
        entry_path: &str,
    ) -> Option<String> {
        if !self.config.enabled(kind) {
            return None;
        }
        let trimmed = raw.trim();
        match normalize(trimmed, base) {
            Ok(Normalized::Absolute(mut url)) => {
                url.set_fragment(None);
                match self.map.resource_path(&url) {
                    // A mapped resolution wins over a literal that happens to
                    // spell an archive path.
                    Some(target) => Some(relativize(entry_path, target)),
                    None if self.map.is_local(trimmed) => None,
                    None => Some(url.to_string()),
                }
            }
            _ => None,
        }
    }

    /// `<use href="sprite.svg#id">`: rewrite the file part, keep the symbol
    /// fragment. Same-document references (`#id` only) stay untouched.
    fn symbol_target(&self, raw: &str, base: &Url, entry_path: &str) -> Option<String> {
        let (file, fragment) = match raw.split_once('#') {
            Some((file, fragment)) => (file, Some(fragment)),
            None => (raw, None),
        };
        if file.trim().is_empty() {
            return None;
        }
        let rewritten = self.resource_target(ResourceKind::Icon, file, base, entry_path)?;
        Some(match fragment {
            Some(fragment) => format!("{rewritten}#{fragment}"),
            None => rewritten,
        })
    }

    /// Same-origin anchors map onto the archive page-naming convention so
    /// navigation keeps working offline. Cross-origin anchors stay untouched.
    fn page_target(&self, raw: &str, base: &Url, entry_path: &str) -> Option<String> {
        let trimmed = raw.trim();
        let Ok(Normalized::Absolute(url)) = normalize(trimmed, base) else {
            return None;
        };
        if url.origin() != base.origin() {
            return None;
        }
        let fragment = url.fragment().map(|fragment| format!("#{fragment}"));
        let mut page = url;
        page.set_fragment(None);
        let path = match self.map.page_path(&page) {
            Some(assigned) => assigned.to_string(),
            None if self.map.is_local(trimmed) => return None,
            None => page_file_name(&page, self.policy),
        };
        let mut target = relativize(entry_path, &path);
        if let Some(fragment) = fragment {
            target.push_str(&fragment);
        }
        Some(target)
    }
}
