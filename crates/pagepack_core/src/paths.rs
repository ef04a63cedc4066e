use std::collections::{HashMap, HashSet};

use url::Url;

use crate::ResourceKind;

/// Policy for mapping origin URLs to archive paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathPolicy {
    /// Mirror the origin path structure, minus the leading slash.
    Preserve,
    /// Bucket by resource kind using only the final path segment.
    #[default]
    Flat,
}

/// Assigns collision-free virtual paths inside one archive job.
///
/// All fallback naming is centralized here: inline content and malformed
/// paths get deterministic synthetic names, and any two distinct resources
/// are guaranteed distinct paths via a `-N` suffix before the extension.
#[derive(Debug)]
pub struct PathAssigner {
    policy: PathPolicy,
    taken: HashSet<String>,
    counters: HashMap<ResourceKind, u64>,
}

impl PathAssigner {
    pub fn new(policy: PathPolicy) -> Self {
        Self {
            policy,
            taken: HashSet::new(),
            counters: HashMap::new(),
        }
    }

    pub fn policy(&self) -> PathPolicy {
        self.policy
    }

    /// Path for content that has no independent network location.
    pub fn assign_inline(&mut self, kind: ResourceKind) -> String {
        let n = self.next_counter(kind);
        let name = format!("inline-{n}.{}", kind.synthetic_extension());
        self.reserve(bucket_join(kind.bucket(), &name))
    }

    /// Path for a remote resource. Query parameters are dropped; an
    /// unrecoverable path falls back to a synthetic bucketed name.
    pub fn assign(&mut self, kind: ResourceKind, url: &Url) -> String {
        let path = url.path().trim_start_matches('/');
        let candidate = match self.policy {
            PathPolicy::Preserve if !path.is_empty() => path.to_string(),
            _ => match path.rsplit('/').next().filter(|segment| !segment.is_empty()) {
                Some(name) => bucket_join(kind.bucket(), name),
                None => return self.assign_synthetic(kind),
            },
        };
        self.reserve(candidate)
    }

    /// Deterministic fallback name for a resource whose path cannot be
    /// derived from its URL.
    pub fn assign_synthetic(&mut self, kind: ResourceKind) -> String {
        let n = self.next_counter(kind);
        let name = format!("file-{n}.{}", kind.synthetic_extension());
        self.reserve(bucket_join(kind.bucket(), &name))
    }

    /// Archive path for a same-origin page, following the page-naming
    /// convention (`index.html` at the root, `.html` suffix elsewhere).
    pub fn assign_page(&mut self, url: &Url) -> String {
        let candidate = page_file_name(url, self.policy);
        self.reserve(candidate)
    }

    /// Reserve an explicit path (e.g. the active page's `index.html`).
    pub fn reserve(&mut self, candidate: String) -> String {
        if self.taken.insert(candidate.clone()) {
            return candidate;
        }
        let (stem, ext) = split_extension(&candidate);
        let mut n = 2u64;
        loop {
            let alternative = match ext {
                Some(ext) => format!("{stem}-{n}.{ext}"),
                None => format!("{stem}-{n}"),
            };
            if self.taken.insert(alternative.clone()) {
                return alternative;
            }
            n += 1;
        }
    }

    fn next_counter(&mut self, kind: ResourceKind) -> u64 {
        let counter = self.counters.entry(kind).or_insert(0);
        *counter += 1;
        *counter
    }
}

/// Archive-local file name for a same-origin page URL.
///
/// The origin root maps to `index.html`; any other internal path without an
/// extension gets an `.html` suffix. The flat policy keeps only the final
/// path segment.
pub fn page_file_name(url: &Url, policy: PathPolicy) -> String {
    let trimmed = url.path().trim_matches('/');
    if trimmed.is_empty() {
        return "index.html".to_string();
    }
    let path = match policy {
        PathPolicy::Preserve => trimmed.to_string(),
        PathPolicy::Flat => trimmed.rsplit('/').next().unwrap_or(trimmed).to_string(),
    };
    let has_extension = path
        .rsplit('/')
        .next()
        .is_some_and(|segment| segment.contains('.'));
    if has_extension {
        path
    } else {
        format!("{path}.html")
    }
}

/// Relative path from the directory of archive entry `from` to entry `to`.
///
/// Entries reference each other relatively so the archive resolves under
/// `file://` regardless of where it is unpacked.
pub fn relativize(from: &str, to: &str) -> String {
    let from_dir: Vec<&str> = match from.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    let to_parts: Vec<&str> = to.split('/').collect();

    let mut common = 0;
    while common < from_dir.len()
        && common + 1 < to_parts.len()
        && from_dir[common] == to_parts[common]
    {
        common += 1;
    }

    let mut out = String::new();
    for _ in common..from_dir.len() {
        out.push_str("../");
    }
    out.push_str(&to_parts[common..].join("/"));
    out
}

fn bucket_join(bucket: &str, name: &str) -> String {
    if bucket.is_empty() {
        name.to_string()
    } else {
        format!("{bucket}/{name}")
    }
}

fn split_extension(path: &str) -> (&str, Option<&str>) {
    let file_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[file_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let split = file_start + dot;
            (&path[..split], Some(&path[split + 1..]))
        }
        _ => (path, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn preserve_policy_mirrors_origin_path() {
        let mut assigner = PathAssigner::new(PathPolicy::Preserve);
        let path = assigner.assign(
            ResourceKind::BackgroundImage,
            &url("https://example.com/img/a.png"),
        );
        assert_eq!(path, "img/a.png");
    }

    #[test]
    fn flat_policy_buckets_by_kind() {
        let mut assigner = PathAssigner::new(PathPolicy::Flat);
        let path = assigner.assign(
            ResourceKind::Stylesheet,
            &url("https://example.com/assets/deep/site.css?v=3"),
        );
        assert_eq!(path, "css/site.css");
    }

    #[test]
    fn query_parameters_are_stripped() {
        let mut assigner = PathAssigner::new(PathPolicy::Preserve);
        let path = assigner.assign(ResourceKind::Script, &url("https://e.com/js/app.js?x=1&y=2"));
        assert_eq!(path, "js/app.js");
    }

    #[test]
    fn colliding_names_get_deterministic_suffixes() {
        let mut assigner = PathAssigner::new(PathPolicy::Flat);
        let a = assigner.assign(ResourceKind::Image, &url("https://e.com/a/logo.png"));
        let b = assigner.assign(ResourceKind::Image, &url("https://e.com/b/logo.png"));
        let c = assigner.assign(ResourceKind::Image, &url("https://e.com/c/logo.png"));
        assert_eq!(a, "images/logo.png");
        assert_eq!(b, "images/logo-2.png");
        assert_eq!(c, "images/logo-3.png");
    }

    #[test]
    fn inline_entries_never_collide() {
        let mut assigner = PathAssigner::new(PathPolicy::Flat);
        let a = assigner.assign_inline(ResourceKind::Script);
        let b = assigner.assign_inline(ResourceKind::Script);
        assert_eq!(a, "js/inline-1.js");
        assert_eq!(b, "js/inline-2.js");
    }

    #[test]
    fn bare_origin_falls_back_to_synthetic_name() {
        let mut assigner = PathAssigner::new(PathPolicy::Flat);
        let path = assigner.assign(ResourceKind::Icon, &url("https://example.com/"));
        assert_eq!(path, "images/icons/file-1.ico");
    }

    #[test]
    fn page_names_follow_archive_convention() {
        assert_eq!(page_file_name(&url("https://e.com/"), PathPolicy::Flat), "index.html");
        assert_eq!(
            page_file_name(&url("https://e.com/about"), PathPolicy::Flat),
            "about.html"
        );
        assert_eq!(
            page_file_name(&url("https://e.com/docs/intro"), PathPolicy::Flat),
            "intro.html"
        );
        assert_eq!(
            page_file_name(&url("https://e.com/docs/intro"), PathPolicy::Preserve),
            "docs/intro.html"
        );
        assert_eq!(
            page_file_name(&url("https://e.com/page.html"), PathPolicy::Preserve),
            "page.html"
        );
    }

    #[test]
    fn relativize_crosses_directories() {
        assert_eq!(relativize("index.html", "css/site.css"), "css/site.css");
        assert_eq!(relativize("css/site.css", "images/a.png"), "../images/a.png");
        assert_eq!(relativize("css/site.css", "css/x.png"), "x.png");
        assert_eq!(
            relativize("a/b/page.html", "a/img/logo.png"),
            "../img/logo.png"
        );
    }
}
