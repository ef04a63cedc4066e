use thiserror::Error;
use url::Url;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("unresolvable reference: {0}")]
    InvalidReference(String),
}

/// Outcome of normalizing a raw reference against a base document location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// Fully resolved absolute URL.
    Absolute(Url),
    /// `data:` payload; never fetched and never rewritten.
    Data,
}

/// Converts a raw reference (relative, root-relative, protocol-relative or
/// absolute) into an absolute URL anchored at `base`.
///
/// Fragment-only, `javascript:` and `mailto:` references carry no fetchable
/// resource and are reported as invalid; callers skip them.
pub fn normalize(reference: &str, base: &Url) -> Result<Normalized, NormalizeError> {
    let trimmed = reference.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Err(NormalizeError::InvalidReference(reference.to_string()));
    }

    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("data:") {
        return Ok(Normalized::Data);
    }
    if lower.starts_with("javascript:") || lower.starts_with("mailto:") {
        return Err(NormalizeError::InvalidReference(trimmed.to_string()));
    }

    // Protocol-relative: complete with the base scheme.
    if let Some(rest) = trimmed.strip_prefix("//") {
        let completed = format!("{}://{}", base.scheme(), rest);
        return Url::parse(&completed)
            .map(Normalized::Absolute)
            .map_err(|_| NormalizeError::InvalidReference(trimmed.to_string()));
    }

    // Already absolute.
    if let Ok(url) = Url::parse(trimmed) {
        return Ok(Normalized::Absolute(url));
    }

    // Root-relative and plain relative references both resolve through join;
    // a leading slash anchors at the base origin.
    base.join(trimmed)
        .map(Normalized::Absolute)
        .map_err(|_| NormalizeError::InvalidReference(trimmed.to_string()))
}
