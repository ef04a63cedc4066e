use std::sync::OnceLock;

use regex::{CaptureMatches, Captures, Regex};

fn url_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"url\(\s*['"]?([^'"()]+?)['"]?\s*\)"#).expect("url token regex")
    })
}

fn font_face_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)@font-face\s*\{(.*?)\}").expect("font-face regex"))
}

/// Lazy iterator over the non-data `url(...)` references in a CSS text.
///
/// Handles single-quoted, double-quoted and unquoted forms, and multiple
/// tokens per declaration (multi-layer backgrounds). Restartable: calling
/// [`css_urls`] again on the same text yields the same sequence.
pub struct CssUrls<'a> {
    inner: CaptureMatches<'static, 'a>,
}

/// Scans `css` for `url(...)` tokens, skipping embedded `data:` payloads.
pub fn css_urls(css: &str) -> CssUrls<'_> {
    CssUrls {
        inner: url_token_re().captures_iter(css),
    }
}

impl<'a> Iterator for CssUrls<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        loop {
            let caps = self.inner.next()?;
            let value = caps.get(1)?.as_str().trim();
            if !value.is_empty() && !value.starts_with("data:") {
                return Some(value);
            }
        }
    }
}

/// Collects the distinct `src` references of every `@font-face` rule in `css`,
/// in first-seen order.
pub fn font_face_sources(css: &str) -> Vec<&str> {
    let mut sources = Vec::new();
    for block in font_face_re().captures_iter(css) {
        let Some(body) = block.get(1) else { continue };
        for reference in css_urls(body.as_str()) {
            if !sources.contains(&reference) {
                sources.push(reference);
            }
        }
    }
    sources
}

/// Rewrites every `url(...)` token in `css` through `replace`.
///
/// `replace` receives the trimmed reference and returns the replacement
/// reference, or `None` to keep the token verbatim (data URIs, unresolvable
/// values). Replaced tokens are emitted double-quoted.
pub fn rewrite_urls<F>(css: &str, mut replace: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    url_token_re()
        .replace_all(css, |caps: &Captures<'_>| {
            let raw = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
            match replace(raw) {
                Some(new_ref) => format!("url(\"{new_ref}\")"),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_all_quote_forms() {
        let css = r#"div{background:url('/a.png') , url("/b.png"),url(/c.png)}"#;
        let found: Vec<_> = css_urls(css).collect();
        assert_eq!(found, vec!["/a.png", "/b.png", "/c.png"]);
    }

    #[test]
    fn skips_data_payloads() {
        let css = "span{background:url(data:image/gif;base64,R0lGOD) url(real.gif)}";
        let found: Vec<_> = css_urls(css).collect();
        assert_eq!(found, vec!["real.gif"]);
    }

    #[test]
    fn extraction_is_idempotent() {
        let css = "a{background:url(x.png)} b{border-image:url('y.svg')}";
        let first: Vec<_> = css_urls(css).collect();
        let second: Vec<_> = css_urls(css).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn font_face_sources_span_multiple_rules() {
        let css = "@font-face{font-family:A;src:url(a.woff2) format('woff2'),url(a.woff)}\n\
                   p{color:red}\n\
                   @font-face{font-family:B;src:url('b.ttf')}";
        assert_eq!(font_face_sources(css), vec!["a.woff2", "a.woff", "b.ttf"]);
    }

    #[test]
    fn font_face_sources_ignore_plain_rules() {
        let css = "div{background:url(bg.png)}";
        assert!(font_face_sources(css).is_empty());
    }

    #[test]
    fn rewrite_replaces_only_mapped_tokens() {
        let css = "a{background:url(x.png) url(data:image/gif;base64,AA)}";
        let out = rewrite_urls(css, |reference| {
            if reference == "x.png" {
                Some("images/x.png".to_string())
            } else {
                None
            }
        });
        assert_eq!(
            out,
            "a{background:url(\"images/x.png\") url(data:image/gif;base64,AA)}"
        );
    }
}
