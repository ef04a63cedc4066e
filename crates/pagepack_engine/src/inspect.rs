use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Read-only view of one rendered element.
///
/// `style` holds property/value pairs including custom properties. A live
/// renderer backend supplies computed values; the bundled static snapshot
/// supplies declared (inline `style` attribute) values, which is the best a
/// non-rendering inspector can do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementSnapshot {
    pub tag: String,
    pub parent_tag: Option<String>,
    pub attrs: Vec<(String, String)>,
    pub style: Vec<(String, String)>,
    /// Element text content; present for script/style elements.
    pub text: Option<String>,
    /// Actively playing media source, when the renderer exposes one.
    pub current_src: Option<String>,
}

impl ElementSnapshot {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(attr_name, _)| attr_name.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn style_value(&self, property: &str) -> Option<&str> {
        self.style
            .iter()
            .find(|(prop, _)| prop.eq_ignore_ascii_case(property))
            .map(|(_, value)| value.as_str())
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }
}

/// One stylesheet attached to the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StylesheetSnapshot {
    /// Externally linked sheet; the body must be retrieved.
    External { href: String },
    /// Inline `<style>` body.
    Inline { body: String },
    /// Cross-origin restricted; the rule list is not readable.
    Inaccessible { href: Option<String> },
}

/// Rendering-engine inspection capability: the discovery and rewrite passes
/// only ever see the document through this trait.
pub trait DocumentInspector: Send + Sync {
    /// Absolute location the document was loaded from.
    fn base_url(&self) -> &Url;
    /// Full serialized markup of the document tree.
    fn serialize(&self) -> String;
    /// Every element in the tree, in document order.
    fn elements(&self) -> Vec<ElementSnapshot>;
    /// Stylesheets in attachment order.
    fn stylesheets(&self) -> Vec<StylesheetSnapshot>;
}

/// Static [`DocumentInspector`] over parsed markup.
///
/// Used for crawled pages and by the CLI, where no live renderer is
/// available. Computed style degrades to declared inline style.
pub struct ParsedDocument {
    base_url: Url,
    markup: String,
    elements: Vec<ElementSnapshot>,
    stylesheets: Vec<StylesheetSnapshot>,
}

impl ParsedDocument {
    pub fn parse(html: &str, base_url: Url) -> Self {
        let doc = Html::parse_document(html);
        let mut elements = Vec::new();
        let mut stylesheets = Vec::new();

        if let Ok(all) = Selector::parse("*") {
            for element in doc.select(&all) {
                elements.push(snapshot_element(element));

                let tag = element.value().name().to_ascii_lowercase();
                if tag == "style" {
                    stylesheets.push(StylesheetSnapshot::Inline {
                        body: element.text().collect::<String>(),
                    });
                } else if tag == "link" {
                    let rel = element.value().attr("rel").unwrap_or("");
                    if rel.to_ascii_lowercase().contains("stylesheet") {
                        if let Some(href) = element.value().attr("href") {
                            stylesheets.push(StylesheetSnapshot::External {
                                href: href.to_string(),
                            });
                        }
                    }
                }
            }
        }

        Self {
            base_url,
            markup: doc.html(),
            elements,
            stylesheets,
        }
    }
}

impl DocumentInspector for ParsedDocument {
    fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn serialize(&self) -> String {
        self.markup.clone()
    }

    fn elements(&self) -> Vec<ElementSnapshot> {
        self.elements.clone()
    }

    fn stylesheets(&self) -> Vec<StylesheetSnapshot> {
        self.stylesheets.clone()
    }
}

fn snapshot_element(element: ElementRef<'_>) -> ElementSnapshot {
    let value = element.value();
    let tag = value.name().to_ascii_lowercase();

    let parent_tag = element
        .parent()
        .and_then(ElementRef::wrap)
        .map(|parent| parent.value().name().to_ascii_lowercase());

    let attrs: Vec<(String, String)> = value
        .attrs()
        .map(|(name, attr_value)| (name.to_ascii_lowercase(), attr_value.to_string()))
        .collect();

    let style = value
        .attr("style")
        .map(parse_declarations)
        .unwrap_or_default();

    let text = if matches!(tag.as_str(), "script" | "style") {
        let body: String = element.text().collect();
        (!body.trim().is_empty()).then_some(body)
    } else {
        None
    };

    ElementSnapshot {
        tag,
        parent_tag,
        attrs,
        style,
        text,
        current_src: None,
    }
}

fn parse_declarations(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|declaration| {
            let (prop, value) = declaration.split_once(':')?;
            let prop = prop.trim();
            let value = value.trim();
            (!prop.is_empty() && !value.is_empty())
                .then(|| (prop.to_ascii_lowercase(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(html: &str) -> ParsedDocument {
        ParsedDocument::parse(html, Url::parse("https://example.com/").unwrap())
    }

    #[test]
    fn collects_elements_with_attrs_and_style() {
        let doc = parse(r#"<div id="x" style="background-image: url(a.png); --brand: url(b.svg)"></div>"#);
        let div = doc
            .elements()
            .into_iter()
            .find(|el| el.tag == "div")
            .unwrap();
        assert_eq!(div.attr("id"), Some("x"));
        assert_eq!(div.style_value("background-image"), Some("url(a.png)"));
        assert_eq!(div.style_value("--brand"), Some("url(b.svg)"));
    }

    #[test]
    fn collects_inline_and_external_stylesheets() {
        let doc = parse(
            r#"<head><link rel="stylesheet" href="/site.css"><style>p{color:red}</style></head>"#,
        );
        let sheets = doc.stylesheets();
        assert_eq!(sheets.len(), 2);
        assert_eq!(
            sheets[0],
            StylesheetSnapshot::External {
                href: "/site.css".to_string()
            }
        );
        assert!(matches!(&sheets[1], StylesheetSnapshot::Inline { body } if body.contains("color")));
    }

    #[test]
    fn script_bodies_are_captured() {
        let doc = parse("<script>console.log(1)</script>");
        let script = doc
            .elements()
            .into_iter()
            .find(|el| el.tag == "script")
            .unwrap();
        assert_eq!(script.text.as_deref(), Some("console.log(1)"));
    }

    #[test]
    fn parent_tag_links_nested_sources() {
        let doc = parse(r#"<video><source src="clip.mp4"></video>"#);
        let source = doc
            .elements()
            .into_iter()
            .find(|el| el.tag == "source")
            .unwrap();
        assert_eq!(source.parent_tag.as_deref(), Some("video"));
    }
}
