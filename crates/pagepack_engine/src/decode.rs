use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use thiserror::Error;

/// Text payload decoded to UTF-8, with the encoding that was actually used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    pub encoding_label: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload is not valid {0}")]
    Undecodable(String),
}

/// Leading bytes searched for a `<meta charset>` declaration.
const META_SCAN_WINDOW: usize = 1024;

/// Decodes raw resource bytes to UTF-8.
///
/// Detection order: BOM, then the Content-Type charset parameter, then a
/// `<meta charset>` declaration for markup payloads, then chardetng
/// detection over the full body.
pub fn decode_text(bytes: &[u8], content_type: Option<&str>) -> Result<DecodedText, DecodeError> {
    let encoding = detect_encoding(bytes, content_type);
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(DecodeError::Undecodable(used.name().to_string()));
    }
    Ok(DecodedText {
        text: text.into_owned(),
        encoding_label: used.name().to_string(),
    })
}

fn detect_encoding(bytes: &[u8], content_type: Option<&str>) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return encoding;
    }

    if let Some(label) = content_type.and_then(header_charset) {
        if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
            return encoding;
        }
    }

    // Markup frequently declares its own charset when the transport layer
    // does not; honor the declaration before guessing. A missing
    // content-type is treated as potential markup.
    let markup_like = content_type.map_or(true, |ct| ct.to_ascii_lowercase().contains("html"));
    if markup_like {
        if let Some(label) = meta_charset(bytes) {
            if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
                return encoding;
            }
        }
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    detector.guess(None, true)
}

/// Charset parameter of a Content-Type header value, unquoted.
fn header_charset(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(['"', '\'']).to_string())
    })
}

/// Charset label declared inside the document head, covering both
/// `<meta charset="...">` and the `http-equiv` content form.
fn meta_charset(bytes: &[u8]) -> Option<String> {
    let window = &bytes[..bytes.len().min(META_SCAN_WINDOW)];
    let head = String::from_utf8_lossy(window).to_ascii_lowercase();
    let at = head.find("charset=")?;
    let rest = head[at + "charset=".len()..].trim_start_matches(['"', '\'']);
    let end = rest
        .find(|c: char| matches!(c, '"' | '\'' | '>' | ';' | '/') || c.is_whitespace())
        .unwrap_or(rest.len());
    let label = rest[..end].trim();
    (!label.is_empty()).then(|| label.to_string())
}
