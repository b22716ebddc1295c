//! Charset handling: decoding legacy files on load and declaring UTF-8 on save.

use encoding_rs::{Encoding, WINDOWS_1252};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// `<meta charset=…>` and the `charset=` inside an http-equiv content value.
static META_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(<meta\b[^>]*charset\s*=\s*)(['"]?)([^'">\s;]+)"#)
        .expect("valid meta charset regex")
});

static HTTP_EQUIV_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(<meta\b[^>]*http-equiv\s*=\s*['"]?content-type['"]?[^>]*content\s*=\s*['"]text/html;\s*charset=)([^'"]+)(['"])"#,
    )
    .expect("valid http-equiv regex")
});

static HAS_META_CHARSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<meta\b[^>]*charset\s*=").expect("valid charset presence regex")
});

static HEAD_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<head\b[^>]*>").expect("valid head regex"));

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Make every charset declaration say UTF-8, inserting one after `<head>`
/// when the document has none.
pub fn normalize_charset_to_utf8(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let updated = META_CHARSET.replace_all(html, |caps: &regex::Captures<'_>| {
        format!("{}{}utf-8", &caps[1], &caps[2])
    });
    let updated = HTTP_EQUIV_CHARSET.replace_all(&updated, "${1}utf-8${3}");

    if HAS_META_CHARSET.is_match(&updated) {
        return updated.into_owned();
    }

    match HEAD_OPEN.find(&updated) {
        Some(head) => {
            debug!("No charset declaration, inserting one after <head>");
            let mut out = String::with_capacity(updated.len() + 24);
            out.push_str(&updated[..head.end()]);
            out.push_str("<meta charset=\"utf-8\">");
            out.push_str(&updated[head.end()..]);
            out
        }
        None => updated.into_owned(),
    }
}

/// Charset named by the first `charset=` declaration, if any.
pub fn declared_charset(html: &str) -> Option<String> {
    META_CHARSET.captures(html).map(|c| c[3].to_string())
}

/// Decode file bytes into text.
///
/// UTF-8 (with or without BOM) is taken as-is. Anything else is decoded
/// with the charset the document declares, falling back to Windows-1252,
/// which is what Outlook writes when no declaration is present.
pub fn decode_document_bytes(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    // The declaration is ASCII, so a lossy view is enough to find it.
    let head_len = bytes.len().min(8 * 1024);
    let sniff = String::from_utf8_lossy(&bytes[..head_len]);
    let encoding = match declared_charset(&sniff) {
        Some(label) => match Encoding::for_label(label.as_bytes()) {
            Some(enc) if enc != encoding_rs::UTF_8 => enc,
            Some(_) => {
                warn!("File declares UTF-8 but is not valid UTF-8, decoding as Windows-1252");
                WINDOWS_1252
            }
            None => {
                warn!(charset = %label, "Unknown charset, decoding as Windows-1252");
                WINDOWS_1252
            }
        },
        None => WINDOWS_1252,
    };
    debug!(encoding = encoding.name(), "Decoding non-UTF-8 document");
    let (decoded, _, _) = encoding.decode(bytes);
    decoded.into_owned()
}
