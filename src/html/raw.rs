//! Raw-text tier: case-insensitive searches and tag boundary lookups that
//! make no assumption about the markup being well-formed.

use once_cell::sync::Lazy;
use regex::Regex;

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));

/// Find `needle` in `haystack[from..]`, ignoring ASCII case.
///
/// Returns the absolute byte offset. `needle` must be ASCII.
pub fn find_ci(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let hay = haystack.as_bytes();
    let pat = needle.as_bytes();
    if pat.is_empty() || from > hay.len() || hay.len() - from < pat.len() {
        return None;
    }
    hay[from..]
        .windows(pat.len())
        .position(|w| w.eq_ignore_ascii_case(pat))
        .map(|p| p + from)
}

/// Find the last occurrence of `needle` starting at or before `until`, ignoring ASCII case.
pub fn rfind_ci(haystack: &str, needle: &str, until: usize) -> Option<usize> {
    let hay = haystack.as_bytes();
    let pat = needle.as_bytes();
    if pat.is_empty() || hay.len() < pat.len() {
        return None;
    }
    let last_start = until.min(hay.len() - pat.len());
    (0..=last_start)
        .rev()
        .find(|&i| hay[i..i + pat.len()].eq_ignore_ascii_case(pat))
}

/// Find the start of an opening tag `<name` whose name ends right there
/// (so `<body` does not match `<bodyx`).
pub fn find_open_tag(html: &str, name: &str, from: usize) -> Option<usize> {
    let needle = format!("<{name}");
    let mut pos = from;
    while let Some(found) = find_ci(html, &needle, pos) {
        let after = found + needle.len();
        match html.as_bytes().get(after) {
            Some(b) if b.is_ascii_alphanumeric() || *b == b'-' || *b == b':' => pos = after,
            _ => return Some(found),
        }
    }
    None
}

/// Byte range of the content between `<body …>` and `</body>`.
///
/// The start is just past the `>` of the first body start tag, the end is
/// the offset of the first `</body>` after it.
pub fn body_inner_range(html: &str) -> Option<(usize, usize)> {
    let open = find_open_tag(html, "body", 0)?;
    let tag_end = html[open..].find('>')? + open;
    let close = find_ci(html, "</body>", tag_end)?;
    Some((tag_end + 1, close))
}

/// Whether the text contains a `<body` start tag at all.
pub fn has_body_tag(html: &str) -> bool {
    find_open_tag(html, "body", 0).is_some()
}

/// Remove every `<…>` tag, leaving text and entities untouched.
pub fn strip_tags(html: &str) -> String {
    TAG.replace_all(html, "").into_owned()
}

/// Escape text for use in HTML content or a quoted attribute.
pub fn encode_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Heuristic check that an editor serialization is an HTML document.
pub fn is_probably_html(text: &str) -> bool {
    let t = text.trim_start();
    if t.is_empty() {
        return false;
    }
    find_ci(t, "<html", 0).is_some()
        || find_ci(t, "<body", 0).is_some()
        || t.get(..9).is_some_and(|p| p.eq_ignore_ascii_case("<!doctype"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_ci() {
        assert_eq!(find_ci("abc SUBJECT: x", "subject:", 0), Some(4));
        assert_eq!(find_ci("abc", "abcd", 0), None);
        assert_eq!(find_ci("xx</B>yy</b>", "</b>", 5), Some(8));
        assert_eq!(find_ci("abc", "a", 4), None);
    }

    #[test]
    fn test_rfind_ci() {
        assert_eq!(rfind_ci("<p>a</p><P>b", "<p", 11), Some(8));
        assert_eq!(rfind_ci("<p>a</p><P>b", "<p", 7), Some(0));
        assert_eq!(rfind_ci("abc", "<p", 2), None);
    }

    #[test]
    fn test_find_open_tag_skips_longer_names() {
        let html = "<bodyguard><body class=x>";
        assert_eq!(find_open_tag(html, "body", 0), Some(11));
        assert_eq!(find_open_tag("<header>", "head", 0), None);
    }

    #[test]
    fn test_body_inner_range() {
        let html = "<html><BODY lang=EN>inner</Body></html>";
        let (s, e) = body_inner_range(html).unwrap();
        assert_eq!(&html[s..e], "inner");
        assert!(body_inner_range("<html><p>x</p></html>").is_none());
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<b>Hi</b> <span lang=EN>there</span>"), "Hi there");
    }

    #[test]
    fn test_encode_text() {
        assert_eq!(encode_text("a<b & 'c'"), "a&lt;b &amp; &#39;c&#39;");
    }

    #[test]
    fn test_is_probably_html() {
        assert!(is_probably_html("  <!DOCTYPE html><p>x"));
        assert!(is_probably_html("<HTML><body></body></HTML>"));
        assert!(!is_probably_html(""));
        assert!(!is_probably_html("null"));
        assert!(!is_probably_html("<p>fragment only</p>"));
    }
}
