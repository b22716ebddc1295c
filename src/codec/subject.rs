//! Subject pseudo-header: extraction from raw Outlook markup and regeneration.
//!
//! Outlook renders the subject as a body paragraph, e.g.
//!
//! ```text
//! <p class=MsoNormal style='margin-left:135.0pt;...'><b><span ...>Subject:<span
//! style='mso-tab-count:1'></span></span></b><span ...>Quarterly numbers<o:p></o:p></span></p>
//! ```
//!
//! The markup differs between client versions, so extraction tries the
//! bold/span structure first and falls back to flat text.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::html::dom::{self, HtmlTree};
use crate::html::raw::{encode_text, find_ci, rfind_ci, strip_tags};
use crate::model::subject::SubjectRecord;

/// Marker attribute placed on the hidden subject paragraph.
pub const SUBJECT_MARKER_ATTR: &str = "data-subject-para";

/// Holds the paragraph's own `style` while it is hidden.
pub const SAVED_STYLE_ATTR: &str = "data-subject-style";

const SUBJECT_TOKEN: &str = "Subject:";

static SUBJECT_PARAGRAPH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<p\b[^>]*>.*?Subject:.*?</p>").expect("valid subject paragraph regex")
});

static PARAGRAPH_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<p\b[^>]*>").expect("valid paragraph regex"));

/// Find the subject paragraph in raw document text and decode its value.
///
/// Never fails: a document without a subject paragraph yields an empty record.
pub fn extract(raw: &str) -> SubjectRecord {
    let Some((start, end)) = find_subject_paragraph(raw) else {
        debug!("No subject paragraph found");
        return SubjectRecord::default();
    };
    let markup = &raw[start..end];
    SubjectRecord {
        raw_markup: markup.to_string(),
        plain_text: Some(text_from_paragraph(markup)),
    }
}

/// Render the fixed Outlook subject paragraph for `plain_text`.
pub fn reconstruct(plain_text: &str) -> String {
    format!(
        "<p class=MsoNormal style='margin-left:135.0pt;text-indent:-135.0pt;tab-stops:135pt;\
mso-layout-grid-align:none;text-autospace:none'><b><span lang=EN-US \
style='font-family:\"Calibri\",sans-serif;color:black;'>Subject:<span \
style='mso-tab-count:1'></span></span></b><span lang=EN-US \
style='font-family:\"Calibri\",sans-serif;mso-font-kerning:0pt'>{}<o:p></o:p></span></p>",
        encode_text(plain_text)
    )
}

/// Hide the subject paragraph in a parsed display document.
///
/// Only the first paragraph that looks like the subject is touched: one that
/// mentions `Subject`, or an Outlook header line (`MsoNormal` with the
/// 135pt hanging indent). The second rule also matches `From:`/`To:` lines
/// when they come first. The paragraph's own style is kept in
/// [`SAVED_STYLE_ATTR`] so [`reveal`] can undo the change. Returns whether a
/// paragraph was hidden.
pub fn hide(tree: &HtmlTree) -> bool {
    for p in tree.elements_named("p") {
        let outer = dom::outer_html(&p);
        let is_subject = outer.contains("Subject")
            || (outer.contains("MsoNormal") && outer.contains("margin-left:135"));
        if is_subject {
            if !outer.contains("Subject") {
                warn!("Hiding a header-styled paragraph that does not mention Subject");
            }
            if let Some(style) = dom::get_attr(&p, "style") {
                dom::set_attr(&p, SAVED_STYLE_ATTR, &style);
            }
            dom::set_attr(&p, "style", "display:none;");
            dom::set_attr(&p, SUBJECT_MARKER_ATTR, "true");
            return true;
        }
    }
    false
}

/// Undo [`hide`] on every marked paragraph in an edited body.
///
/// Used when no subject paragraph is written back, so the hidden line stays
/// visible in the saved email. Returns whether anything was restored.
pub fn reveal(tree: &HtmlTree) -> bool {
    let mut restored = false;
    for p in tree.elements_named("p") {
        if !dom::has_attr(&p, SUBJECT_MARKER_ATTR) {
            continue;
        }
        match dom::get_attr(&p, SAVED_STYLE_ATTR) {
            Some(style) => dom::set_attr(&p, "style", &style),
            None => dom::remove_attr(&p, "style"),
        }
        dom::remove_attr(&p, SAVED_STYLE_ATTR);
        dom::remove_attr(&p, SUBJECT_MARKER_ATTR);
        restored = true;
    }
    restored
}

/// Put the regenerated subject paragraph into an edited body fragment.
///
/// Replaces the marked paragraph if the host kept the marker, otherwise the
/// first paragraph containing `Subject:`, otherwise prepends it.
pub fn apply_to_body(body: &str, plain_text: &str) -> String {
    let paragraph = reconstruct(plain_text);

    let marker = format!("{SUBJECT_MARKER_ATTR}=\"true\"");
    if let Some(marker_pos) = find_ci(body, &marker, 0) {
        let p_start = rfind_ci(body, "<p", marker_pos);
        let p_end = find_ci(body, "</p>", marker_pos);
        if let (Some(s), Some(e)) = (p_start, p_end) {
            return splice(body, s, e + "</p>".len(), &paragraph);
        }
    }

    if let Some((s, e)) = find_subject_paragraph(body) {
        return splice(body, s, e, &paragraph);
    }

    format!("{paragraph}{body}")
}

/// Byte range of the shortest `<p …>…Subject:…</p>` span.
///
/// The regex finds the leftmost match, which can start at an earlier,
/// unrelated paragraph; the start is narrowed to the last `<p` before the token.
fn find_subject_paragraph(html: &str) -> Option<(usize, usize)> {
    let m = SUBJECT_PARAGRAPH.find(html)?;
    let candidate = m.as_str();
    let token = find_ci(candidate, SUBJECT_TOKEN, 0)?;
    let open = PARAGRAPH_OPEN
        .find_iter(&candidate[..token])
        .filter(|p| p.end() <= token)
        .last()
        .map(|p| p.start())
        .unwrap_or(0);
    Some((m.start() + open, m.end()))
}

fn splice(html: &str, start: usize, end: usize, replacement: &str) -> String {
    let mut out = String::with_capacity(html.len() + replacement.len());
    out.push_str(&html[..start]);
    out.push_str(replacement);
    out.push_str(&html[end..]);
    out
}

fn text_from_paragraph(paragraph: &str) -> String {
    if let Some(bold_end) = find_ci(paragraph, "</b>", 0) {
        if let Some(text) = structured_value(paragraph, bold_end) {
            return text;
        }
    }
    flat_value(paragraph)
}

/// Value following the bold label: the next span's content, else the text up
/// to `<o:p>` or the paragraph close.
fn structured_value(paragraph: &str, bold_end: usize) -> Option<String> {
    if let Some(span_open) = find_ci(paragraph, "<span", bold_end) {
        let after = &paragraph[span_open..];
        if let Some(tag_end) = after.find('>') {
            if let Some(span_close) = find_ci(after, "</span>", tag_end + 1) {
                let mut inner = &after[tag_end + 1..span_close];
                if let Some(op) = find_ci(inner, "<o:p>", 0) {
                    inner = &inner[..op];
                }
                return Some(clean(inner));
            }
        }
    }

    let value_start = bold_end + "</b>".len();
    let end = find_ci(paragraph, "<o:p>", bold_end).or_else(|| find_ci(paragraph, "</p>", bold_end))?;
    (end > value_start).then(|| clean(&paragraph[value_start..end]))
}

fn flat_value(paragraph: &str) -> String {
    let text = dom::decode_entities(&strip_tags(paragraph));
    match find_ci(&text, SUBJECT_TOKEN, 0) {
        Some(idx) => text[idx + SUBJECT_TOKEN.len()..].trim().to_string(),
        None => text.trim().to_string(),
    }
}

fn clean(fragment: &str) -> String {
    dom::decode_entities(&strip_tags(fragment)).trim().to_string()
}
