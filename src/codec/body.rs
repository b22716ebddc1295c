//! Body region markers.
//!
//! Two comments are placed as the first and last children of `<body>` in the
//! display copy. The host's full-document serialization is later cut back to
//! the text between them, so nothing from the (possibly rewritten) head ever
//! reaches the saved file.

use tracing::debug;

use crate::error::{EditError, Result};
use crate::html::dom::{self, HtmlTree};
use crate::html::raw::{body_inner_range, find_ci};

/// Text of the comment opening the editable region.
pub const BODY_START: &str = "EDITOR_BODY_START";
/// Text of the comment closing the editable region.
pub const BODY_END: &str = "EDITOR_BODY_END";

const START_COMMENT: &str = "<!--EDITOR_BODY_START-->";
const END_COMMENT: &str = "<!--EDITOR_BODY_END-->";

/// Make the body of a display document editable and insert the region markers.
///
/// `source_has_body` must come from the raw text: the HTML parser always
/// synthesizes a `<body>`, and a synthesized body cannot be merged back.
/// Marker insertion is skipped when a start marker is already present.
pub fn prepare_for_editing(tree: &HtmlTree, source_has_body: bool) -> Result<()> {
    let body = match tree.body() {
        Some(body) if source_has_body => body,
        _ => {
            return Err(EditError::Structure(
                "document has no <body> element to edit".into(),
            ))
        }
    };

    dom::set_attr(&body, "contenteditable", "true");
    let style = match dom::get_attr(&body, "style") {
        Some(existing) if !existing.trim().is_empty() => {
            format!("{}; outline: none;", existing.trim().trim_end_matches(';'))
        }
        _ => "outline: none;".to_string(),
    };
    dom::set_attr(&body, "style", &style);

    if dom::contains_comment(&body, BODY_START) {
        debug!("Body markers already present, not inserting again");
    } else {
        dom::prepend_comment(&body, BODY_START);
        dom::append_comment(&body, BODY_END);
    }
    Ok(())
}

/// Cut the edited body content out of the host's full-document serialization.
///
/// Falls back to the content between the body tags when the host dropped the
/// marker comments, and to the whole text when there is no body tag either.
pub fn extract_edited(full_html: &str) -> String {
    if full_html.trim().is_empty() {
        return String::new();
    }

    if let Some(start) = find_ci(full_html, START_COMMENT, 0) {
        let content_start = start + START_COMMENT.len();
        if let Some(end) = find_ci(full_html, END_COMMENT, content_start) {
            return full_html[content_start..end].to_string();
        }
    }

    debug!("Body markers missing from editor HTML, using body tags");
    match body_inner_range(full_html) {
        Some((start, end)) => full_html[start..end].to_string(),
        None => full_html.to_string(),
    }
}
