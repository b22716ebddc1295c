//! Splice an edited body back into the original document text.

use crate::error::{EditError, Result};
use crate::html::raw::body_inner_range;

/// Replace the content between the first `<body …>` and the following
/// `</body>` of `original`, keeping every other byte as it was.
pub fn merge_body(original: &str, new_body: &str) -> Result<String> {
    let (start, end) = body_inner_range(original).ok_or_else(|| {
        EditError::Structure("could not locate <body> boundaries in the original document".into())
    })?;

    let mut merged = String::with_capacity(original.len() - (end - start) + new_body.len());
    merged.push_str(&original[..start]);
    merged.push_str(new_body);
    merged.push_str(&original[end..]);
    Ok(merged)
}

/// Minimal document used when the body cannot be merged into the original.
pub fn fallback_shell(body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"windows-1252\"></head><body>{body}</body></html>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGINAL: &str = "<html xmlns:v=\"urn:schemas-microsoft-com:vml\">\r\n<head>\r\n\
<!--[if gte mso 9]><xml><o:shapedefaults v:ext=\"edit\" spidmax=\"1026\"/></xml><![endif]-->\r\n\
</head>\r\n<body lang=EN-US link=\"#0563C1\" style='tab-interval:.5in'>\r\n<div class=WordSection1>\
<p class=MsoNormal>Old</p></div>\r\n</body>\r\n</html>\r\n";

    #[test]
    fn test_merge_preserves_outside_bytes() {
        let merged = merge_body(ORIGINAL, "<p>New</p>").unwrap();
        let (start, _) = body_inner_range(ORIGINAL).unwrap();
        assert_eq!(&merged[..start], &ORIGINAL[..start]);
        assert!(merged.ends_with("<p>New</p></body>\r\n</html>\r\n"));
        assert!(!merged.contains("Old"));
    }

    #[test]
    fn test_merge_twice_is_stable() {
        let once = merge_body(ORIGINAL, "<p>New</p>").unwrap();
        let twice = merge_body(&once, "<p>New</p>").unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_without_body_fails() {
        let err = merge_body("<html><p>x</p></html>", "<p>y</p>").unwrap_err();
        assert!(matches!(err, EditError::Structure(_)));
        assert!(merge_body("<html><body><p>x</p></html>", "y").is_err());
    }

    #[test]
    fn test_fallback_shell() {
        let shell = fallback_shell("<p>x</p>");
        assert!(shell.starts_with("<!DOCTYPE html>"));
        assert!(shell.contains("<body><p>x</p></body>"));
    }
}
