//! The subject pseudo-header found in an Outlook email body.

/// Default text shown when no subject paragraph exists.
pub const SUBJECT_NOT_FOUND: &str = "Subject not found";

/// Subject paragraph captured from the raw document text at load time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectRecord {
    /// Exact `<p>…Subject:…</p>` markup, or empty when not found.
    pub raw_markup: String,
    /// Decoded subject text, possibly empty. `None` only when no paragraph matched.
    pub plain_text: Option<String>,
}

impl SubjectRecord {
    /// Whether a subject paragraph was found in the source.
    pub fn is_found(&self) -> bool {
        !self.raw_markup.is_empty()
    }

    /// Text for the editable subject field, falling back to `placeholder`.
    pub fn display_text<'a>(&'a self, placeholder: &'a str) -> &'a str {
        self.plain_text.as_deref().unwrap_or(placeholder)
    }
}
