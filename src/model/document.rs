//! The open email document and the path conventions around it.

use std::path::{Path, PathBuf};

use super::subject::SubjectRecord;
use crate::error::{EditError, Result};

/// Suffix Outlook appends to the basename to form the asset folder name.
pub const ASSET_FOLDER_SUFFIX: &str = "_files";

/// One loaded `.htm` email.
///
/// `original_raw` is the file text exactly as read. It is never mutated:
/// every save splices the edited body into this snapshot, so repeated saves
/// stay anchored to the true original head and doctype.
#[derive(Debug, Clone)]
pub struct EmailDocument {
    file_path: PathBuf,
    original_raw: String,
    servable_html: String,
    subject: SubjectRecord,
}

impl EmailDocument {
    pub(crate) fn new(
        file_path: PathBuf,
        original_raw: String,
        servable_html: String,
        subject: SubjectRecord,
    ) -> Self {
        Self {
            file_path,
            original_raw,
            servable_html,
            subject,
        }
    }

    /// Absolute path of the `.htm` file.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Directory that contains the `.htm` file. Relative references in the
    /// body (`name_files/image001.png`) resolve against it.
    pub fn document_dir(&self) -> PathBuf {
        document_dir(&self.file_path)
    }

    /// `<basename>_files`.
    pub fn asset_folder_name(&self) -> String {
        asset_folder_name(&self.file_path)
    }

    /// Full path of the sibling asset folder.
    pub fn asset_dir(&self) -> PathBuf {
        asset_dir_for(&self.file_path)
    }

    /// The file text as read at load time.
    pub fn original_raw(&self) -> &str {
        &self.original_raw
    }

    /// The HTML handed to the editing host.
    pub fn servable_html(&self) -> &str {
        &self.servable_html
    }

    /// Subject found at load time.
    pub fn subject(&self) -> &SubjectRecord {
        &self.subject
    }

    /// Point the document at its new location after a successful Save As.
    pub(crate) fn relocate(&mut self, target: PathBuf) {
        self.file_path = target;
    }
}

/// `<basename>_files` for an HTML file path.
pub fn asset_folder_name(html_path: &Path) -> String {
    let stem = html_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{stem}{ASSET_FOLDER_SUFFIX}")
}

/// Directory containing `html_path`.
pub fn document_dir(html_path: &Path) -> PathBuf {
    html_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Full path of the asset folder belonging to `html_path`.
pub fn asset_dir_for(html_path: &Path) -> PathBuf {
    document_dir(html_path).join(asset_folder_name(html_path))
}

/// Make `path` absolute without touching the filesystem.
pub fn absolute_html_path(path: &Path) -> Result<PathBuf> {
    if path.file_stem().is_none() {
        return Err(EditError::InvalidPath(path.display().to_string()));
    }
    std::path::absolute(path).map_err(|e| EditError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_folder_naming() {
        let p = Path::new("/mail/Weekly Report.htm");
        assert_eq!(asset_folder_name(p), "Weekly Report_files");
        assert_eq!(asset_dir_for(p), PathBuf::from("/mail/Weekly Report_files"));
        assert_eq!(document_dir(p), PathBuf::from("/mail"));
    }

    #[test]
    fn test_absolute_html_path_rejects_empty() {
        assert!(absolute_html_path(Path::new("")).is_err());
        let abs = absolute_html_path(Path::new("mail.htm")).unwrap();
        assert!(abs.is_absolute());
        assert!(abs.ends_with("mail.htm"));
    }
}
