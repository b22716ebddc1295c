//! `filelist.xml`: Office's index of the files belonging to an HTML document.
//!
//! The manifest is regenerated wholesale on every save from the set of
//! referenced images. It is a convenience artifact, so write failures are
//! reported as non-fatal.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use super::store::UsedFiles;
use crate::error::{EditError, Result};
use crate::model::asset::is_image_file_name;

/// File name of the manifest inside an asset folder.
pub const MANIFEST_FILE: &str = "filelist.xml";

static IMAGE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[A-Za-z0-9 _\-.()]+\.(png|jpg|jpeg|gif|bmp|webp|tif|tiff|ico|emf|wmf)\b")
        .expect("valid image name regex")
});

/// Render the manifest for `html_file_name` and the used images.
pub fn render(html_file_name: &str, used: &UsedFiles) -> String {
    let mut xml = String::new();
    xml.push_str("<xml xmlns:o=\"urn:schemas-microsoft-com:office:office\">\r\n");
    xml.push_str(&format!(
        " <o:MainFile HRef=\"../{}\"/>\r\n",
        urlencoding::encode(html_file_name)
    ));
    for file in used.images() {
        xml.push_str(&format!(
            " <o:File HRef=\"{}\"/>\r\n",
            urlencoding::encode(file)
        ));
    }
    xml.push_str("</xml>\r\n");
    xml
}

/// Write `filelist.xml` into `target_dir` for the HTML file at `html_path`.
///
/// Does nothing when the folder does not exist (the document has no assets).
pub fn write_manifest(target_dir: &Path, html_path: &Path, used: &UsedFiles) -> Result<()> {
    if !target_dir.is_dir() {
        debug!(dir = %target_dir.display(), "No asset folder, skipping manifest");
        return Ok(());
    }
    let Some(html_file_name) = html_path.file_name().map(|n| n.to_string_lossy()) else {
        return Err(EditError::InvalidPath(html_path.display().to_string()));
    };

    let path = target_dir.join(MANIFEST_FILE);
    let xml = render(&html_file_name, used);
    std::fs::write(&path, xml).map_err(|e| {
        warn!(path = %path.display(), error = %e, "Failed to write manifest");
        EditError::ManifestWrite { path, source: e }
    })
}

/// Image file names mentioned anywhere in a manifest's text.
pub fn referenced_images(manifest_xml: &str) -> Vec<String> {
    let decoded = urlencoding::decode(manifest_xml)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| manifest_xml.to_string());

    let mut seen = UsedFiles::default();
    IMAGE_NAME
        .find_iter(&decoded)
        .map(|m| m.as_str().trim().to_string())
        .filter(|name| is_image_file_name(name) && seen.insert(name))
        .collect()
}

/// Read the manifest of `asset_dir` and list the image files it mentions.
///
/// A missing or unreadable manifest yields an empty list.
pub fn read_referenced_images(asset_dir: &Path) -> Vec<String> {
    let path = asset_dir.join(MANIFEST_FILE);
    if !path.is_file() {
        return Vec::new();
    }
    match std::fs::read(&path) {
        Ok(bytes) => referenced_images(&String::from_utf8_lossy(&bytes)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read source manifest");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTLOOK_MANIFEST: &str = "<xml xmlns:o=\"urn:schemas-microsoft-com:office:office\">\r\n\
 <o:MainFile HRef=\"../Weekly%20Report.htm\"/>\r\n\
 <o:File HRef=\"themedata.thmx\"/>\r\n\
 <o:File HRef=\"colorschememapping.xml\"/>\r\n\
 <o:File HRef=\"image001.png\"/>\r\n\
 <o:File HRef=\"image002.JPG\"/>\r\n\
 <o:File HRef=\"image%20003.png\"/>\r\n\
 <o:File HRef=\"filelist.xml\"/>\r\n\
</xml>";

    #[test]
    fn test_render_sorted_images_only() {
        let mut used = UsedFiles::default();
        used.insert("new_image000.png");
        used.insert("Image001.png");
        used.insert("themedata.thmx");
        let xml = render("My Mail.htm", &used);
        assert_eq!(
            xml,
            "<xml xmlns:o=\"urn:schemas-microsoft-com:office:office\">\r\n \
<o:MainFile HRef=\"../My%20Mail.htm\"/>\r\n \
<o:File HRef=\"Image001.png\"/>\r\n \
<o:File HRef=\"new_image000.png\"/>\r\n\
</xml>\r\n"
        );
    }

    #[test]
    fn test_referenced_images() {
        let names = referenced_images(OUTLOOK_MANIFEST);
        assert_eq!(names, ["image001.png", "image002.JPG", "image 003.png"]);
    }

    #[test]
    fn test_write_manifest_skips_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let used = UsedFiles::default();
        write_manifest(&tmp.path().join("none_files"), &tmp.path().join("none.htm"), &used).unwrap();
        assert!(!tmp.path().join("none_files").exists());
    }

    #[test]
    fn test_write_and_read_back() {
        let tmp = tempfile::tempdir().unwrap();
        let mut used = UsedFiles::default();
        used.insert("image001.png");
        write_manifest(tmp.path(), Path::new("/x/mail.htm"), &used).unwrap();
        assert_eq!(read_referenced_images(tmp.path()), ["image001.png"]);
    }
}
