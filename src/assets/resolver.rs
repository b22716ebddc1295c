//! Image reference resolution for an edited body fragment.
//!
//! Every `<img>` and VML `imagedata` element is classified and its backing
//! bytes are brought into the target asset folder:
//!
//! 1. inline `data:image/…;base64,` URLs are decoded and written as `new_image###`;
//! 2. virtual-host URLs, relative paths and absolute paths are located on disk
//!    (falling back to the bare file name inside the source asset folder) and
//!    copied when the target folder differs;
//! 3. anything else is left untouched.
//!
//! Failures are isolated per reference: the reference keeps its original
//! value and the failure is reported, the rest of the document still saves.

use std::path::{Path, PathBuf};

use base64::Engine;
use tracing::{debug, info, warn};

use super::manifest;
use super::store::{AssetStore, UsedFiles};
use crate::error::{EditError, Result};
use crate::html::dom::{self, HtmlTree};
use crate::model::asset::{extension_for_data_header, is_vml_imagedata, AssetReference, SourceAttr};

/// Where the document being saved was loaded from.
#[derive(Debug, Clone)]
pub struct SourceLocation {
    /// Directory containing the source `.htm` file.
    pub document_dir: PathBuf,
    /// The source `<name>_files` folder.
    pub asset_dir: PathBuf,
    /// Virtual-host prefix the editing host used, e.g. `http://email.content/`.
    pub virtual_prefix: String,
}

/// Outcome of resolving one body fragment.
#[derive(Debug, Default)]
pub struct ResolveReport {
    /// Every file name the saved body (or the source manifest) references.
    pub used: UsedFiles,
    /// All image references found, with their resolution.
    pub references: Vec<AssetReference>,
    /// Per-reference failures. Non-fatal.
    pub failures: Vec<EditError>,
}

impl ResolveReport {
    /// References that could not be resolved and were left as they were.
    pub fn unresolved(&self) -> impl Iterator<Item = &AssetReference> {
        self.references
            .iter()
            .filter(|r| r.resolved_file_name.is_none())
    }
}

/// Find every image reference in a body fragment.
pub fn discover(tree: &HtmlTree) -> Vec<AssetReference> {
    tree.elements()
        .into_iter()
        .filter_map(|node| {
            let name = dom::element_name(&node)?;
            let attribute = if name.eq_ignore_ascii_case("img") {
                SourceAttr::Src
            } else if is_vml_imagedata(&name) {
                SourceAttr::VML_PRIORITY
                    .into_iter()
                    .find(|a| dom::has_attr(&node, a.as_str()))
                    .unwrap_or(SourceAttr::Src)
            } else {
                return None;
            };
            let value = dom::get_attr(&node, attribute.as_str())?.trim().to_string();
            if value.is_empty() {
                return None;
            }
            Some(AssetReference {
                node,
                attribute,
                original_value: value,
                resolved_file_name: None,
            })
        })
        .collect()
}

/// Drives an [`AssetStore`] over the references of one body fragment.
pub struct AssetResolver<'a> {
    store: AssetStore,
    source: &'a SourceLocation,
}

impl<'a> AssetResolver<'a> {
    pub fn new(store: AssetStore, source: &'a SourceLocation) -> Self {
        Self { store, source }
    }

    /// Resolve and rewrite every image reference in `tree`.
    pub fn resolve(mut self, tree: &HtmlTree) -> ResolveReport {
        let mut references = discover(tree);
        let mut failures = Vec::new();

        if !references.is_empty() {
            if let Err(e) = self.store.ensure_dir() {
                warn!(error = %e, "Could not create asset folder, images left as they are");
                failures.push(e);
                return ResolveReport {
                    used: UsedFiles::default(),
                    references,
                    failures,
                };
            }
        }

        for reference in &mut references {
            match self.resolve_one(&reference.original_value) {
                Ok(Some(file_name)) => {
                    let new_value = self.store.relative_reference(&file_name);
                    dom::set_attr(&reference.node, reference.attribute.as_str(), &new_value);
                    self.store.mark_used(&file_name);
                    reference.resolved_file_name = Some(file_name);
                }
                Ok(None) => {
                    debug!(reference = %short(&reference.original_value), "Image reference not found on disk, left as is");
                }
                Err(e) => {
                    warn!(error = %e, "Image left unresolved");
                    failures.push(e);
                }
            }
        }

        self.merge_manifest_images();

        info!(
            references = references.len(),
            used = self.store.used().len(),
            failures = failures.len(),
            "Resolved image references"
        );
        ResolveReport {
            used: self.store.into_used(),
            references,
            failures,
        }
    }

    /// `Ok(None)` means "not found, leave it"; `Err` means found but failed.
    fn resolve_one(&mut self, value: &str) -> Result<Option<String>> {
        if starts_with_ci(value, "data:image/") {
            return self.persist_data_url(value).map(Some);
        }
        match self.locate_source(value) {
            Some(path) => self
                .store
                .import_file(&path)
                .map(Some)
                .map_err(|e| EditError::asset(value, e)),
            None => Ok(None),
        }
    }

    fn persist_data_url(&mut self, value: &str) -> Result<String> {
        let (header, payload) = value
            .split_once(',')
            .ok_or_else(|| EditError::asset(value, "data URL has no payload"))?;
        if !header.to_ascii_lowercase().contains(";base64") {
            return Err(EditError::asset(value, "only base64 data URLs are supported"));
        }
        let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(cleaned.as_bytes())
            .map_err(|e| EditError::asset(value, format!("invalid base64: {e}")))?;
        let ext = extension_for_data_header(header);
        self.store
            .persist_new_image(ext, &bytes)
            .map_err(|e| EditError::asset(value, e))
    }

    /// Find the file backing a non-inline reference.
    fn locate_source(&self, value: &str) -> Option<PathBuf> {
        let without_query = value.split(['?', '#']).next().unwrap_or(value);
        let decoded = urlencoding::decode(without_query)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| without_query.to_string());

        let first_try = if starts_with_ci(&decoded, &self.source.virtual_prefix) {
            Some(join_relative(
                &self.source.document_dir,
                &decoded[self.source.virtual_prefix.len()..],
            ))
        } else if decoded.contains("://") {
            None
        } else if Path::new(&decoded).is_absolute() {
            Some(PathBuf::from(&decoded))
        } else {
            Some(join_relative(&self.source.document_dir, &decoded))
        };

        if let Some(path) = first_try.filter(|p| p.is_file()) {
            return Some(path);
        }

        // The HTML may still name an old `_files` folder (after a rename or
        // Save As); look for the bare file name in the source folder.
        let file_name = decoded
            .rsplit(['/', '\\'])
            .next()
            .filter(|n| !n.is_empty())?;
        let candidate = self.source.asset_dir.join(file_name);
        candidate.is_file().then_some(candidate)
    }

    /// Keep images that the source manifest lists, even when no element
    /// attribute names them (Office sometimes references them only via VML
    /// inside conditional comments).
    fn merge_manifest_images(&mut self) {
        let names = manifest::read_referenced_images(&self.source.asset_dir);
        if names.is_empty() {
            return;
        }
        if let Err(e) = self.store.ensure_dir() {
            warn!(error = %e, "Could not create asset folder for manifest images");
            return;
        }
        for name in names {
            let source = self.source.asset_dir.join(&name);
            if !source.is_file() {
                continue;
            }
            let dest = self.store.dir().join(&name);
            if !dest.exists() {
                if let Err(e) = std::fs::copy(&source, &dest) {
                    warn!(file = %source.display(), error = %e, "Failed to copy manifest image");
                    continue;
                }
            }
            self.store.mark_used(&name);
        }
    }
}

fn starts_with_ci(value: &str, prefix: &str) -> bool {
    value
        .get(..prefix.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(prefix))
}

/// Join a `/`- or `\`-separated relative reference onto `base`.
fn join_relative(base: &Path, relative: &str) -> PathBuf {
    relative
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != ".")
        .fold(base.to_path_buf(), |path, part| path.join(part))
}

fn short(value: &str) -> String {
    value.chars().take(80).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1x1 transparent PNG
    const PNG_1X1: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

    struct Fixture {
        _tmp: tempfile::TempDir,
        source: SourceLocation,
        target_dir: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let document_dir = tmp.path().join("inbox");
        let asset_dir = document_dir.join("mail_files");
        std::fs::create_dir_all(&asset_dir).unwrap();
        std::fs::write(asset_dir.join("image001.png"), b"img1").unwrap();
        let target_dir = tmp.path().join("out").join("copy_files");
        Fixture {
            source: SourceLocation {
                document_dir,
                asset_dir,
                virtual_prefix: "http://email.content/".into(),
            },
            target_dir,
            _tmp: tmp,
        }
    }

    fn resolve(fx: &Fixture, html: &str) -> (HtmlTree, ResolveReport) {
        let tree = HtmlTree::parse_body_fragment(html);
        let store = AssetStore::open(&fx.target_dir, "copy_files");
        let report = AssetResolver::new(store, &fx.source).resolve(&tree);
        (tree, report)
    }

    #[test]
    fn test_discover_vml_priority() {
        let tree = HtmlTree::parse_body_fragment(
            r#"<img src="a.png"><v:imagedata o:href="c.png" v:src="b.png"/><w:imagedata o:href="d.png"/><img src=" ">"#,
        );
        let refs = discover(&tree);
        let found: Vec<_> = refs
            .iter()
            .map(|r| (r.attribute.as_str(), r.original_value.as_str()))
            .collect();
        assert_eq!(
            found,
            [("src", "a.png"), ("v:src", "b.png"), ("o:href", "d.png")]
        );
    }

    #[test]
    fn test_data_url_persisted() {
        let fx = fixture();
        let html = format!(r#"<p><img src="data:image/png;base64,{PNG_1X1}"></p>"#);
        let (tree, report) = resolve(&fx, &html);
        assert!(report.failures.is_empty());
        assert_eq!(report.used.iter().collect::<Vec<_>>(), ["new_image000.png"]);
        assert!(fx.target_dir.join("new_image000.png").is_file());
        assert!(tree
            .body_inner_html()
            .contains(r#"<img src="copy_files/new_image000.png">"#));
    }

    #[test]
    fn test_bad_data_url_left_untouched() {
        let fx = fixture();
        let (tree, report) = resolve(&fx, r#"<img src="data:image/jpeg;base64,@@not base64@@">"#);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0], EditError::Asset { .. }));
        assert!(report.used.is_empty());
        assert_eq!(report.unresolved().count(), 1);
        assert!(tree.body_inner_html().contains("data:image/jpeg;base64,@@not base64@@"));
    }

    #[test]
    fn test_relative_and_virtual_references_copied() {
        let fx = fixture();
        let (tree, report) = resolve(
            &fx,
            r#"<img src="mail_files/image001.png?v=2"><img src="http://email.content/mail_files/image001.png">"#,
        );
        assert_eq!(report.used.len(), 1);
        assert_eq!(std::fs::read(fx.target_dir.join("image001.png")).unwrap(), b"img1");
        assert_eq!(
            tree.body_inner_html()
                .matches("copy_files/image001.png")
                .count(),
            2
        );
    }

    #[test]
    fn test_stale_folder_name_falls_back_to_basename() {
        let fx = fixture();
        let (_, report) = resolve(&fx, r#"<img src="Old%20Name_files/image001.png">"#);
        assert!(report.used.contains("image001.png"));
    }

    #[test]
    fn test_missing_file_left_untouched() {
        let fx = fixture();
        let (tree, report) = resolve(&fx, r#"<img src="mail_files/gone.png"><img src="https://cdn.example.com/logo.gif">"#);
        assert!(report.used.is_empty());
        assert!(report.failures.is_empty());
        let html = tree.body_inner_html();
        assert!(html.contains(r#"src="mail_files/gone.png""#));
        assert!(html.contains(r#"src="https://cdn.example.com/logo.gif""#));
    }

    #[test]
    fn test_manifest_images_are_kept() {
        let fx = fixture();
        std::fs::write(fx.source.asset_dir.join("image002.jpg"), b"img2").unwrap();
        std::fs::write(
            fx.source.asset_dir.join("filelist.xml"),
            "<xml><o:File HRef=\"image002.jpg\"/><o:File HRef=\"image099.png\"/></xml>",
        )
        .unwrap();
        let (_, report) = resolve(&fx, "<p>no images</p>");
        assert_eq!(report.used.iter().collect::<Vec<_>>(), ["image002.jpg"]);
        assert!(fx.target_dir.join("image002.jpg").is_file());
    }

    #[test]
    fn test_join_relative() {
        let p = join_relative(Path::new("/base"), "a_files\\sub/./x.png");
        assert_eq!(p, PathBuf::from("/base/a_files/sub/x.png"));
    }
}
