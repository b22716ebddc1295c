//! The edit pipeline: load a document, hand it to the editing host, and save
//! the host's edited serialization back to disk.
//!
//! The pipeline is a passive state machine. It never talks to the host
//! itself; it returns [`HostCommand`]s and reacts to [`HostEvent`]s, so the
//! only asynchronous step (fetching the serialization from the host) is the
//! caller's concern.
//!
//! ```text
//! Empty --load--> Loaded --begin_save--> Saving --complete_save--> Saved
//!                   ^                       |                        |
//!                   +------- failure -------+        load / save ----+
//! ```

pub mod host;
pub mod resources;

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::assets::manifest;
use crate::assets::resolver::{AssetResolver, SourceLocation};
use crate::assets::store::{mirror_non_image_files, AssetStore, UsedFiles};
use crate::codec::{body, charset, merge, subject};
use crate::error::{EditError, Result};
use crate::html::dom::{self, HtmlTree};
use crate::html::raw;
use crate::model::document::{absolute_html_path, asset_folder_name, document_dir, EmailDocument};
use crate::model::subject::SUBJECT_NOT_FOUND;

pub use host::{FormatCommand, HostCommand, HostEvent};
pub use resources::ResourceResponse;

/// Behaviour switches for one pipeline, usually built from the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Host name of the virtual origin the editor page is served from.
    pub virtual_host: String,
    /// Path of the editor page on the virtual host.
    pub editor_page: String,
    /// Subject shown when the document has no subject paragraph.
    pub subject_placeholder: String,
    pub copy_non_image_files: bool,
    pub write_manifest: bool,
    pub reuse_identical_images: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            virtual_host: "email.content".into(),
            editor_page: "editor.html".into(),
            subject_placeholder: SUBJECT_NOT_FOUND.into(),
            copy_non_image_files: true,
            write_manifest: true,
            reuse_identical_images: true,
        }
    }
}

impl PipelineOptions {
    /// `http://<virtual_host>/`
    pub fn virtual_prefix(&self) -> String {
        format!("http://{}/", self.virtual_host)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Empty,
    Loaded,
    /// Waiting for the host's serialization.
    Saving,
    Saved,
}

/// Result of a successful save.
#[derive(Debug)]
pub struct SaveReport {
    /// The `.htm` file written.
    pub path: PathBuf,
    /// Its `_files` folder.
    pub asset_dir: PathBuf,
    pub used_files: UsedFiles,
    /// Image references found in the edited body.
    pub image_count: usize,
    /// Non-fatal problems: unresolved images, manifest write failure,
    /// merge fallback.
    pub warnings: Vec<EditError>,
    /// Size of the written file in bytes.
    pub bytes_written: u64,
}

impl SaveReport {
    /// Whether the body could not be merged into the original document and
    /// a minimal shell was written instead.
    pub fn used_fallback_shell(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, EditError::Structure(_)))
    }
}

/// What to do after the host answered a serialization request.
#[derive(Debug)]
pub enum SaveOutcome {
    /// The answer was unusable; send this command and report its result.
    Retry(HostCommand),
    Done(SaveReport),
}

/// Reaction to a host event.
#[derive(Debug)]
pub enum HostReaction {
    Idle,
    Send(HostCommand),
    Saved(SaveReport),
}

#[derive(Debug)]
struct PendingSave {
    target: PathBuf,
    retried: bool,
    prior_state: PipelineState,
}

/// One open document and its editing session.
#[derive(Debug)]
pub struct EditPipeline {
    options: PipelineOptions,
    document: Option<EmailDocument>,
    subject: String,
    state: PipelineState,
    pending: Option<PendingSave>,
    navigation: u64,
    hooked_navigation: Option<u64>,
}

impl EditPipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            document: None,
            subject: String::new(),
            state: PipelineState::Empty,
            pending: None,
            navigation: 0,
            hooked_navigation: None,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn document(&self) -> Option<&EmailDocument> {
        self.document.as_ref()
    }

    /// Current text of the subject field.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn set_subject(&mut self, text: impl Into<String>) {
        self.subject = text.into();
    }

    /// Open `path` and return the navigation the host should perform.
    ///
    /// On failure the previously open document (if any) stays open unchanged.
    pub fn load(&mut self, path: &Path) -> Result<HostCommand> {
        if self.pending.is_some() {
            return Err(EditError::Busy("load a document"));
        }
        let file_path = absolute_html_path(path)?;
        let bytes = std::fs::read(&file_path).map_err(|e| EditError::io(&file_path, e))?;
        let raw_text = charset::decode_document_bytes(&bytes);

        let subject_record = subject::extract(&raw_text);
        let tree = HtmlTree::parse_document(&raw_text);
        if !subject::hide(&tree) {
            debug!("No subject paragraph to hide in the display copy");
        }
        body::prepare_for_editing(&tree, raw::has_body_tag(&raw_text))?;
        let servable = charset::normalize_charset_to_utf8(&tree.to_html());

        let document = EmailDocument::new(file_path, raw_text, servable, subject_record);
        self.subject = document
            .subject()
            .display_text(&self.options.subject_placeholder)
            .to_string();
        info!(
            path = %document.file_path().display(),
            subject_found = document.subject().is_found(),
            "Loaded document"
        );
        self.document = Some(document);
        self.state = PipelineState::Loaded;
        self.navigation += 1;

        Ok(HostCommand::Navigate(host::navigation_url(
            &self.options.virtual_host,
            &self.options.editor_page,
            chrono::Utc::now().timestamp_millis(),
        )))
    }

    /// React to a host event.
    ///
    /// A successful navigation is answered with the paste hook, once per
    /// navigation. A script result completes a pending save.
    pub fn handle_event(&mut self, event: HostEvent) -> Result<HostReaction> {
        match event {
            HostEvent::NavigationCompleted { success: false } => {
                warn!("Editor navigation failed");
                Ok(HostReaction::Idle)
            }
            HostEvent::NavigationCompleted { success: true } => {
                if self.document.is_none() || self.hooked_navigation == Some(self.navigation) {
                    return Ok(HostReaction::Idle);
                }
                self.hooked_navigation = Some(self.navigation);
                Ok(HostReaction::Send(HostCommand::ExecuteScript(
                    host::PASTE_HOOK_SCRIPT.to_string(),
                )))
            }
            HostEvent::ScriptResult(raw) => {
                if self.pending.is_none() {
                    return Ok(HostReaction::Idle);
                }
                Ok(match self.complete_save(&raw)? {
                    SaveOutcome::Retry(cmd) => HostReaction::Send(cmd),
                    SaveOutcome::Done(report) => HostReaction::Saved(report),
                })
            }
        }
    }

    /// Start saving to `target` (the current file when `None`).
    ///
    /// Returns the serialization request for the host; its answer goes to
    /// [`complete_save`](Self::complete_save).
    pub fn begin_save(&mut self, target: Option<&Path>) -> Result<HostCommand> {
        let document = self.document.as_ref().ok_or(EditError::NotLoaded)?;
        if self.pending.is_some() {
            return Err(EditError::Busy("start another save"));
        }
        let target = match target {
            Some(t) => t.to_path_buf(),
            None => document.file_path().to_path_buf(),
        };
        self.pending = Some(PendingSave {
            target,
            retried: false,
            prior_state: self.state,
        });
        self.state = PipelineState::Saving;
        Ok(HostCommand::ExecuteScript(host::SERIALIZE_SCRIPT.to_string()))
    }

    /// Finish a save with the host's raw script result.
    pub fn complete_save(&mut self, script_result: &str) -> Result<SaveOutcome> {
        let Some(pending) = self.pending.as_mut() else {
            return Err(EditError::NoContent("no save is waiting for editor content".into()));
        };
        let html = host::unwrap_script_result(script_result);

        if !raw::is_probably_html(&html) && !pending.retried {
            debug!("Serialization result is not HTML, asking for plain outerHTML");
            pending.retried = true;
            return Ok(SaveOutcome::Retry(HostCommand::ExecuteScript(
                host::PLAIN_SERIALIZE_SCRIPT.to_string(),
            )));
        }

        let Some(pending) = self.pending.take() else {
            return Err(EditError::NoContent("no save is waiting for editor content".into()));
        };
        self.state = pending.prior_state;
        let report = self.write(&pending.target, &html)?;
        Ok(SaveOutcome::Done(report))
    }

    /// Save an edited serialization the caller already holds.
    pub fn save_html(&mut self, target: &Path, edited_html: &str) -> Result<SaveReport> {
        if self.pending.is_some() {
            return Err(EditError::Busy("save"));
        }
        self.write(target, edited_html)
    }

    /// Answer a virtual resource request from the host.
    pub fn respond(&self, uri: &str) -> Option<ResourceResponse> {
        let document = self.document.as_ref()?;
        resources::respond(
            document,
            &self.options.virtual_host,
            &self.options.editor_page,
            uri,
        )
    }

    fn write(&mut self, target: &Path, edited_html: &str) -> Result<SaveReport> {
        let document = self.document.as_ref().ok_or(EditError::NotLoaded)?;
        if !raw::is_probably_html(edited_html) {
            return Err(EditError::NoContent("the editor did not return HTML".into()));
        }

        let target = absolute_html_path(target)?;
        let folder_name = asset_folder_name(&target);
        let asset_dir = document_dir(&target).join(&folder_name);
        let source = SourceLocation {
            document_dir: document.document_dir(),
            asset_dir: document.asset_dir(),
            virtual_prefix: self.options.virtual_prefix(),
        };

        let fragment = HtmlTree::parse_body_fragment(&body::extract_edited(edited_html));
        strip_editing_artifacts(&fragment);

        let store = AssetStore::open(&asset_dir, folder_name)
            .with_reuse_identical(self.options.reuse_identical_images);
        let resolved = AssetResolver::new(store, &source).resolve(&fragment);
        let mut warnings = resolved.failures;

        if self.options.copy_non_image_files {
            let copied = mirror_non_image_files(&source.asset_dir, &asset_dir);
            debug!(copied, "Mirrored non-image asset files");
        }
        if self.options.write_manifest {
            if let Err(e) = manifest::write_manifest(&asset_dir, &target, &resolved.used) {
                warnings.push(e);
            }
        }

        let write_subject =
            document.subject().is_found() || self.subject != self.options.subject_placeholder;
        if !write_subject && subject::reveal(&fragment) {
            debug!("Restored a hidden paragraph with no subject to write");
        }
        let mut body_html = fragment.body_inner_html();
        if write_subject {
            body_html = subject::apply_to_body(&body_html, &self.subject);
        }

        let merged = match merge::merge_body(document.original_raw(), &body_html) {
            Ok(merged) => merged,
            Err(e) => {
                warn!(error = %e, "Writing a minimal document instead");
                warnings.push(e);
                merge::fallback_shell(&body_html)
            }
        };
        let final_html = charset::normalize_charset_to_utf8(&merged);
        std::fs::write(&target, final_html.as_bytes()).map_err(|e| EditError::io(&target, e))?;

        let report = SaveReport {
            path: target.clone(),
            asset_dir,
            used_files: resolved.used,
            image_count: resolved.references.len(),
            warnings,
            bytes_written: final_html.len() as u64,
        };
        if let Some(document) = self.document.as_mut() {
            document.relocate(target);
        }
        self.state = PipelineState::Saved;
        info!(
            path = %report.path.display(),
            images = report.image_count,
            warnings = report.warnings.len(),
            "Saved document"
        );
        Ok(report)
    }
}

/// Drop what editing added to elements: `contenteditable` and the style that
/// came with it.
fn strip_editing_artifacts(tree: &HtmlTree) {
    for node in tree.elements() {
        if dom::has_attr(&node, "contenteditable") {
            dom::remove_attr(&node, "contenteditable");
            dom::remove_attr(&node, "style");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "<html><head><meta http-equiv=Content-Type content=\"text/html; charset=windows-1252\">\
</head><body lang=EN-US><div class=WordSection1><p class=MsoNormal><b>From:</b> A</p>\
<p class=MsoNormal><b><span>Subject:<span style='mso-tab-count:1'></span></span></b><span>Hello<o:p></o:p></span></p>\
<p class=MsoNormal>Body text</p></div></body></html>";

    fn loaded(dir: &Path) -> EditPipeline {
        let path = dir.join("mail.htm");
        std::fs::write(&path, DOC).unwrap();
        let mut pipeline = EditPipeline::new(PipelineOptions::default());
        pipeline.load(&path).unwrap();
        pipeline
    }

    #[test]
    fn test_load_populates_subject_and_display_copy() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = loaded(tmp.path());
        assert_eq!(pipeline.state(), PipelineState::Loaded);
        assert_eq!(pipeline.subject(), "Hello");
        let servable = pipeline.document().unwrap().servable_html();
        assert!(servable.contains("<!--EDITOR_BODY_START-->"));
        assert!(servable.contains("data-subject-para=\"true\""));
        assert!(servable.contains("charset=utf-8"));
        assert_eq!(pipeline.document().unwrap().original_raw(), DOC);
    }

    #[test]
    fn test_failed_load_keeps_previous_document() {
        let tmp = tempfile::tempdir().unwrap();
        let mut pipeline = loaded(tmp.path());
        let err = pipeline.load(&tmp.path().join("missing.htm")).unwrap_err();
        assert!(matches!(err, EditError::Io { .. }));
        assert!(pipeline.document().unwrap().file_path().ends_with("mail.htm"));
        assert_eq!(pipeline.state(), PipelineState::Loaded);
    }

    #[test]
    fn test_paste_hook_once_per_navigation() {
        let tmp = tempfile::tempdir().unwrap();
        let mut pipeline = loaded(tmp.path());
        let ok = HostEvent::NavigationCompleted { success: true };
        assert!(matches!(
            pipeline.handle_event(ok.clone()).unwrap(),
            HostReaction::Send(HostCommand::ExecuteScript(_))
        ));
        assert!(matches!(pipeline.handle_event(ok.clone()).unwrap(), HostReaction::Idle));

        pipeline.load(&tmp.path().join("mail.htm")).unwrap();
        assert!(matches!(pipeline.handle_event(ok).unwrap(), HostReaction::Send(_)));
    }

    #[test]
    fn test_save_round_trip_through_host_events() {
        let tmp = tempfile::tempdir().unwrap();
        let mut pipeline = loaded(tmp.path());
        pipeline.set_subject("Changed & new");
        let servable = pipeline.document().unwrap().servable_html().to_string();

        let cmd = pipeline.begin_save(None).unwrap();
        assert_eq!(cmd, HostCommand::ExecuteScript(host::SERIALIZE_SCRIPT.into()));
        assert_eq!(pipeline.state(), PipelineState::Saving);
        assert!(matches!(pipeline.load(&tmp.path().join("mail.htm")), Err(EditError::Busy(_))));
        assert!(matches!(pipeline.begin_save(None), Err(EditError::Busy(_))));

        let reaction = pipeline
            .handle_event(HostEvent::ScriptResult("null".into()))
            .unwrap();
        assert!(matches!(
            reaction,
            HostReaction::Send(HostCommand::ExecuteScript(ref s)) if s == host::PLAIN_SERIALIZE_SCRIPT
        ));

        let encoded = serde_json::to_string(&servable).unwrap();
        let HostReaction::Saved(report) = pipeline.handle_event(HostEvent::ScriptResult(encoded)).unwrap() else {
            panic!("expected a finished save");
        };
        assert!(report.warnings.is_empty());
        assert_eq!(pipeline.state(), PipelineState::Saved);

        let saved = std::fs::read_to_string(tmp.path().join("mail.htm")).unwrap();
        assert!(saved.contains("Changed &amp; new"));
        assert!(!saved.contains("EDITOR_BODY"));
        assert!(!saved.contains("contenteditable"));
        assert!(saved.contains("charset=utf-8"));
        assert!(saved.starts_with("<html><head>"));
    }

    #[test]
    fn test_no_content_after_retry_touches_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let mut pipeline = loaded(tmp.path());
        pipeline.begin_save(Some(&tmp.path().join("out.htm"))).unwrap();
        assert!(matches!(pipeline.complete_save("\"\"").unwrap(), SaveOutcome::Retry(_)));
        let err = pipeline.complete_save("undefined").unwrap_err();
        assert!(matches!(err, EditError::NoContent(_)));
        assert!(!tmp.path().join("out.htm").exists());
        assert_eq!(pipeline.state(), PipelineState::Loaded);
    }

    #[test]
    fn test_save_requires_document() {
        let tmp = tempfile::tempdir().unwrap();
        let mut pipeline = EditPipeline::new(PipelineOptions::default());
        assert!(matches!(pipeline.begin_save(None), Err(EditError::NotLoaded)));
        assert!(matches!(
            pipeline.save_html(&tmp.path().join("x.htm"), "<html><body></body></html>"),
            Err(EditError::NotLoaded)
        ));
        assert!(pipeline.respond("http://email.content/editor.html").is_none());
    }

    #[test]
    fn test_placeholder_subject_not_injected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("plain.htm");
        std::fs::write(&path, "<html><body><p>No header here</p></body></html>").unwrap();
        let mut pipeline = EditPipeline::new(PipelineOptions::default());
        pipeline.load(&path).unwrap();
        assert_eq!(pipeline.subject(), SUBJECT_NOT_FOUND);

        let edited = pipeline.document().unwrap().servable_html().to_string();
        pipeline.save_html(&path, &edited).unwrap();
        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(!saved.contains("Subject:"));
        assert!(saved.contains("<p>No header here</p>"));
    }

    #[test]
    fn test_strip_editing_artifacts() {
        let tree = HtmlTree::parse_body_fragment(
            r#"<div contenteditable="true" style="outline:none"><p style="color:red">x</p></div>"#,
        );
        strip_editing_artifacts(&tree);
        assert_eq!(tree.body_inner_html(), r#"<div><p style="color:red">x</p></div>"#);
    }
}
