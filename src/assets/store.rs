//! The target asset folder for one save.
//!
//! A store is created fresh for every save. It picks names for newly pasted
//! images, imports existing files, and records which file names the saved
//! body references. Files are never deleted from the folder.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{EditError, Result};
use crate::model::asset::is_image_file_name;

static NEW_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^new_image(\d{3,})\.").expect("valid new_image regex"));

/// File names referenced by a saved document, compared case-insensitively.
///
/// Iteration is sorted case-insensitively, which is the manifest order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsedFiles {
    names: BTreeMap<String, String>,
}

impl UsedFiles {
    /// Record a file name. The first spelling seen is kept.
    pub fn insert(&mut self, name: &str) -> bool {
        let key = name.to_lowercase();
        if self.names.contains_key(&key) {
            return false;
        }
        self.names.insert(key, name.to_string());
        true
    }

    /// Whether a name is already recorded, ignoring case.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in case-insensitive order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.values().map(String::as_str)
    }

    /// Only the names with an image extension, in manifest order.
    pub fn images(&self) -> impl Iterator<Item = &str> {
        self.iter().filter(|n| is_image_file_name(n))
    }
}

/// The `<name>_files` folder a save writes into.
#[derive(Debug)]
pub struct AssetStore {
    dir: PathBuf,
    folder_name: String,
    next_counter: u32,
    reuse_identical: bool,
    used: UsedFiles,
}

impl AssetStore {
    /// Open the store for `dir`, scanning it for the next free `new_image` number.
    pub fn open(dir: impl Into<PathBuf>, folder_name: impl Into<String>) -> Self {
        let dir = dir.into();
        let next_counter = next_new_image_counter(&dir);
        Self {
            dir,
            folder_name: folder_name.into(),
            next_counter,
            reuse_identical: true,
            used: UsedFiles::default(),
        }
    }

    /// Whether pasted images identical to an existing `new_image` file reuse it.
    pub fn with_reuse_identical(mut self, reuse: bool) -> Self {
        self.reuse_identical = reuse;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn folder_name(&self) -> &str {
        &self.folder_name
    }

    /// Create the folder if it does not exist yet.
    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| EditError::io(&self.dir, e))
    }

    /// Reference written into the saved HTML for a stored file.
    pub fn relative_reference(&self, file_name: &str) -> String {
        format!("{}/{}", self.folder_name, file_name)
    }

    /// Mark a file name as referenced by the saved document.
    pub fn mark_used(&mut self, file_name: &str) {
        self.used.insert(file_name);
    }

    pub fn used(&self) -> &UsedFiles {
        &self.used
    }

    pub fn into_used(self) -> UsedFiles {
        self.used
    }

    /// Write the bytes of a pasted image under a fresh `new_image###` name.
    ///
    /// `ext` includes the dot. Returns the file name used.
    pub fn persist_new_image(&mut self, ext: &str, bytes: &[u8]) -> Result<String> {
        if self.reuse_identical {
            if let Some(existing) = self.find_identical(ext, bytes) {
                debug!(file = %existing, "Pasted image matches an existing file, reusing it");
                return Ok(existing);
            }
        }

        let mut name = new_image_name(self.next_counter, ext);
        while self.dir.join(&name).exists() || self.used.contains(&name) {
            self.next_counter = self
                .next_counter
                .checked_add(1)
                .ok_or_else(|| EditError::asset(&name, "no free new_image number left"))?;
            name = new_image_name(self.next_counter, ext);
        }

        let path = self.dir.join(&name);
        std::fs::write(&path, bytes).map_err(|e| EditError::io(&path, e))?;
        self.next_counter = self.next_counter.saturating_add(1);
        debug!(file = %name, size = bytes.len(), "Persisted pasted image");
        Ok(name)
    }

    /// Bring an existing file into the store, copying it unless it already
    /// lives there. Returns its file name.
    pub fn import_file(&self, source: &Path) -> Result<String> {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| EditError::InvalidPath(source.display().to_string()))?;
        let dest = self.dir.join(&name);

        if !same_file(source, &dest) {
            std::fs::copy(source, &dest).map_err(|e| EditError::io(&dest, e))?;
            debug!(from = %source.display(), to = %dest.display(), "Copied image into asset folder");
        }
        Ok(name)
    }

    /// An existing `new_image###<ext>` file with exactly these bytes.
    fn find_identical(&self, ext: &str, bytes: &[u8]) -> Option<String> {
        let entries = std::fs::read_dir(&self.dir).ok()?;
        let wanted = Sha256::digest(bytes);
        let ext_lower = ext.to_ascii_lowercase();

        let mut candidates: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.metadata().map(|m| m.len() == bytes.len() as u64).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| NEW_IMAGE.is_match(n) && n.to_ascii_lowercase().ends_with(&ext_lower))
            .collect();
        candidates.sort();

        candidates.into_iter().find(|name| {
            std::fs::read(self.dir.join(name))
                .map(|existing| Sha256::digest(&existing) == wanted)
                .unwrap_or(false)
        })
    }
}

/// Smallest `new_image` number above every existing one in `dir`
/// (`0` when there are none or the folder does not exist). Saturates at
/// `u32::MAX`.
pub fn next_new_image_counter(dir: &Path) -> u32 {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            NEW_IMAGE
                .captures(&name)
                .and_then(|c| c[1].parse::<u32>().ok())
        })
        .max()
        .map_or(0, |max| max.saturating_add(1))
}

fn new_image_name(counter: u32, ext: &str) -> String {
    format!("new_image{counter:03}{ext}")
}

/// Copy every non-image file from `source_dir` into `target_dir`,
/// overwriting same-named files. Failures are logged and skipped.
///
/// Returns the number of files copied.
pub fn mirror_non_image_files(source_dir: &Path, target_dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(source_dir) else {
        return 0;
    };
    if same_file(source_dir, target_dir) {
        return 0;
    }
    if let Err(e) = std::fs::create_dir_all(target_dir) {
        warn!(dir = %target_dir.display(), error = %e, "Could not create asset folder");
        return 0;
    }

    let mut copied = 0;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name();
        if is_image_file_name(&name.to_string_lossy()) {
            continue;
        }
        let dest = target_dir.join(&name);
        match std::fs::copy(&path, &dest) {
            Ok(_) => copied += 1,
            Err(e) => warn!(
                file = %path.display(),
                error = %e,
                "Failed to copy asset file"
            ),
        }
    }
    copied
}

/// Whether two paths name the same existing file or directory.
pub fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
