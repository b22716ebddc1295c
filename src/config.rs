//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$HTMEDIT_CONFIG` (environment variable)
//! 2. `~/.config/htmedit/config.toml` (Linux/macOS)
//!    `%APPDATA%\htmedit\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::subject::SUBJECT_NOT_FOUND;
use crate::pipeline::PipelineOptions;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Editing host settings.
    pub editor: EditorConfig,
    /// What a save writes besides the HTML file.
    pub save: SaveConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Override cache directory for logs.
    pub cache_dir: Option<PathBuf>,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
}

/// Editing host settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Host name of the virtual origin the document is served from.
    pub virtual_host: String,
    /// Path of the editor page on the virtual host.
    pub editor_page: String,
    /// Subject text shown when a document has no subject paragraph.
    pub subject_placeholder: String,
}

/// Save behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    /// Copy non-image files (theme data, color maps) into the target `_files` folder.
    pub copy_non_image_files: bool,
    /// Regenerate `filelist.xml` on every save.
    pub write_manifest: bool,
    /// Reuse an existing `new_image` file when a pasted image has the same bytes.
    pub reuse_identical_images: bool,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            log_level: "warn".to_string(),
        }
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            virtual_host: "email.content".to_string(),
            editor_page: "editor.html".to_string(),
            subject_placeholder: SUBJECT_NOT_FOUND.to_string(),
        }
    }
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            copy_non_image_files: true,
            write_manifest: true,
            reuse_identical_images: true,
        }
    }
}

impl From<&Config> for PipelineOptions {
    fn from(config: &Config) -> Self {
        Self {
            virtual_host: config.editor.virtual_host.clone(),
            editor_page: config.editor.editor_page.clone(),
            subject_placeholder: config.editor.subject_placeholder.clone(),
            copy_non_image_files: config.save.copy_non_image_files,
            write_manifest: config.save.write_manifest,
            reuse_identical_images: config.save.reuse_identical_images,
        }
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Save configuration to the standard location and return the path written.
pub fn save_config(config: &Config) -> anyhow::Result<PathBuf> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;
    write_config(config, &path)?;
    Ok(path)
}

/// Write configuration as TOML to `path`, creating parent directories.
pub fn write_config(config: &Config, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("HTMEDIT_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("htmedit").join("config.toml"))
}

/// Return the cache directory for logs.
pub fn cache_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.cache_dir {
        return dir.clone();
    }
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("htmedit")
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    cache_dir(config).join("htmedit.log")
}
