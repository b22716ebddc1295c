//! Message contract with the rich-text editing host.
//!
//! The host is a browser surface that renders the display document and runs
//! scripts on request. The pipeline never calls into it directly: it returns
//! [`HostCommand`]s for the caller to forward and consumes the [`HostEvent`]s
//! the host reports back.

use serde_json::Value;

/// Installs paste/drop handlers that turn dropped or pasted image files into
/// inline data-URL `<img>` elements. Guarded against double installation.
pub const PASTE_HOOK_SCRIPT: &str = include_str!("scripts/paste_hook.js");

/// Converts `blob:` images to data URLs, then returns the full document markup.
pub const SERIALIZE_SCRIPT: &str = include_str!("scripts/serialize.js");

/// Plain serialization, used when [`SERIALIZE_SCRIPT`] returns nothing usable.
pub const PLAIN_SERIALIZE_SCRIPT: &str = "document.documentElement.outerHTML";

/// Something the pipeline asks the host to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    /// Load this URL (the editor page on the virtual host).
    Navigate(String),
    /// Run a script. For serialization requests the result comes back as
    /// [`HostEvent::ScriptResult`].
    ExecuteScript(String),
}

/// Something the host reports to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    NavigationCompleted { success: bool },
    /// Raw (JSON-encoded) result of the last requested script.
    ScriptResult(String),
}

/// A standard rich-text formatting command, run fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatCommand {
    Bold,
    Italic,
    Underline,
    FontName(String),
    /// Size in points; mapped onto the 1..=7 scale of `execCommand`.
    FontSize(u32),
    JustifyLeft,
    JustifyCenter,
    JustifyRight,
    Undo,
    Redo,
    ForeColor { r: u8, g: u8, b: u8 },
}

impl FormatCommand {
    /// `execCommand` name.
    pub fn command_name(&self) -> &'static str {
        match self {
            Self::Bold => "bold",
            Self::Italic => "italic",
            Self::Underline => "underline",
            Self::FontName(_) => "fontName",
            Self::FontSize(_) => "fontSize",
            Self::JustifyLeft => "justifyLeft",
            Self::JustifyCenter => "justifyCenter",
            Self::JustifyRight => "justifyRight",
            Self::Undo => "undo",
            Self::Redo => "redo",
            Self::ForeColor { .. } => "foreColor",
        }
    }

    /// Argument passed to `execCommand`, if any.
    pub fn argument(&self) -> Option<String> {
        match self {
            Self::FontName(name) => Some(name.clone()),
            Self::FontSize(points) => Some(html_font_size(*points).to_string()),
            Self::ForeColor { r, g, b } => Some(format!("#{r:02X}{g:02X}{b:02X}")),
            _ => None,
        }
    }

    /// The script the host runs for this command.
    pub fn script(&self) -> String {
        let name = Value::from(self.command_name());
        let arg = self.argument().map_or(Value::Null, Value::from);
        format!("document.execCommand({name}, false, {arg});")
    }

    pub fn to_host_command(&self) -> HostCommand {
        HostCommand::ExecuteScript(self.script())
    }
}

/// Map a point size onto the HTML font size scale (1..=7). Unlisted sizes map to 3.
pub fn html_font_size(points: u32) -> u8 {
    match points {
        8 => 1,
        10 => 2,
        12 => 3,
        14 => 4,
        18 => 5,
        24 => 6,
        36 => 7,
        _ => 3,
    }
}

/// Decode the value the host returned for a script.
///
/// Hosts hand results back JSON-encoded. `null`, `undefined` and empty
/// results become an empty string; a JSON string literal is unescaped;
/// anything else is returned trimmed as it is.
pub fn unwrap_script_result(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("null")
        || trimmed.eq_ignore_ascii_case("undefined")
    {
        return String::new();
    }
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        if let Ok(s) = serde_json::from_str::<String>(trimmed) {
            return s;
        }
        tracing::debug!("Script result looks quoted but is not valid JSON, using it raw");
    }
    trimmed.to_string()
}

/// URL of the editor page, with a cache-busting timestamp.
pub fn navigation_url(virtual_host: &str, editor_page: &str, stamp_millis: i64) -> String {
    format!("http://{virtual_host}/{editor_page}?t={stamp_millis}")
}
