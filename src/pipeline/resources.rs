//! Virtual resource protocol: the host loads the editor page and every
//! asset it references from `http://<virtual_host>/…`, and these requests
//! are answered from memory and from the document's folder.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::model::asset::mime_for_file_name;
use crate::model::document::EmailDocument;

/// Body and content type of a served virtual resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceResponse {
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Answer one request. `None` is the "not found" response.
pub fn respond(
    document: &EmailDocument,
    virtual_host: &str,
    editor_page: &str,
    uri: &str,
) -> Option<ResourceResponse> {
    let prefix = format!("http://{virtual_host}/");
    let rest = strip_prefix_ci(uri, &prefix)?;
    let path = rest.split(['?', '#']).next().unwrap_or(rest);

    if path.eq_ignore_ascii_case(editor_page) {
        return Some(ResourceResponse {
            content_type: "text/html".into(),
            body: document.servable_html().as_bytes().to_vec(),
        });
    }

    let decoded = urlencoding::decode(path).ok()?.into_owned();
    let file = locate(document, &decoded)?;
    match std::fs::read(&file) {
        Ok(body) => {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Some(ResourceResponse {
                content_type: mime_for_file_name(&name).into(),
                body,
            })
        }
        Err(e) => {
            warn!(path = %file.display(), error = %e, "Failed to read virtual resource");
            None
        }
    }
}

fn locate(document: &EmailDocument, decoded: &str) -> Option<PathBuf> {
    let parts: Vec<&str> = decoded
        .split(['/', '\\'])
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();
    if parts.is_empty() || parts.contains(&"..") {
        debug!(path = %decoded, "Refusing virtual resource path");
        return None;
    }

    let direct = parts
        .iter()
        .fold(document.document_dir(), |path, part| path.join(part));
    if direct.is_file() {
        return Some(direct);
    }

    let fallback = document.asset_dir().join(parts[parts.len() - 1]);
    if fallback.is_file() {
        return Some(fallback);
    }
    debug!(path = %decoded, "Virtual resource not found");
    None
}

fn strip_prefix_ci<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}
