//! Image references found in an email body and the file-type tables around them.
//!
//! Nothing here touches the disk. Resolution happens in
//! [`assets::resolver`](crate::assets::resolver).

use markup5ever_rcdom::Handle;

/// Extensions (lowercase, without dot) treated as image files in the asset folder.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "webp", "tif", "tiff", "ico", "emf", "wmf",
];

/// Attribute that carries an image reference.
///
/// VML `imagedata` elements use whichever of these the Office version
/// emitted; the first present in declaration order wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceAttr {
    /// Plain `src` (standard `<img>`, and some VML).
    Src,
    /// `v:src` on VML `imagedata`.
    VmlSrc,
    /// `o:href` on VML `imagedata`.
    OfficeHref,
}

impl SourceAttr {
    /// Priority order for VML `imagedata` elements.
    pub const VML_PRIORITY: [SourceAttr; 3] =
        [SourceAttr::Src, SourceAttr::VmlSrc, SourceAttr::OfficeHref];

    /// Attribute name as it appears in markup.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Src => "src",
            Self::VmlSrc => "v:src",
            Self::OfficeHref => "o:href",
        }
    }
}

/// One image-bearing element in a body fragment.
#[derive(Debug, Clone)]
pub struct AssetReference {
    /// The owning element.
    pub node: Handle,
    /// Which attribute holds the reference.
    pub attribute: SourceAttr,
    /// The reference as found (data URL, virtual-host URL, or path).
    pub original_value: String,
    /// File name inside the target asset folder once resolved.
    pub resolved_file_name: Option<String>,
}

/// Whether an element name is a VML `imagedata`, in any namespace prefix.
pub fn is_vml_imagedata(name: &str) -> bool {
    name.eq_ignore_ascii_case("imagedata")
        || name
            .rsplit_once(':')
            .is_some_and(|(_, local)| local.eq_ignore_ascii_case("imagedata"))
}

/// Whether a file name has one of the [`IMAGE_EXTENSIONS`].
pub fn is_image_file_name(name: &str) -> bool {
    extension_of(name).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// MIME type served for an asset file, by extension.
pub fn mime_for_file_name(name: &str) -> &'static str {
    match extension_of(name).as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

/// File extension (with dot) for a data URL header such as `data:image/jpeg;base64`.
pub fn extension_for_data_header(header: &str) -> &'static str {
    let header = header.to_ascii_lowercase();
    if header.contains("image/jpeg") {
        ".jpg"
    } else if header.contains("image/gif") {
        ".gif"
    } else if header.contains("image/bmp") {
        ".bmp"
    } else if header.contains("image/webp") {
        ".webp"
    } else {
        ".png"
    }
}

fn extension_of(name: &str) -> Option<String> {
    std::path::Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}
