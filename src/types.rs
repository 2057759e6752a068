use std::fmt;

/// The document formats understood by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentFormat {
    Epub,
    Rtf,
    Text,
}

impl DocumentFormat {
    /// Guesses the format of a document from its location reference
    ///
    /// References ending in `txt` are plain text and references ending in `rtf`
    /// are RTF, compared case-insensitively. Everything else is treated as EPUB,
    /// which is also what content handles without a recognizable suffix fall back to.
    pub fn from_reference(reference: &str) -> Self {
        let lower = reference.to_ascii_lowercase();
        if lower.ends_with("txt") {
            DocumentFormat::Text
        } else if lower.ends_with("rtf") {
            DocumentFormat::Rtf
        } else {
            DocumentFormat::Epub
        }
    }
}

/// Represents a metadata item in the EPUB publication
///
/// Only Dublin Core elements are collected. The `property` is the local name
/// of the element, such as `title`, `creator` or `language`.
#[derive(Debug, Clone)]
pub struct MetadataItem {
    /// Optional unique identifier for this metadata item
    pub id: Option<String>,

    /// The metadata property name
    pub property: String,

    /// The metadata value, with whitespace normalized
    pub value: String,

    /// Optional language code for this metadata item
    pub lang: Option<String>,
}

/// Represents a resource item declared in the EPUB manifest
#[derive(Debug, Clone)]
pub struct ManifestItem {
    /// The manifest id of the resource
    pub id: String,

    /// The path of the resource relative to the root of the container
    ///
    /// The declared href is joined with the directory of the package document
    /// and normalized, but percent-escapes are kept as declared. Lookups go
    /// through the resource table strategies to match the stored entry.
    pub path: String,

    /// The media type of the resource
    pub mime: String,

    /// Optional space-separated properties, e.g. `cover-image` or `nav`
    pub properties: Option<String>,
}

impl ManifestItem {
    /// Returns `true` if the given property is present in `properties`
    pub fn has_property(&self, property: &str) -> bool {
        self.properties
            .as_deref()
            .is_some_and(|properties| properties.split_whitespace().any(|p| p == property))
    }

    /// Returns `true` if the declared media type is an image type
    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }
}

/// Represents an item in the EPUB spine
///
/// The spine defines the reading order; each entry references a manifest item.
#[derive(Debug, Clone)]
pub struct SpineItem {
    /// The ID reference to a manifest item
    pub idref: String,

    /// Indicates whether this item is part of the linear reading order
    pub linear: bool,
}

/// Represents one entry of `META-INF/encryption.xml`
#[derive(Debug, Clone)]
pub struct EncryptionData {
    /// The encryption algorithm URI
    pub method: String,

    /// The container path of the encrypted resource
    pub data: String,
}

impl EncryptionData {
    /// Returns `true` for the font obfuscation algorithms
    ///
    /// Obfuscated fonts are not DRM; the rest of the resource is readable and
    /// the book opens normally.
    pub fn is_font_obfuscation(&self) -> bool {
        matches!(
            self.method.as_str(),
            "http://www.idpf.org/2008/embedding" | "http://ns.adobe.com/pdf/enc#RC"
        )
    }
}

/// A self-contained HTML document ready to hand to the reading surface
///
/// Fragments are returned by value and never reference the container they
/// were produced from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFragment {
    html: String,
    is_error: bool,
}

impl RenderedFragment {
    pub(crate) fn new(html: String) -> Self {
        Self {
            html,
            is_error: false,
        }
    }

    pub(crate) fn error(html: String) -> Self {
        Self {
            html,
            is_error: true,
        }
    }

    /// The HTML text of the fragment
    pub fn as_str(&self) -> &str {
        &self.html
    }

    /// Returns `true` if this fragment is a fixed error message instead of content
    pub fn is_error(&self) -> bool {
        self.is_error
    }

    pub fn into_string(self) -> String {
        self.html
    }
}

impl fmt::Display for RenderedFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.html)
    }
}

impl AsRef<str> for RenderedFragment {
    fn as_ref(&self) -> &str {
        &self.html
    }
}
