use std::{
    borrow::Cow,
    collections::HashMap,
    io::{Read, Seek},
};

use encoding_rs::Encoding;
use indexmap::IndexMap;
use percent_encoding::percent_decode_str;
use quick_xml::{NsReader, escape::unescape, events::Event};
use zip::{CompressionMethod, ZipArchive};

use crate::error::{EbookError, ParseFailure};

/// Reads every file entry of a ZIP archive into memory
///
/// Entries are keyed by their stored name and kept in archive order. Directory
/// entries are skipped.
///
/// ## Notes
/// - The archive is consumed; no handle stays open after this returns.
/// - Entries with an unsupported compression method fail the whole read,
///   see [compression_method_check].
pub fn read_zip_entries<R: Read + Seek>(
    mut archive: ZipArchive<R>,
) -> Result<IndexMap<String, Vec<u8>>, EbookError> {
    compression_method_check(&mut archive)?;

    let mut entries = IndexMap::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        if file.is_dir() {
            continue;
        }

        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        entries.insert(file.name().to_string(), buffer);
    }

    Ok(entries)
}

/// Checks if the compression method of all entries in the EPUB file
/// is one this crate can inflate.
///
/// According to the OCF specification, EPUB files can only use either Stored
/// (uncompressed) or Deflated. Any other method means the container was not
/// produced by a conforming tool and its entries cannot be read.
pub fn compression_method_check<R: Read + Seek>(
    zip_archive: &mut ZipArchive<R>,
) -> Result<(), EbookError> {
    for index in 0..zip_archive.len() {
        let file = zip_archive.by_index(index)?;

        match file.compression() {
            CompressionMethod::Stored | CompressionMethod::Deflated => continue,
            _ => {
                return Err(EbookError::UnusableCompressionMethod {
                    file: file.name().to_string(),
                    method: file.compression().to_string(),
                });
            }
        };
    }

    Ok(())
}

/// Decodes text bytes strictly with the given encoding
///
/// A byte order mark takes precedence over `encoding`, so UTF-8 and UTF-16
/// documents with a BOM decode correctly regardless of the fallback list.
/// Malformed input is reported as [ParseFailure::EncodingError] for `target`
/// instead of being replaced with U+FFFD.
pub fn decode_text(
    bytes: &[u8],
    encoding: &'static Encoding,
    target: &str,
) -> Result<String, EbookError> {
    let (encoding, bom_length) = Encoding::for_bom(bytes).unwrap_or((encoding, 0));

    match encoding.decode_without_bom_handling_and_without_replacement(&bytes[bom_length..]) {
        Some(text) => Ok(text.into_owned()),
        None => Err(ParseFailure::EncodingError {
            target: target.to_string(),
            encoding: encoding.name().to_string(),
        }
        .into()),
    }
}

/// Percent-decodes a reference, returning `None` when nothing changes
///
/// Sequences that do not decode to UTF-8 keep the reference as it is.
pub fn percent_decode(value: &str) -> Option<String> {
    if !value.contains('%') {
        return None;
    }

    match percent_decode_str(value).decode_utf8() {
        Ok(Cow::Owned(decoded)) if decoded != value => Some(decoded),
        _ => None,
    }
}

/// Escapes the characters that would otherwise be read as markup
pub fn escape_html(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>']) {
        return Cow::Borrowed(text);
    }

    let mut escaped = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    Cow::Owned(escaped)
}

/// Provides functionality for normalizing whitespace characters
///
/// Runs of whitespace become a single space and the ends are trimmed.
pub trait NormalizeWhitespace {
    fn normalize_whitespace(&self) -> String;
}

impl NormalizeWhitespace for &str {
    fn normalize_whitespace(&self) -> String {
        self.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl NormalizeWhitespace for String {
    fn normalize_whitespace(&self) -> String {
        self.as_str().normalize_whitespace()
    }
}

/// Represents an element node in an XML document
#[derive(Debug)]
pub struct XmlElement {
    /// The local name of the element(excluding namespace prefix)
    pub name: String,

    /// The namespace prefix of the element
    pub prefix: Option<String>,

    /// The namespace of the element
    pub namespace: Option<String>,

    /// The attributes of the element, values unescaped
    pub attributes: HashMap<String, String>,

    /// The text content of the element
    pub text: Option<String>,

    /// The children of the element
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// Create a new element
    pub fn new(name: String) -> Self {
        Self {
            name,
            prefix: None,
            namespace: None,
            attributes: HashMap::new(),
            text: None,
            children: Vec::new(),
        }
    }

    /// Get the full tag name of the element
    pub fn tag_name(&self) -> String {
        if let Some(prefix) = &self.prefix {
            format!("{}:{}", prefix, self.name)
        } else {
            self.name.clone()
        }
    }

    /// Gets the text content of the element and all its child elements
    pub fn text(&self) -> String {
        let mut result = String::new();

        if let Some(text_value) = &self.text {
            result.push_str(text_value);
        }

        for child in &self.children {
            result.push_str(&child.text());
        }

        result.trim().to_string()
    }

    /// Returns the value of the specified attribute
    pub fn get_attr(&self, name: &str) -> Option<String> {
        self.attributes.get(name).cloned()
    }

    /// Find all elements with the specified name, depth first, including `self`
    pub fn find_elements_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a XmlElement> + 'a {
        let mut elements = Vec::new();
        Self::collect_elements(self, &mut elements);
        elements.into_iter().filter(move |element| element.name == name)
    }

    /// Get children elements
    pub fn children(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter()
    }

    fn collect_elements<'a>(element: &'a XmlElement, collection: &mut Vec<&'a XmlElement>) {
        collection.push(element);
        for child in &element.children {
            Self::collect_elements(child, collection);
        }
    }
}

/// XML parser used to build an [XmlElement] tree
pub struct XmlReader {}

impl XmlReader {
    /// Parses an XML string and builds the root element
    ///
    /// The content must already be decoded; any `encoding` in the XML
    /// declaration is ignored.
    ///
    /// ## Return
    /// - `Ok(XmlElement)`: The root element of the XML element tree
    /// - `Err(EbookError)`: The document is empty, malformed or has no root element
    pub fn parse(content: &str) -> Result<XmlElement, EbookError> {
        if content.trim().is_empty() {
            return Err(EbookError::EmptyDataError);
        }

        // Text is split around entity references; trimming would eat the spaces next to them
        let mut reader = NsReader::from_str(content);
        reader.config_mut().trim_text(false);

        let mut buf = Vec::new();
        let mut stack = Vec::<XmlElement>::new();
        let mut root = None;
        let mut namespace_map = HashMap::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Eof) => break,

                Ok(Event::Start(e)) => {
                    let element = Self::build_element(
                        e.local_name().as_ref(),
                        e.name().prefix().map(|prefix| prefix.as_ref().to_vec()),
                        e.attributes().flatten().map(|attr| {
                            (
                                String::from_utf8_lossy(attr.key.as_ref()).to_string(),
                                String::from_utf8_lossy(&attr.value).to_string(),
                            )
                        }),
                        &mut namespace_map,
                    );
                    stack.push(element);
                }

                Ok(Event::End(_)) => {
                    if let Some(element) = stack.pop() {
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(element);
                        } else if root.is_none() {
                            root = Some(element);
                        }
                    }
                }

                // Self-closing element
                Ok(Event::Empty(e)) => {
                    let element = Self::build_element(
                        e.local_name().as_ref(),
                        e.name().prefix().map(|prefix| prefix.as_ref().to_vec()),
                        e.attributes().flatten().map(|attr| {
                            (
                                String::from_utf8_lossy(attr.key.as_ref()).to_string(),
                                String::from_utf8_lossy(&attr.value).to_string(),
                            )
                        }),
                        &mut namespace_map,
                    );

                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(element);
                    } else if root.is_none() {
                        root = Some(element);
                    }
                }

                Ok(Event::Text(e)) => {
                    if let Some(element) = stack.last_mut() {
                        let text = String::from_utf8_lossy(e.as_ref());
                        if !text.trim().is_empty() || element.text.is_some() {
                            element.text.get_or_insert_with(String::new).push_str(&text);
                        }
                    }
                }

                Ok(Event::CData(e)) => {
                    if let Some(element) = stack.last_mut() {
                        let text = String::from_utf8_lossy(e.as_ref());
                        element.text.get_or_insert_with(String::new).push_str(&text);
                    }
                }

                // Entity and character references between text runs
                Ok(Event::GeneralRef(e)) => {
                    if let Some(element) = stack.last_mut() {
                        let name = e.decode().map(|name| name.into_owned()).unwrap_or_default();
                        let entity = format!("&{};", name);
                        let resolved = unescape(&entity).map(|text| text.into_owned());
                        element
                            .text
                            .get_or_insert_with(String::new)
                            .push_str(&resolved.unwrap_or(entity));
                    }
                }

                Err(err) => return Err(err.into()),

                // Comment, PI, Declaration, Doctype
                _ => {}
            }

            buf.clear();
        }

        if !stack.is_empty() {
            return Err(EbookError::corrupt("XML document ends inside an open element"));
        }

        let mut root = root.ok_or(EbookError::EmptyDataError)?;
        Self::assign_namespace(&mut root, &namespace_map);
        Ok(root)
    }

    fn build_element(
        local_name: &[u8],
        prefix: Option<Vec<u8>>,
        attributes: impl Iterator<Item = (String, String)>,
        namespace_map: &mut HashMap<String, String>,
    ) -> XmlElement {
        let mut element = XmlElement::new(String::from_utf8_lossy(local_name).to_string());
        element.prefix = prefix.map(|prefix| String::from_utf8_lossy(&prefix).to_string());

        for (attr_key, attr_value) in attributes {
            // Handle namespace attributes
            if attr_key == "xmlns" || attr_key.starts_with("xmlns:") {
                let key = attr_key
                    .split_once(':')
                    .map(|(_, prefix)| prefix.to_string())
                    .unwrap_or(attr_key);
                namespace_map.insert(key, attr_value);
                continue;
            }

            let value = match unescape(&attr_value) {
                Ok(value) => value.into_owned(),
                Err(_) => attr_value,
            };
            element.attributes.insert(attr_key, value);
        }

        element
    }

    /// Assign namespace to element recursively
    fn assign_namespace(element: &mut XmlElement, namespace_map: &HashMap<String, String>) {
        if let Some(prefix) = &element.prefix {
            if let Some(namespace) = namespace_map.get(prefix) {
                element.namespace = Some(namespace.clone());
            }
        } else if let Some(namespace) = namespace_map.get("xmlns") {
            element.namespace = Some(namespace.clone());
        }

        for child in element.children.iter_mut() {
            Self::assign_namespace(child, namespace_map);
        }
    }
}
