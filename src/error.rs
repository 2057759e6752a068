//! Error Type Definition Module
//!
//! This module defines the errors that can surface while opening a book container,
//! parsing an EPUB package or decoding a chapter. Everything is wrapped in the
//! [EbookError] enumeration so callers only have to match one type.
//!
//! ## Main Error Types
//!
//! - [EbookError] - Enumeration of all errors surfaced by this crate
//! - [ParseFailure] - Failures that describe unreadable book content, either
//!   a whole container or a single chapter

use thiserror::Error;

/// Types of errors that can occur while ingesting a book
///
/// Only [EbookError::ContainerUnavailable], [EbookError::ParseFailure] and
/// [EbookError::IndexOutOfRange] escape the public operations. The structural
/// variants are produced while a single parse attempt runs and are folded into
/// [ParseFailure::Corrupt] once every configured encoding has been tried.
#[derive(Debug, Error)]
pub enum EbookError {
    /// ZIP archive related errors
    ///
    /// Errors occur when processing the ZIP structure of EPUB files,
    /// such as file corruption, unreadability, etc.
    #[error("Archive error: {source}")]
    ArchiveError { source: zip::result::ZipError },

    /// The location reference could not be turned into a byte stream
    ///
    /// Raised by the container opener for missing files, unreadable content
    /// handles and schemes the host resolver does not know about.
    #[error("Container unavailable: Unable to open \"{location}\": {source}")]
    ContainerUnavailable {
        location: String,
        source: std::io::Error,
    },

    /// Data Decoding Error - Null data
    ///
    /// This error occurs when trying to parse an empty XML document.
    #[error("Decode error: The data is empty.")]
    EmptyDataError,

    /// Chapter index error
    ///
    /// The requested chapter index is not in `[0, count)`.
    #[error("Index out of range: Chapter {index} does not exist, the book has {count} chapters.")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("IO error: {source}")]
    IOError { source: std::io::Error },

    /// Missing required attribute error
    ///
    /// Triggered when an XML element in an EPUB file lacks an attribute
    /// this crate needs to build the chapter list.
    #[error(
        "Missing required attribute: The \"{attribute}\" attribute is a must attribute for the \"{tag}\" element."
    )]
    MissingRequiredAttribute { tag: String, attribute: String },

    /// Non-canonical EPUB structure error
    ///
    /// This error occurs when an EPUB file lacks a file that is required
    /// to locate the package document.
    #[error("Non-canonical epub: The \"{expected_file}\" file was not found.")]
    NonCanonicalEpub { expected_file: String },

    /// Non-canonical file structure error
    ///
    /// This error is triggered when the required XML elements are missing
    /// from the container or package document.
    #[error("Non-canonical file: The \"{tag}\" elements was not found.")]
    NonCanonicalFile { tag: String },

    /// Book content could not be parsed or decoded
    #[error("Parse failure: {source}")]
    ParseFailure { source: ParseFailure },

    /// Unable to find the resource error
    ///
    /// This error occurs when a chapter declared in the spine has no
    /// matching entry in the container.
    #[error("Resource not found: Unable to find resource from \"{resource}\".")]
    ResourceNotFound { resource: String },

    /// Unusable compression method error
    ///
    /// This error occurs when an EPUB file uses an unsupported compression method.
    #[error(
        "Unusable compression method: The \"{file}\" file uses the unsupported \"{method}\" compression method."
    )]
    UnusableCompressionMethod { file: String, method: String },

    /// QuickXml error
    ///
    /// This error occurs when parsing XML data using the QuickXml library.
    #[error("QuickXml error: {source}")]
    QuickXmlError { source: quick_xml::Error },
}

impl EbookError {
    /// Shorthand for a [ParseFailure::Corrupt] wrapped in [EbookError]
    pub fn corrupt(reason: impl Into<String>) -> Self {
        EbookError::ParseFailure {
            source: ParseFailure::Corrupt {
                reason: reason.into(),
            },
        }
    }

    /// Returns `true` if this error only concerns one chapter or text unit
    ///
    /// Such errors are rendered as an inline error fragment; every other
    /// error invalidates the whole book.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            EbookError::ParseFailure {
                source: ParseFailure::EncodingError { .. } | ParseFailure::Encrypted { .. }
            } | EbookError::ResourceNotFound { .. }
                | EbookError::IndexOutOfRange { .. }
        )
    }
}

impl From<ParseFailure> for EbookError {
    fn from(value: ParseFailure) -> Self {
        EbookError::ParseFailure { source: value }
    }
}

impl From<zip::result::ZipError> for EbookError {
    fn from(value: zip::result::ZipError) -> Self {
        EbookError::ArchiveError { source: value }
    }
}

impl From<quick_xml::Error> for EbookError {
    fn from(value: quick_xml::Error) -> Self {
        EbookError::QuickXmlError { source: value }
    }
}

impl From<std::io::Error> for EbookError {
    fn from(value: std::io::Error) -> Self {
        EbookError::IOError { source: value }
    }
}

/// Types of failures describing unreadable book content
///
/// `Corrupt` invalidates a whole container. `EncodingError` and `Encrypted`
/// only ever concern one chapter or one text document; the rest of the book
/// stays readable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseFailure {
    /// The container is structurally unreadable after all encoding fallbacks
    #[error("Corrupt container: {reason}")]
    Corrupt { reason: String },

    /// The bytes of `target` are not valid in the expected encoding
    #[error("Encoding error: \"{target}\" is not valid {encoding}.")]
    EncodingError { target: String, encoding: String },

    /// The resource is declared as encrypted in `META-INF/encryption.xml`
    #[error("Encrypted resource: \"{resource}\" is protected and cannot be read.")]
    Encrypted { resource: String },
}
