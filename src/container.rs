//! Container opener
//!
//! Turns an opaque location reference into the bytes of a book. Local paths and
//! `file://` references are read straight from the filesystem; every other
//! scheme is handed to a host-provided [ContentResolver], which is how content
//! handles of the host platform reach this crate.

use std::{
    fs::File,
    io::{self, BufReader, Cursor, Read},
    path::PathBuf,
};

use encoding_rs::Encoding;
use log::debug;

use crate::{
    config::IngestOptions,
    error::EbookError,
    utils::{decode_text, percent_decode},
};

/// Where a book's bytes live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerLocation {
    /// A path on the local filesystem
    File(PathBuf),

    /// A URI-like handle only the host can resolve, e.g. `content://...`
    Content(String),
}

impl ContainerLocation {
    /// Classifies a location reference
    ///
    /// `file://` references lose their scheme and a `localhost` authority, and
    /// are percent-decoded. A
    /// reference without a `scheme:` prefix is taken as a filesystem path.
    pub fn parse(reference: &str) -> Self {
        if let Some(path) = reference.strip_prefix("file://") {
            let path = path
                .strip_prefix("localhost")
                .filter(|rest| rest.starts_with('/'))
                .unwrap_or(path);
            let path = percent_decode(path).unwrap_or_else(|| path.to_string());
            return ContainerLocation::File(PathBuf::from(path));
        }

        if Self::has_scheme(reference) {
            ContainerLocation::Content(reference.to_string())
        } else {
            ContainerLocation::File(PathBuf::from(reference))
        }
    }

    /// A scheme is at least two characters, so `C:\books` stays a path
    fn has_scheme(reference: &str) -> bool {
        match reference.split_once(':') {
            Some((scheme, _)) => {
                scheme.len() > 1
                    && scheme.starts_with(|ch: char| ch.is_ascii_alphabetic())
                    && scheme
                        .chars()
                        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'))
            }
            None => false,
        }
    }

    fn describe(&self) -> String {
        match self {
            ContainerLocation::File(path) => path.display().to_string(),
            ContainerLocation::Content(uri) => uri.clone(),
        }
    }
}

/// Host hook for opening content handles
///
/// Implementations must be safe to share between threads; each call opens an
/// independent stream.
pub trait ContentResolver: Send + Sync {
    /// Opens the content behind `uri` for reading
    fn open(&self, uri: &str) -> io::Result<Box<dyn Read + Send>>;
}

/// Resolver for hosts without content handles
///
/// Every non-file reference fails with [io::ErrorKind::Unsupported].
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSystemResolver;

impl ContentResolver for FileSystemResolver {
    fn open(&self, uri: &str) -> io::Result<Box<dyn Read + Send>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("no resolver registered for \"{}\"", uri),
        ))
    }
}

/// An opened book: its bytes and the text encoding detected for them
///
/// The bytes are owned; no file handle outlives [BookContainer::open].
#[derive(Debug, Clone)]
pub struct BookContainer {
    data: Vec<u8>,
    encoding: &'static Encoding,
}

impl BookContainer {
    /// Reads the whole content behind `location`
    ///
    /// ## Return
    /// - `Ok(BookContainer)`: The bytes, with the first encoding of
    ///   `options.encodings` that decodes them cleanly (a BOM wins)
    /// - `Err(EbookError::ContainerUnavailable)`: The location could not be read
    pub fn open<C: ContentResolver + ?Sized>(
        location: &ContainerLocation,
        resolver: &C,
        options: &IngestOptions,
    ) -> Result<Self, EbookError> {
        let unavailable = |source: io::Error| EbookError::ContainerUnavailable {
            location: location.describe(),
            source,
        };

        let mut data = Vec::new();
        match location {
            ContainerLocation::File(path) => {
                let file = File::open(path).map_err(unavailable)?;
                BufReader::new(file)
                    .read_to_end(&mut data)
                    .map_err(unavailable)?;
            }
            ContainerLocation::Content(uri) => {
                let mut reader = resolver.open(uri).map_err(unavailable)?;
                reader.read_to_end(&mut data).map_err(unavailable)?;
            }
        }

        debug!("Opened \"{}\" ({} bytes)", location.describe(), data.len());
        Ok(Self::from_bytes(data, options))
    }

    /// Wraps bytes that are already in memory
    pub fn from_bytes(data: Vec<u8>, options: &IngestOptions) -> Self {
        let encoding = Self::detect_encoding(&data, options.encodings());
        Self { data, encoding }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// The encoding detected for the container's bytes
    ///
    /// Only meaningful for text formats; an EPUB archive usually reports the
    /// last fallback encoding.
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Decodes the bytes as text with the detected encoding
    ///
    /// ## Return
    /// - `Err(EbookError::ParseFailure)`: [crate::error::ParseFailure::EncodingError]
    ///   if the bytes are not valid in that encoding
    pub fn decode_text(&self, target: &str) -> Result<String, EbookError> {
        decode_text(&self.data, self.encoding, target)
    }

    /// A seekable reader over the bytes
    pub fn cursor(&self) -> Cursor<&[u8]> {
        Cursor::new(self.data.as_slice())
    }

    fn detect_encoding(data: &[u8], candidates: &[&'static Encoding]) -> &'static Encoding {
        if let Some((encoding, _)) = Encoding::for_bom(data) {
            return encoding;
        }

        candidates
            .iter()
            .copied()
            .find(|encoding| {
                encoding
                    .decode_without_bom_handling_and_without_replacement(data)
                    .is_some()
            })
            .or_else(|| candidates.last().copied())
            .unwrap_or(encoding_rs::UTF_8)
    }
}
