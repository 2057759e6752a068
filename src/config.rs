//! Ingestion options
//!
//! [IngestOptions] collects the heuristics that legacy content needs: the
//! ordered list of text encodings tried when a container's XML does not decode,
//! the ordered list of strategies used to match resource references against
//! stored entries, and the size limit for inlined images.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

use crate::resource::LookupStrategy;

/// Images larger than this are not inlined by default
pub const DEFAULT_MAX_INLINE_BYTES: usize = 16 * 1024 * 1024;

/// Options shared by every ingestion operation
///
/// The defaults reproduce the behavior readers expect from real-world books:
/// UTF-8 first, then Latin-1 for legacy EPUBs that mislabel their encoding.
/// `encoding_rs` follows the WHATWG encoding standard, so the `ISO-8859-1`
/// label resolves to windows-1252.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Encodings tried in order when decoding container and package XML
    pub encodings: Vec<&'static Encoding>,

    /// Strategies tried in order when looking up a resource by path
    pub lookup_strategies: Vec<LookupStrategy>,

    /// Images larger than this many bytes are left as plain references
    ///
    /// `None` disables the limit.
    pub max_inline_bytes: Option<usize>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            encodings: vec![UTF_8, WINDOWS_1252],
            lookup_strategies: LookupStrategy::DEFAULT_ORDER.to_vec(),
            max_inline_bytes: Some(DEFAULT_MAX_INLINE_BYTES),
        }
    }
}

impl IngestOptions {
    /// Replaces the encoding fallback list
    pub fn with_encodings(mut self, encodings: Vec<&'static Encoding>) -> Self {
        self.encodings = encodings;
        self
    }

    /// Replaces the encoding fallback list from encoding labels
    ///
    /// Unknown labels are skipped; if no label is recognized the list falls
    /// back to UTF-8 alone.
    pub fn with_encoding_labels(mut self, labels: &[&str]) -> Self {
        let mut encodings: Vec<&'static Encoding> = labels
            .iter()
            .filter_map(|label| Encoding::for_label(label.as_bytes()))
            .collect();
        if encodings.is_empty() {
            encodings.push(UTF_8);
        }

        self.encodings = encodings;
        self
    }

    /// Replaces the resource lookup strategies
    pub fn with_lookup_strategies(mut self, strategies: Vec<LookupStrategy>) -> Self {
        self.lookup_strategies = strategies;
        self
    }

    /// Sets the maximum size of an inlined image
    pub fn with_max_inline_bytes(mut self, limit: Option<usize>) -> Self {
        self.max_inline_bytes = limit;
        self
    }

    /// The encodings to try, never empty
    pub(crate) fn encodings(&self) -> &[&'static Encoding] {
        if self.encodings.is_empty() {
            std::slice::from_ref(&UTF_8)
        } else {
            &self.encodings
        }
    }
}
