//! Resource table and lookup strategies
//!
//! A [ResourceTable] maps normalized container paths to raw resource bytes.
//! References found in markup rarely match stored keys byte for byte: they may
//! be percent-encoded when the entry is not, or differ in letter case because
//! the book was authored on a case-insensitive filesystem. Instead of ad hoc
//! fallbacks, a lookup walks an ordered list of [LookupStrategy] values and
//! stops at the first hit.

use indexmap::IndexMap;

use crate::utils::percent_decode;

/// One way of matching a requested path against the stored keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupStrategy {
    /// The path exactly as requested
    Exact,

    /// The percent-decoded form of the requested path
    PercentDecoded,

    /// The raw or decoded path, ignoring ASCII and Unicode letter case
    CaseInsensitive,
}

impl LookupStrategy {
    /// The order used unless configured otherwise
    pub const DEFAULT_ORDER: [LookupStrategy; 3] = [
        LookupStrategy::Exact,
        LookupStrategy::PercentDecoded,
        LookupStrategy::CaseInsensitive,
    ];
}

/// Something that can hand out resource bytes by container path
///
/// Implemented by [ResourceTable] and by [crate::epub::EpubModel]; the
/// resource inliner only depends on this trait.
pub trait ResourceLookup {
    /// Returns the bytes stored for `path`, or `None` if absent
    fn lookup(&self, path: &str) -> Option<&[u8]>;
}

/// Immutable mapping from container path to resource bytes
///
/// Keys keep the order of the archive, which makes case-insensitive matches
/// deterministic when two entries differ only in case.
#[derive(Debug, Clone)]
pub struct ResourceTable {
    entries: IndexMap<String, Vec<u8>>,
    strategies: Vec<LookupStrategy>,
}

impl ResourceTable {
    /// Creates a table using [LookupStrategy::DEFAULT_ORDER]
    pub fn new(entries: IndexMap<String, Vec<u8>>) -> Self {
        Self::with_strategies(entries, LookupStrategy::DEFAULT_ORDER.to_vec())
    }

    pub fn with_strategies(
        entries: IndexMap<String, Vec<u8>>,
        strategies: Vec<LookupStrategy>,
    ) -> Self {
        Self {
            entries,
            strategies,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the stored paths in archive order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Returns `true` if a stored entry matches exactly
    pub fn contains_exact(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Resolves `path` to the stored key it matches, if any
    ///
    /// Each configured strategy is tried in order; the first one that produces
    /// a stored key wins.
    pub fn resolve_key(&self, path: &str) -> Option<&str> {
        let decoded = percent_decode(path);

        self.strategies
            .iter()
            .find_map(|strategy| self.resolve_with(*strategy, path, decoded.as_deref()))
    }

    /// Looks up the bytes stored for `path`
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        let key = self.resolve_key(path)?;
        self.entries.get(key).map(Vec::as_slice)
    }

    fn resolve_with(
        &self,
        strategy: LookupStrategy,
        path: &str,
        decoded: Option<&str>,
    ) -> Option<&str> {
        match strategy {
            LookupStrategy::Exact => self.stored_key(path),
            LookupStrategy::PercentDecoded => decoded.and_then(|decoded| self.stored_key(decoded)),
            LookupStrategy::CaseInsensitive => {
                let raw = path.to_lowercase();
                let decoded = decoded.map(str::to_lowercase);

                self.entries
                    .keys()
                    .find(|key| {
                        let key = key.to_lowercase();
                        key == raw || decoded.as_ref().is_some_and(|decoded| &key == decoded)
                    })
                    .map(String::as_str)
            }
        }
    }

    fn stored_key(&self, path: &str) -> Option<&str> {
        self.entries
            .get_key_value(path)
            .map(|(key, _)| key.as_str())
    }
}

impl ResourceLookup for ResourceTable {
    fn lookup(&self, path: &str) -> Option<&[u8]> {
        self.get(path)
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use crate::resource::{LookupStrategy, ResourceLookup, ResourceTable};

    fn table() -> ResourceTable {
        let mut entries = IndexMap::new();
        entries.insert("OEBPS/Images/cover.jpg".to_string(), vec![1]);
        entries.insert("OEBPS/Images/My Picture.png".to_string(), vec![2]);
        entries.insert("OEBPS/Images/percent%20name.gif".to_string(), vec![3]);
        entries.insert("OEBPS/Text/Chapter 1.xhtml".to_string(), vec![4]);
        ResourceTable::new(entries)
    }

    #[test]
    fn test_exact_lookup() {
        let table = table();
        assert_eq!(table.get("OEBPS/Images/cover.jpg"), Some(&[1u8][..]));
        assert_eq!(table.len(), 4);
    }

    /// A percent-encoded reference finds an entry stored with a literal space
    #[test]
    fn test_percent_decoded_lookup() {
        let table = table();
        assert_eq!(
            table.get("OEBPS/Images/My%20Picture.png"),
            Some(&[2u8][..])
        );
        assert_eq!(
            table.resolve_key("OEBPS/Text/Chapter%201.xhtml"),
            Some("OEBPS/Text/Chapter 1.xhtml")
        );
    }

    /// An entry whose stored key itself contains an escape is found verbatim
    #[test]
    fn test_raw_key_wins_over_decoding() {
        let table = table();
        assert_eq!(
            table.get("OEBPS/Images/percent%20name.gif"),
            Some(&[3u8][..])
        );
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let table = table();
        assert_eq!(table.lookup("oebps/images/COVER.JPG"), Some(&[1u8][..]));
        assert_eq!(
            table.lookup("oebps/images/my%20picture.PNG"),
            Some(&[2u8][..])
        );
    }

    #[test]
    fn test_missing_resource_is_none() {
        let table = table();
        assert_eq!(table.get("OEBPS/Images/missing.png"), None);
    }

    /// Strategies that are not configured are never consulted
    #[test]
    fn test_configured_strategies_only() {
        let mut entries = IndexMap::new();
        entries.insert("Images/Cover.jpg".to_string(), vec![9]);
        let table = ResourceTable::with_strategies(entries, vec![LookupStrategy::Exact]);

        assert!(table.get("Images/Cover.jpg").is_some());
        assert!(table.get("images/cover.jpg").is_none());
        assert!(table.get("Images/Cover%2Ejpg").is_none());
    }
}
