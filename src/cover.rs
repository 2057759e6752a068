//! Cover extraction
//!
//! Writes the cover image of a book to a file the catalog can point at. Files
//! are named after the book title, so extracting the same book twice
//! overwrites the earlier file instead of accumulating copies.

use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

use log::debug;

use crate::{epub::EpubModel, error::EbookError};

/// A cover image written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    pub path: PathBuf,
}

impl CoverImage {
    /// The `file://` URI of the written image
    pub fn file_uri(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

/// The file name used for the cover of a book titled `title`
///
/// Every character outside `[A-Za-z0-9]` becomes `_`.
pub fn cover_file_name(title: &str) -> String {
    let safe_name: String = title
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect();

    format!("{}_cover.jpg", safe_name)
}

/// Writes the cover of `model` into `directory`
///
/// ## Parameters
/// - `model`: The opened book
/// - `title`: The title the file is named after
/// - `directory`: An existing directory to write into
///
/// ## Return
/// - `Ok(Some(CoverImage))`: The cover was written
/// - `Ok(None)`: The book declares no cover
/// - `Err(EbookError::IOError)`: The file could not be written
pub fn extract_cover(
    model: &EpubModel,
    title: &str,
    directory: &Path,
) -> Result<Option<CoverImage>, EbookError> {
    let Some(data) = model.cover_image() else {
        return Ok(None);
    };

    let path = directory.join(cover_file_name(title));
    let mut file = File::create(&path)?;
    file.write_all(data)?;
    file.sync_all()?;

    debug!("Wrote {} byte cover to \"{}\"", data.len(), path.display());
    Ok(Some(CoverImage { path }))
}
