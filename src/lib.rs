//! Ebook ingestion library
//!
//! A Rust library that turns EPUB, RTF and plain-text books into
//! self-contained HTML documents for a reading surface.
//!
//! Books come from local paths or host content handles. EPUB packages are
//! parsed into a chapter list; each chapter is rendered on demand with its
//! images embedded as `data:` URIs, so the reading surface never needs access
//! to the container. Legacy books with mislabeled encodings, odd path
//! spellings or broken chapters are read as far as they allow: one bad chapter
//! or image degrades on its own, the rest of the book stays readable.
//!
//! ## Features
//!
//! - Open books by path, `file://` URI or host content handle.
//! - Parse EPUB 2 and EPUB 3 packages with an encoding fallback list.
//! - Render chapters with inlined images and a mobile-friendly preamble.
//! - Convert RTF documents, including embedded pictures, to HTML.
//! - Show plain text verbatim.
//! - Extract cover images to disk.
//!
//! ## Quick Start
//!
//! ### Read EPUB Files
//!
//! ```rust, ignore
//! # use lib_ebook::BookReader;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let reader = BookReader::new();
//!
//! // Get the reading order
//! let chapters = reader.chapters("path/to/epub/file.epub")?;
//!
//! // Render a chapter; failures become a short error message
//! let html = reader.load_chapter("path/to/epub/file.epub", 0);
//!
//! # Ok(())
//! # }
//! ```
//!
//! ### Work with an Opened Book
//!
//! ```rust, ignore
//! # use lib_ebook::{EpubModel, IngestOptions, render::render_epub_chapter};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("path/to/epub/file.epub")?;
//! let options = IngestOptions::default();
//! let doc = EpubModel::open_with(&bytes, &options)?;
//!
//! println!("Title: {:?}", doc.title());
//! for index in 0..doc.chapter_count() {
//!     let _html = render_epub_chapter(&doc, index, &options);
//! }
//!
//! # Ok(())
//! # }
//! ```

pub(crate) mod utils;

pub mod config;
pub mod container;
pub mod cover;
pub mod epub;
pub mod error;
pub mod inline;
pub mod reader;
pub mod render;
pub mod resource;
pub mod rtf;
pub mod text;
pub mod types;

#[cfg(test)]
mod fixtures;

pub use config::IngestOptions;
pub use epub::EpubModel;
pub use reader::BookReader;
pub use types::{DocumentFormat, RenderedFragment};
