//! Reader facade
//!
//! [BookReader] ties the pieces together for a host application: it opens a
//! location reference, picks the format and returns ready-to-display HTML.
//! Nothing is cached between calls; every call opens the container again, so
//! a reader can be shared freely between threads.

use std::path::Path;

use log::warn;

use crate::{
    config::IngestOptions,
    container::{BookContainer, ContainerLocation, ContentResolver, FileSystemResolver},
    cover::{self, CoverImage},
    epub::EpubModel,
    error::EbookError,
    render::{FILE_UNAVAILABLE, error_fragment, fragment_for_error, render_epub_chapter},
    rtf::render_rtf,
    text::normalize_text,
    types::{DocumentFormat, RenderedFragment},
};

/// Entry point for reading books by location reference
///
/// A reference is a filesystem path, a `file://` URI or a content handle that
/// the configured [ContentResolver] understands.
///
/// ## Example
/// ```rust, no_run
/// # use lib_ebook::BookReader;
/// let reader = BookReader::new();
/// let chapters = reader.chapters("/books/novel.epub")?;
/// let first = reader.load_chapter("/books/novel.epub", 0);
/// println!("{} chapters\n{}", chapters.len(), first);
/// # Ok::<(), lib_ebook::error::EbookError>(())
/// ```
#[derive(Debug, Clone)]
pub struct BookReader<C: ContentResolver = FileSystemResolver> {
    resolver: C,
    options: IngestOptions,
}

impl BookReader<FileSystemResolver> {
    /// A reader for filesystem paths with the default options
    pub fn new() -> Self {
        Self::with_resolver(FileSystemResolver)
    }
}

impl Default for BookReader<FileSystemResolver> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ContentResolver> BookReader<C> {
    /// A reader that hands content handles to `resolver`
    pub fn with_resolver(resolver: C) -> Self {
        Self {
            resolver,
            options: IngestOptions::default(),
        }
    }

    pub fn with_options(mut self, options: IngestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Reads the bytes behind `reference`
    pub fn open_container(&self, reference: &str) -> Result<BookContainer, EbookError> {
        BookContainer::open(
            &ContainerLocation::parse(reference),
            &self.resolver,
            &self.options,
        )
    }

    /// Opens the EPUB behind `reference`
    pub fn open_epub(&self, reference: &str) -> Result<EpubModel, EbookError> {
        let container = self.open_container(reference)?;
        EpubModel::open_with(container.bytes(), &self.options)
    }

    /// The chapter paths of the EPUB behind `reference`, in reading order
    pub fn chapters(&self, reference: &str) -> Result<Vec<String>, EbookError> {
        Ok(self.open_epub(reference)?.chapter_hrefs())
    }

    /// Renders one chapter, failing only when the book itself is unreadable
    ///
    /// ## Return
    /// - `Ok(RenderedFragment)`: The chapter, or an error fragment for a failure
    ///   limited to this chapter; an index past the end gives "End of Book"
    /// - `Err(EbookError)`: The container could not be opened or is not an EPUB
    pub fn try_load_chapter(
        &self,
        reference: &str,
        index: usize,
    ) -> Result<RenderedFragment, EbookError> {
        let model = self.open_epub(reference)?;
        Ok(render_epub_chapter(&model, index, &self.options))
    }

    /// Renders one chapter; every failure becomes an error fragment
    pub fn load_chapter(&self, reference: &str, index: usize) -> RenderedFragment {
        self.try_load_chapter(reference, index)
            .unwrap_or_else(|err| {
                warn!("Unable to open \"{}\": {}", reference, err);
                fragment_for_error(&err)
            })
    }

    /// Renders the plain-text document behind `reference`
    pub fn parse_text(&self, reference: &str) -> RenderedFragment {
        match self.open_container(reference) {
            Ok(container) => normalize_text(container.bytes()),
            Err(err) => {
                warn!("Unable to open \"{}\": {}", reference, err);
                error_fragment(FILE_UNAVAILABLE)
            }
        }
    }

    /// Renders the RTF document behind `reference`
    pub fn parse_rtf(&self, reference: &str) -> RenderedFragment {
        match self.open_container(reference) {
            Ok(container) => render_rtf(container.bytes(), &self.options),
            Err(err) => {
                warn!("Unable to open \"{}\": {}", reference, err);
                error_fragment(FILE_UNAVAILABLE)
            }
        }
    }

    /// Renders the document behind `reference` according to its suffix
    ///
    /// Text and RTF documents are rendered whole; for an EPUB this is its
    /// first chapter.
    pub fn load_document(&self, reference: &str) -> RenderedFragment {
        match DocumentFormat::from_reference(reference) {
            DocumentFormat::Text => self.parse_text(reference),
            DocumentFormat::Rtf => self.parse_rtf(reference),
            DocumentFormat::Epub => self.load_chapter(reference, 0),
        }
    }

    /// Writes the cover of the EPUB behind `reference` into `directory`
    ///
    /// ## Return
    /// - `Ok(None)`: The book declares no cover
    /// - `Err(EbookError)`: The book could not be opened or the file not written
    pub fn extract_cover(
        &self,
        reference: &str,
        title: &str,
        directory: &Path,
    ) -> Result<Option<CoverImage>, EbookError> {
        let model = self.open_epub(reference)?;
        cover::extract_cover(&model, title, directory)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{self, Cursor, Read},
        path::{Path, PathBuf},
    };

    use crate::{
        container::ContentResolver,
        error::{EbookError, ParseFailure},
        fixtures::{EpubFixture, JPEG_BYTES},
        reader::BookReader,
        render::{
            CHAPTER_ENCODING_ERROR, COULD_NOT_OPEN_BOOK, END_OF_BOOK, FILE_UNAVAILABLE,
            error_fragment,
        },
    };

    /// Serves the sample book under `content://books/sample`
    struct MemoryResolver {
        book: Vec<u8>,
    }

    impl ContentResolver for MemoryResolver {
        fn open(&self, uri: &str) -> io::Result<Box<dyn Read + Send>> {
            match uri {
                "content://books/sample" => Ok(Box::new(Cursor::new(self.book.clone()))),
                _ => Err(io::Error::new(io::ErrorKind::NotFound, "unknown handle")),
            }
        }
    }

    fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_chapters_and_load_chapter() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "sample.epub", &EpubFixture::sample().build());
        let reference = path.to_str().unwrap();
        let reader = BookReader::new();

        assert_eq!(
            reader.chapters(reference).unwrap(),
            vec!["OEBPS/Text/chapter1.xhtml", "OEBPS/Text/chapter2.xhtml"]
        );

        let first = reader.load_chapter(reference, 0);
        assert!(!first.is_error());
        assert!(first.as_str().contains("<p>First</p>"));
        assert!(first.as_str().contains("data:image/png;base64,"));

        assert_eq!(reader.load_chapter(reference, 2), error_fragment(END_OF_BOOK));
    }

    #[test]
    fn test_content_handle() {
        let reader = BookReader::with_resolver(MemoryResolver {
            book: EpubFixture::sample().build(),
        });

        let second = reader.load_chapter("content://books/sample", 1);
        assert!(second.as_str().contains("<p>Second</p>"));

        assert!(matches!(
            reader.chapters("content://books/other"),
            Err(EbookError::ContainerUnavailable { .. })
        ));
        assert_eq!(
            reader.load_chapter("content://books/other", 0),
            error_fragment(COULD_NOT_OPEN_BOOK)
        );
    }

    /// A book that is not an EPUB fails as a whole, a bad chapter only locally
    #[test]
    fn test_whole_book_and_chapter_failures() {
        let dir = tempfile::tempdir().unwrap();
        let reader = BookReader::new();

        let not_zip = write_file(dir.path(), "broken.epub", b"<?xml version=\"1.0\"?><package/>");
        let not_zip = not_zip.to_str().unwrap();
        assert!(matches!(
            reader.try_load_chapter(not_zip, 0),
            Err(EbookError::ParseFailure {
                source: ParseFailure::Corrupt { .. }
            })
        ));
        assert_eq!(reader.load_chapter(not_zip, 0), error_fragment(COULD_NOT_OPEN_BOOK));

        let bad_chapter = EpubFixture::sample()
            .file("OEBPS/Text/chapter2.xhtml", b"<p>\xff\xfe\xfd</p>\x80")
            .build();
        let bad_chapter = write_file(dir.path(), "bad.epub", &bad_chapter);
        let bad_chapter = bad_chapter.to_str().unwrap();
        assert_eq!(
            reader.try_load_chapter(bad_chapter, 1).unwrap(),
            error_fragment(CHAPTER_ENCODING_ERROR)
        );
        assert!(!reader.load_chapter(bad_chapter, 0).is_error());
    }

    #[test]
    fn test_load_document_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let reader = BookReader::new();

        let text = write_file(dir.path(), "notes.txt", b"1 < 2");
        let text = reader.load_document(text.to_str().unwrap());
        assert!(text.as_str().contains("<pre>1 &lt; 2</pre>"));

        let rtf = write_file(dir.path(), "letter.RTF", br"{\rtf1 Dear\par friend}");
        let rtf = reader.load_document(rtf.to_str().unwrap());
        assert!(rtf.as_str().contains("Dear<br><br> friend"));

        let epub = write_file(dir.path(), "book.epub", &EpubFixture::sample().build());
        let epub = reader.load_document(&format!("file://{}", epub.display()));
        assert!(epub.as_str().contains("<p>First</p>"));
    }

    #[test]
    fn test_missing_text_file() {
        let reader = BookReader::new();
        assert_eq!(
            reader.parse_text("/definitely/not/here.txt"),
            error_fragment(FILE_UNAVAILABLE)
        );
        assert_eq!(
            reader.parse_rtf("/definitely/not/here.rtf"),
            error_fragment(FILE_UNAVAILABLE)
        );
    }

    #[test]
    fn test_extract_cover() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "sample.epub", &EpubFixture::sample().build());
        let reader = BookReader::new();

        let cover = reader
            .extract_cover(path.to_str().unwrap(), "Sample Book", dir.path())
            .unwrap()
            .unwrap();
        assert_eq!(std::fs::read(&cover.path).unwrap(), JPEG_BYTES);
    }
}
