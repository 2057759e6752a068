//! Chapter renderer
//!
//! Every document handed to the reading surface goes through [wrap_document],
//! which adds a viewport that disables user zoom and CSS that keeps all content
//! within the screen width. Chapters additionally get their images inlined.
//! Rendering never fails: anything that cannot be shown becomes a short fixed
//! error fragment.

use log::warn;

use crate::{
    config::IngestOptions,
    epub::EpubModel,
    error::{EbookError, ParseFailure},
    inline::inline_resources,
    resource::ResourceLookup,
    types::RenderedFragment,
    utils::escape_html,
};

pub const COULD_NOT_OPEN_BOOK: &str = "Error: Could not open book.";
pub const END_OF_BOOK: &str = "End of Book";
pub const CHAPTER_NOT_FOUND: &str = "Error: Chapter not found.";
pub const CHAPTER_ENCODING_ERROR: &str = "Error reading chapter encoding.";
pub const CHAPTER_ENCRYPTED: &str = "Error: Chapter is encrypted.";
pub const DOCUMENT_ENCODING_ERROR: &str = "Error reading text file.";
pub const FILE_UNAVAILABLE: &str = "Error: Cannot open file";

const DOCUMENT_HEAD: &str = r#"<html>
<head>
    <meta name="viewport" content="width=device-width, initial-scale=1.0, maximum-scale=1.0, user-scalable=no">
    <style>
        html, body {
            width: 100%; overflow-x: hidden; margin: 0; padding: 16px;
            word-wrap: break-word; line-height: 1.6;
        }
        * { max-width: 100% !important; box-sizing: border-box !important; }
        img, svg, video { height: auto !important; display: block; margin: 10px auto; }
        hr { width: 100% !important; height: 1px; border: none; background-color: #ccc; }
        table { display: block; width: 100% !important; overflow-x: auto; }
    </style>
</head>
<body>
"#;

const DOCUMENT_TAIL: &str = r#"
    <div style="height: 50px;"></div>
</body>
</html>"#;

/// Wraps `body` in the normalizing document preamble
pub fn wrap_document(body: &str) -> String {
    let mut html = String::with_capacity(DOCUMENT_HEAD.len() + body.len() + DOCUMENT_TAIL.len());
    html.push_str(DOCUMENT_HEAD);
    html.push_str(body);
    html.push_str(DOCUMENT_TAIL);
    html
}

/// A fixed, human-readable error fragment
pub fn error_fragment(message: &str) -> RenderedFragment {
    RenderedFragment::error(format!("<h3>{}</h3>", escape_html(message)))
}

/// Renders one chapter
///
/// ## Parameters
/// - `raw_markup`: The chapter markup, `None` if the chapter could not be found
/// - `href`: The container path of the chapter, the root for relative image paths
/// - `lookup`: Where referenced images are looked up
/// - `options`: Supplies the size limit for inlined images
///
/// Rendering the same input twice yields the same output.
pub fn render_chapter<L: ResourceLookup + ?Sized>(
    raw_markup: Option<&str>,
    href: &str,
    lookup: &L,
    options: &IngestOptions,
) -> RenderedFragment {
    let Some(markup) = raw_markup else {
        return error_fragment(CHAPTER_NOT_FOUND);
    };

    let body = inline_resources(markup, href, lookup, options.max_inline_bytes);
    RenderedFragment::new(wrap_document(&body))
}

/// Renders chapter `index` of an opened book
///
/// Failures of this one chapter, including an index past the last chapter,
/// render as their error fragment; the book stays usable.
pub fn render_epub_chapter(
    model: &EpubModel,
    index: usize,
    options: &IngestOptions,
) -> RenderedFragment {
    let markup = model
        .chapter_href(index)
        .and_then(|href| Ok((href, model.chapter_raw_markup(index)?)));

    match markup {
        Ok((href, markup)) => render_chapter(Some(&markup), href, model, options),
        Err(err) => {
            warn!("Unable to render chapter {}: {}", index, err);
            fragment_for_error(&err)
        }
    }
}

/// The error fragment shown in place of content that failed with `error`
///
/// Chapter-level failures get their specific message; everything else means
/// the book itself could not be read.
pub fn fragment_for_error(error: &EbookError) -> RenderedFragment {
    let message = match error {
        EbookError::IndexOutOfRange { .. } => END_OF_BOOK,
        EbookError::ResourceNotFound { .. } => CHAPTER_NOT_FOUND,
        EbookError::ParseFailure {
            source: ParseFailure::EncodingError { .. },
        } => CHAPTER_ENCODING_ERROR,
        EbookError::ParseFailure {
            source: ParseFailure::Encrypted { .. },
        } => CHAPTER_ENCRYPTED,
        _ => COULD_NOT_OPEN_BOOK,
    };

    error_fragment(message)
}

#[cfg(test)]
mod tests {
    use crate::{
        config::IngestOptions,
        epub::EpubModel,
        error::{EbookError, ParseFailure},
        fixtures::EpubFixture,
        render::{
            CHAPTER_ENCODING_ERROR, CHAPTER_NOT_FOUND, COULD_NOT_OPEN_BOOK, END_OF_BOOK,
            error_fragment, fragment_for_error, render_chapter, render_epub_chapter,
            wrap_document,
        },
    };

    #[test]
    fn test_wrap_document() {
        let html = wrap_document("<p>body</p>");
        assert!(html.starts_with("<html>"));
        assert!(html.contains("user-scalable=no"));
        assert!(html.contains("max-width: 100% !important"));
        assert!(html.contains("box-sizing: border-box !important"));
        assert!(html.contains("<p>body</p>"));
        assert!(html.ends_with("</html>"));
    }

    #[test]
    fn test_render_chapter_inlines_images() {
        let doc = EpubModel::open(&EpubFixture::sample().build()).unwrap();
        let markup = doc.chapter_raw_markup(0).unwrap();
        let href = doc.chapter_href(0).unwrap();

        let fragment = render_chapter(Some(&markup), href, &doc, &IngestOptions::default());
        assert!(!fragment.is_error());
        assert!(fragment.as_str().contains("<p>First</p>"));
        assert!(fragment.as_str().contains("src=\"data:image/png;base64,"));
        assert!(!fragment.as_str().contains("../Images/pic.png"));
    }

    /// Rendering the same chapter again gives the same document
    #[test]
    fn test_render_is_idempotent() {
        let doc = EpubModel::open(&EpubFixture::sample().build()).unwrap();
        let markup = doc.chapter_raw_markup(0).unwrap();
        let href = doc.chapter_href(0).unwrap();
        let options = IngestOptions::default();

        let first = render_chapter(Some(&markup), href, &doc, &options);
        let second = render_chapter(Some(&markup), href, &doc, &options);
        assert_eq!(first, second);
    }

    #[test]
    fn test_absent_markup_renders_error() {
        let doc = EpubModel::open(&EpubFixture::sample().build()).unwrap();
        let fragment = render_chapter(None, "OEBPS/missing.xhtml", &doc, &IngestOptions::default());
        assert!(fragment.is_error());
        assert_eq!(fragment, error_fragment(CHAPTER_NOT_FOUND));
        assert_eq!(fragment.as_str(), "<h3>Error: Chapter not found.</h3>");
    }

    #[test]
    fn test_render_epub_chapter() {
        let doc = EpubModel::open(&EpubFixture::sample().build()).unwrap();
        let options = IngestOptions::default();

        let second = render_epub_chapter(&doc, 1, &options);
        assert!(second.as_str().contains("<p>Second</p>"));
        assert_eq!(render_epub_chapter(&doc, 2, &options), error_fragment(END_OF_BOOK));
    }

    #[test]
    fn test_fragment_for_error() {
        assert_eq!(
            fragment_for_error(&EbookError::IndexOutOfRange { index: 3, count: 3 }),
            error_fragment(END_OF_BOOK)
        );
        assert_eq!(
            fragment_for_error(
                &ParseFailure::EncodingError {
                    target: "c.xhtml".to_string(),
                    encoding: "UTF-8".to_string(),
                }
                .into()
            ),
            error_fragment(CHAPTER_ENCODING_ERROR)
        );
        assert_eq!(
            fragment_for_error(&EbookError::corrupt("bad zip")),
            error_fragment(COULD_NOT_OPEN_BOOK)
        );
    }
}
