//! Plain-text normalizer

use encoding_rs::UTF_8;
use log::warn;

use crate::{
    error::EbookError,
    render::{DOCUMENT_ENCODING_ERROR, error_fragment},
    types::RenderedFragment,
    utils::{decode_text, escape_html},
};

const TEXT_HEAD: &str = r#"<html>
<head>
    <meta name="viewport" content="width=device-width, initial-scale=1.0, maximum-scale=1.0, user-scalable=no">
    <style>
        html, body { width: 100%; margin: 0; padding: 16px; word-wrap: break-word; font-family: sans-serif; }
        pre { white-space: pre-wrap; font-family: inherit; margin: 0; }
    </style>
</head>
<body><pre>"#;

const TEXT_TAIL: &str = "</pre></body>\n</html>";

/// Turns plain text into a document that shows it verbatim
///
/// The bytes must be UTF-8, or UTF-16 with a byte order mark.
///
/// ## Return
/// - `Ok(RenderedFragment)`: The escaped text inside a wrapping `<pre>` block
/// - `Err(EbookError::ParseFailure)`: [crate::error::ParseFailure::EncodingError]
///   if the bytes do not decode
pub fn try_normalize_text(bytes: &[u8]) -> Result<RenderedFragment, EbookError> {
    let text = decode_text(bytes, UTF_8, "text document")?;
    let escaped = escape_html(&text);

    let mut html = String::with_capacity(TEXT_HEAD.len() + escaped.len() + TEXT_TAIL.len());
    html.push_str(TEXT_HEAD);
    html.push_str(&escaped);
    html.push_str(TEXT_TAIL);
    Ok(RenderedFragment::new(html))
}

/// Like [try_normalize_text], but an undecodable input becomes an error fragment
pub fn normalize_text(bytes: &[u8]) -> RenderedFragment {
    try_normalize_text(bytes).unwrap_or_else(|err| {
        warn!("Unable to read text document: {}", err);
        error_fragment(DOCUMENT_ENCODING_ERROR)
    })
}

#[cfg(test)]
mod tests {
    use crate::{
        error::{EbookError, ParseFailure},
        render::{DOCUMENT_ENCODING_ERROR, error_fragment},
        text::{normalize_text, try_normalize_text},
    };

    #[test]
    fn test_text_is_escaped_and_wrapped() {
        let fragment = try_normalize_text(b"a < b && c > d\n  indented").unwrap();
        let html = fragment.as_str();
        assert!(html.contains("<pre>a &lt; b &amp;&amp; c &gt; d\n  indented</pre>"));
        assert!(html.contains("white-space: pre-wrap"));
        assert!(html.contains("user-scalable=no"));
        assert!(!fragment.is_error());
    }

    #[test]
    fn test_utf16_with_bom() {
        let bytes = [0xFF, 0xFE, b'h', 0, b'i', 0];
        let fragment = try_normalize_text(&bytes).unwrap();
        assert!(fragment.as_str().contains("<pre>hi</pre>"));
    }

    /// Invalid bytes fail as an encoding error and render a fixed message
    #[test]
    fn test_invalid_utf8() {
        let bytes = b"caf\xe9";
        assert!(matches!(
            try_normalize_text(bytes),
            Err(EbookError::ParseFailure {
                source: ParseFailure::EncodingError { .. }
            })
        ));
        assert_eq!(normalize_text(bytes), error_fragment(DOCUMENT_ENCODING_ERROR));
    }
}
