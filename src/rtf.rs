//! RTF to HTML transducer
//!
//! A single left-to-right scan over the document. Only what a reader needs is
//! kept: text, paragraph and line breaks, bold and italic, and embedded
//! pictures. Font tables, style sheets, document info and similar groups are
//! skipped wholesale.
//!
//! The scan tracks the brace depth, the depth at which an ignored group
//! started, and, independently, the depth of an open picture group together
//! with its hex payload.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use log::{debug, warn};

use crate::{
    config::IngestOptions,
    inline::data_uri,
    render::{DOCUMENT_ENCODING_ERROR, error_fragment, wrap_document},
    types::RenderedFragment,
    utils::decode_text,
};

/// Destinations whose content never reaches the output
const IGNORABLE_WORDS: &[&str] = &[
    "fonttbl",
    "colortbl",
    "stylesheet",
    "info",
    "object",
    "header",
    "headerl",
    "headerr",
    "headerf",
    "footer",
    "footerl",
    "footerr",
    "footerf",
    "nonshppict",
];

const PICTURE_PLACEHOLDER: &str = "<p><i>[Image could not be displayed]</i></p>";

/// Converts an RTF document to an HTML body
///
/// The result is not wrapped in a document; see [render_rtf].
pub fn rtf_to_html(source: &str) -> String {
    RtfTransducer::new(source).run()
}

/// Renders RTF bytes as a complete document
///
/// The bytes are decoded with the first configured encoding that accepts
/// them. Characters outside ASCII are normally written as escapes, so in
/// practice any encoding works.
pub fn render_rtf(bytes: &[u8], options: &IngestOptions) -> RenderedFragment {
    let source = options
        .encodings()
        .iter()
        .find_map(|&encoding| decode_text(bytes, encoding, "rtf document").ok());

    match source {
        Some(source) => RenderedFragment::new(wrap_document(&rtf_to_html(&source))),
        None => {
            warn!("RTF document does not decode with any configured encoding");
            error_fragment(DOCUMENT_ENCODING_ERROR)
        }
    }
}

/// What kind of group the scan is currently inside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Ignore,
    Picture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Bold,
    Italic,
}

impl Style {
    fn open_tag(self) -> &'static str {
        match self {
            Style::Bold => "<b>",
            Style::Italic => "<i>",
        }
    }

    fn close_tag(self) -> &'static str {
        match self {
            Style::Bold => "</b>",
            Style::Italic => "</i>",
        }
    }
}

#[derive(Debug)]
struct Picture {
    depth: usize,
    hex: String,
    mime: &'static str,
    /// Any non-blank text at the picture's own depth, hex or not
    payload_seen: bool,
}

struct RtfTransducer {
    chars: Vec<char>,
    pos: usize,
    output: String,

    depth: usize,
    ignore_depth: Option<usize>,
    /// Depth of an open `\nonshppict` group, whose pictures are dropped
    fallback_depth: Option<usize>,
    picture: Option<Picture>,

    /// Open formatting, innermost last
    styles: Vec<Style>,
    /// Formatting at the start of each open group
    saved_styles: Vec<Vec<Style>>,

    code_page: &'static Encoding,
    pending_bytes: Vec<u8>,
    unicode_skip: usize,
    skip_remaining: usize,
    high_surrogate: Option<u32>,
}

impl RtfTransducer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            output: String::with_capacity(source.len()),
            depth: 0,
            ignore_depth: None,
            fallback_depth: None,
            picture: None,
            styles: Vec::new(),
            saved_styles: Vec::new(),
            code_page: WINDOWS_1252,
            pending_bytes: Vec::new(),
            unicode_skip: 1,
            skip_remaining: 0,
            high_surrogate: None,
        }
    }

    fn run(mut self) -> String {
        while let Some(ch) = self.next_char() {
            match ch {
                '{' => self.open_group(),
                '}' => self.close_group(),
                '\\' => self.escape(),
                '\r' | '\n' => {}
                _ => self.raw_char(ch),
            }
        }

        self.flush_bytes();
        self.apply_styles(&[]);
        self.output
    }

    fn next_char(&mut self) -> Option<char> {
        let ch = self.chars.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    /// The region that decides what happens to raw text
    fn region(&self) -> Option<Region> {
        if self.picture.is_some() {
            Some(Region::Picture)
        } else if self.ignore_depth.is_some() {
            Some(Region::Ignore)
        } else {
            None
        }
    }

    fn is_visible(&self) -> bool {
        self.region().is_none()
    }

    fn open_group(&mut self) {
        self.flush_bytes();
        self.depth += 1;
        self.skip_remaining = 0;
        self.saved_styles.push(self.styles.clone());

        let Some(word) = self.group_destination() else {
            return;
        };

        if word == "nonshppict" && self.fallback_depth.is_none() {
            self.fallback_depth = Some(self.depth);
        }

        if word == "pict" {
            if self.picture.is_none() && self.fallback_depth.is_none() {
                self.picture = Some(Picture {
                    depth: self.depth,
                    hex: String::new(),
                    mime: "image/jpeg",
                    payload_seen: false,
                });
            }
        } else if self.ignore_depth.is_none()
            && (word == "*" || IGNORABLE_WORDS.contains(&word.as_str()))
        {
            self.ignore_depth = Some(self.depth);
        }
    }

    /// The control word opening the current group, `*` for a `\*` destination
    fn group_destination(&self) -> Option<String> {
        let mut pos = self.pos;
        while matches!(self.chars.get(pos), Some('\r' | '\n')) {
            pos += 1;
        }

        if self.chars.get(pos) != Some(&'\\') {
            return None;
        }

        match self.chars.get(pos + 1) {
            Some('*') => Some("*".to_string()),
            Some(ch) if ch.is_ascii_alphabetic() => Some(
                self.chars[pos + 1..]
                    .iter()
                    .take_while(|ch| ch.is_ascii_alphabetic())
                    .collect(),
            ),
            _ => None,
        }
    }

    fn close_group(&mut self) {
        self.flush_bytes();
        self.skip_remaining = 0;

        if self.picture.as_ref().is_some_and(|picture| picture.depth == self.depth) {
            if let Some(picture) = self.picture.take() {
                self.emit_picture(picture);
            }
        }

        if self.ignore_depth == Some(self.depth) {
            self.ignore_depth = None;
        }
        if self.fallback_depth == Some(self.depth) {
            self.fallback_depth = None;
        }

        if let Some(saved) = self.saved_styles.pop() {
            self.apply_styles(&saved);
        }

        self.depth = self.depth.saturating_sub(1);
    }

    fn emit_picture(&mut self, picture: Picture) {
        if picture.hex.is_empty() {
            if picture.payload_seen {
                warn!("Picture payload holds no hex digits");
                self.output.push_str(PICTURE_PLACEHOLDER);
            }
            return;
        }

        match decode_hex(&picture.hex) {
            Some(data) => {
                debug!("Embedding {} byte {} picture", data.len(), picture.mime);
                self.output.push_str("<img src=\"");
                self.output.push_str(&data_uri(picture.mime, &data));
                self.output.push_str("\"/>");
            }
            None => {
                warn!(
                    "Undecodable picture payload of {} hex digits",
                    picture.hex.len()
                );
                self.output.push_str(PICTURE_PLACEHOLDER);
            }
        }
    }

    fn escape(&mut self) {
        let Some(next) = self.peek_char() else {
            return;
        };

        if next.is_ascii_alphabetic() {
            self.flush_bytes();
            let (word, param) = self.control_word();
            self.apply_control_word(&word, param);
            return;
        }

        self.pos += 1;
        match next {
            '\'' => self.hex_escape(),
            '{' | '}' | '\\' => {
                self.flush_bytes();
                self.literal_char(next);
            }
            '~' => self.symbol("&nbsp;"),
            '_' => self.symbol("-"),
            '\r' | '\n' => self.symbol("<br><br> "),
            // optional hyphen, `\*` and unknown control symbols
            _ => self.flush_bytes(),
        }
    }

    /// Reads a control word and its optional numeric parameter
    ///
    /// One space after the word is its delimiter and belongs to it.
    fn control_word(&mut self) -> (String, Option<i32>) {
        let start = self.pos;
        while self.peek_char().is_some_and(|ch| ch.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();

        let param_start = self.pos;
        if self.peek_char() == Some('-')
            && self.chars.get(self.pos + 1).is_some_and(char::is_ascii_digit)
        {
            self.pos += 1;
        }
        while self.peek_char().is_some_and(|ch| ch.is_ascii_digit()) {
            self.pos += 1;
        }
        let param = if self.pos > param_start {
            let digits: String = self.chars[param_start..self.pos].iter().collect();
            Some(digits.parse::<i64>().map_or(0, |value| {
                value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
            }))
        } else {
            None
        };

        if self.peek_char() == Some(' ') {
            self.pos += 1;
        }

        (word, param)
    }

    fn apply_control_word(&mut self, word: &str, param: Option<i32>) {
        match word {
            "ansicpg" => {
                if let Some(code_page) = param.and_then(code_page_encoding) {
                    self.code_page = code_page;
                }
            }
            "uc" => self.unicode_skip = param.unwrap_or(1).max(0) as usize,
            "u" => self.unicode_escape(param.unwrap_or(0)),
            "pngblip" | "jpegblip" => {
                if let Some(picture) = self.picture.as_mut() {
                    picture.mime = if word == "pngblip" {
                        "image/png"
                    } else {
                        "image/jpeg"
                    };
                }
            }
            _ if !self.is_visible() => {}
            "par" => self.output.push_str("<br><br> "),
            "line" => self.output.push_str("<br> "),
            "tab" => self.output.push_str("&emsp;"),
            "b" => self.set_style(Style::Bold, param != Some(0)),
            "i" => self.set_style(Style::Italic, param != Some(0)),
            "plain" => self.apply_styles(&[]),
            "emdash" => self.output.push('\u{2014}'),
            "endash" => self.output.push('\u{2013}'),
            "bullet" => self.output.push('\u{2022}'),
            "lquote" => self.output.push('\u{2018}'),
            "rquote" => self.output.push('\u{2019}'),
            "ldblquote" => self.output.push('\u{201C}'),
            "rdblquote" => self.output.push('\u{201D}'),
            _ => {}
        }
    }

    /// `\'hh`: one byte in the document code page
    fn hex_escape(&mut self) {
        let digits: String = self.chars[self.pos..].iter().take(2).collect();
        if digits.len() != 2 || !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return;
        }
        let Ok(byte) = u8::from_str_radix(&digits, 16) else {
            return;
        };
        self.pos += digits.len();

        if self.skip_remaining > 0 {
            self.skip_remaining -= 1;
            return;
        }

        if self.is_visible() {
            self.pending_bytes.push(byte);
        }
    }

    /// `\uN`: a UTF-16 code unit, followed by `\ucN` fallback characters
    fn unicode_escape(&mut self, value: i32) {
        self.skip_remaining = self.unicode_skip;

        let unit = (if value < 0 { value + 0x10000 } else { value }) as u32;
        let ch = match (unit, self.high_surrogate.take()) {
            (0xD800..=0xDBFF, _) => {
                self.high_surrogate = Some(unit);
                return;
            }
            (0xDC00..=0xDFFF, Some(high)) => {
                char::from_u32(0x10000 + ((high - 0xD800) << 10) + (unit - 0xDC00))
            }
            _ => char::from_u32(unit),
        };

        if self.is_visible() {
            self.push_escaped(ch.unwrap_or(char::REPLACEMENT_CHARACTER));
        }
    }

    fn symbol(&mut self, html: &str) {
        self.flush_bytes();
        if self.is_visible() {
            self.output.push_str(html);
        }
    }

    fn literal_char(&mut self, ch: char) {
        if self.is_visible() {
            self.push_escaped(ch);
        }
    }

    fn raw_char(&mut self, ch: char) {
        self.flush_bytes();

        match self.region() {
            Some(Region::Picture) => {
                if let Some(picture) = self.picture.as_mut() {
                    // nested groups such as `\*\blipuid` are not payload
                    if picture.depth == self.depth && !ch.is_whitespace() {
                        picture.payload_seen = true;
                        if ch.is_ascii_hexdigit() {
                            picture.hex.push(ch);
                        }
                    }
                }
            }
            Some(Region::Ignore) => {}
            None => {
                if self.skip_remaining > 0 {
                    self.skip_remaining -= 1;
                } else {
                    self.push_escaped(ch);
                }
            }
        }
    }

    fn push_escaped(&mut self, ch: char) {
        match ch {
            '&' => self.output.push_str("&amp;"),
            '<' => self.output.push_str("&lt;"),
            '>' => self.output.push_str("&gt;"),
            _ => self.output.push(ch),
        }
    }

    fn flush_bytes(&mut self) {
        if self.pending_bytes.is_empty() {
            return;
        }

        let bytes = std::mem::take(&mut self.pending_bytes);
        let (text, had_errors) = self.code_page.decode_without_bom_handling(&bytes);
        if had_errors {
            debug!("Invalid {} bytes in RTF text", self.code_page.name());
        }
        for ch in text.chars() {
            self.push_escaped(ch);
        }
    }

    fn set_style(&mut self, style: Style, on: bool) {
        let mut target = self.styles.clone();
        if on {
            if !target.contains(&style) {
                target.push(style);
            }
        } else {
            target.retain(|open| *open != style);
        }

        self.apply_styles(&target);
    }

    /// Emits the tags needed to go from the open styles to `target`
    ///
    /// Tags stay properly nested: closing a style closes everything opened
    /// after it, and the survivors are reopened.
    fn apply_styles(&mut self, target: &[Style]) {
        let common = self
            .styles
            .iter()
            .zip(target)
            .take_while(|(open, wanted)| open == wanted)
            .count();

        if common == self.styles.len() && common == target.len() {
            return;
        }

        for style in self.styles[common..].iter().rev() {
            self.output.push_str(style.close_tag());
        }
        for style in &target[common..] {
            self.output.push_str(style.open_tag());
        }

        self.styles = target.to_vec();
    }
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }

    (0..hex.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(&hex[index..index + 2], 16).ok())
        .collect()
}

/// Maps a Windows code page number to an encoding
fn code_page_encoding(code_page: i32) -> Option<&'static Encoding> {
    let label = match code_page {
        65001 => return Some(UTF_8),
        874 | 1250..=1258 => format!("windows-{}", code_page),
        932 => "shift_jis".to_string(),
        936 => "gbk".to_string(),
        949 => "euc-kr".to_string(),
        950 => "big5".to_string(),
        866 => "ibm866".to_string(),
        10000 => "macintosh".to_string(),
        _ => return None,
    };

    Encoding::for_label(label.as_bytes())
}

#[cfg(test)]
mod tests {
    use crate::{
        config::IngestOptions,
        rtf::{PICTURE_PLACEHOLDER, render_rtf, rtf_to_html},
    };

    fn compact(html: &str) -> String {
        html.split_whitespace().collect()
    }

    #[test]
    fn test_basic_formatting() {
        let html = rtf_to_html(r"{\rtf1 Hello\par World\b Bold\b0 End}");
        assert_eq!(html, "Hello<br><br> World<b>Bold</b>End");
        assert!(compact(&html).contains("Hello<br><br>World<b>Bold</b>End"));
    }

    /// Font tables, color tables and `\*` destinations produce nothing
    #[test]
    fn test_ignored_groups() {
        let html = rtf_to_html(
            r"{\rtf1\ansi\deff0{\fonttbl{\f0\froman Times New Roman;}}{\colortbl;\red0\green0\blue0;}{\*\generator Writer 1.0;}{\info{\title Secret}}Visible}",
        );
        assert_eq!(html, "Visible");
    }

    /// Escapes inside an ignored destination produce nothing either
    #[test]
    fn test_escapes_inside_ignored_groups() {
        let html = rtf_to_html(
            r"{\rtf1{\fonttbl{\f0 Caf\'e9 \{x\} \\ \u233?;}}{\info{\title A\'e9\{\}\\ \u233?\~\_}}ok}",
        );
        assert_eq!(html, "ok");
    }

    #[test]
    fn test_breaks_and_tabs() {
        let html = rtf_to_html("{\\rtf1 a\\line b\\tab c\\\nd}");
        assert_eq!(html, "a<br> b&emsp;c<br><br> d");
    }

    #[test]
    fn test_escaped_literals() {
        let html = rtf_to_html(r"{\rtf1 \{braces\} and \\ back <tag> & amp}");
        assert_eq!(html, r"{braces} and \ back &lt;tag&gt; &amp; amp");
    }

    #[test]
    fn test_code_page_and_unicode() {
        assert_eq!(rtf_to_html(r"{\rtf1\ansi\ansicpg1252 caf\'e9}"), "café");
        assert_eq!(rtf_to_html(r"{\rtf1\ansi\ansicpg1251 \'cc\'e8\'f0}"), "Мир");
        assert_eq!(rtf_to_html(r"{\rtf1\uc1 caf\u233?}"), "café");
        assert_eq!(rtf_to_html(r"{\rtf1\uc2 x\u8364\'80\'80y}"), "x€y");
        assert_eq!(rtf_to_html(r"{\rtf1 \u-10179?\u-8704?}"), "\u{1F600}");
    }

    #[test]
    fn test_special_characters() {
        let html = rtf_to_html(r"{\rtf1 a\~b\_c\-d\emdash\ldblquote q\rdblquote}");
        assert_eq!(html, "a&nbsp;b-cd\u{2014}\u{201C}q\u{201D}");
    }

    mod style_tests {
        use crate::rtf::rtf_to_html;

        /// Formatting set inside a group ends with the group
        #[test]
        fn test_group_scoped_bold() {
            assert_eq!(rtf_to_html(r"{\rtf1 a{\b bold}c}"), "a<b>bold</b>c");
        }

        #[test]
        fn test_overlapping_styles_stay_nested() {
            let html = rtf_to_html(r"{\rtf1 \b one\i two\b0 three\i0 four}");
            assert_eq!(html, "<b>one<i>two</i></b><i>three</i>four");
        }

        #[test]
        fn test_plain_and_unterminated_styles() {
            assert_eq!(rtf_to_html(r"{\rtf1 \b\i x\plain y}"), "<b><i>x</i></b>y");
            assert_eq!(rtf_to_html(r"{\rtf1 \i open"), "<i>open</i>");
        }
    }

    mod picture_tests {
        use crate::rtf::{PICTURE_PLACEHOLDER, rtf_to_html};

        #[test]
        fn test_png_picture() {
            let html = rtf_to_html(r"{\rtf1 A{\pict\pngblip\picw10\pich10 89504e47}B}");
            assert_eq!(html, "A<img src=\"data:image/png;base64,iVBORw==\"/>B");
        }

        #[test]
        fn test_jpeg_is_default() {
            let html = rtf_to_html("{\\rtf1 {\\pict\\picw1\nffd8\nffe0}}");
            assert_eq!(html, "<img src=\"data:image/jpeg;base64,/9j/4A==\"/>");
        }

        /// A picture inside an ignored destination is still captured
        #[test]
        fn test_picture_inside_ignored_group() {
            let html = rtf_to_html(r"{\rtf1 {\*\shppict{\pict\pngblip{\*\blipuid 1234}abcd}}x}");
            assert_eq!(html, "<img src=\"data:image/png;base64,q80=\"/>x");
        }

        #[test]
        fn test_odd_length_payload_is_placeholder() {
            let html = rtf_to_html(r"{\rtf1 before{\pict\jpegblip abc}after}");
            assert_eq!(html, format!("before{}after", PICTURE_PLACEHOLDER));
        }

        #[test]
        fn test_non_hex_payload_is_placeholder() {
            let html = rtf_to_html(r"{\rtf1 a{\pict\pngblip zzzz}b}");
            assert_eq!(html, format!("a{}b", PICTURE_PLACEHOLDER));
        }

        /// Word's `\nonshppict` fallback repeats the `\shppict` picture
        #[test]
        fn test_fallback_picture_is_dropped() {
            let html = rtf_to_html(
                r"{\rtf1{\*\shppict{\pict\pngblip abcd}}{\nonshppict{\pict\wmetafile8 0102}}x}",
            );
            assert_eq!(html.matches("<img").count(), 1);
            assert_eq!(html, "<img src=\"data:image/png;base64,q80=\"/>x");
        }

        #[test]
        fn test_empty_payload_emits_nothing() {
            assert_eq!(rtf_to_html(r"{\rtf1 a{\pict\pngblip}b}"), "ab");
        }
    }

    #[test]
    fn test_render_rtf_wraps_document() {
        let fragment = render_rtf(br"{\rtf1 Hello}", &IngestOptions::default());
        assert!(!fragment.is_error());
        assert!(fragment.as_str().contains("user-scalable=no"));
        assert!(fragment.as_str().contains("Hello"));
        assert!(!fragment.as_str().contains(PICTURE_PLACEHOLDER));
    }

    #[test]
    fn test_unbalanced_braces_do_not_panic() {
        assert_eq!(rtf_to_html(r"}}x{"), "x");
        assert_eq!(rtf_to_html(r"{\rtf1 end\"), "end");
        assert_eq!(rtf_to_html(r"{\rtf1 \'zz}"), "zz");
    }

    /// `\'` needs two hex digits; a sign is not one
    #[test]
    fn test_malformed_hex_escape() {
        assert_eq!(rtf_to_html(r"{\rtf1 x\'+ay}"), "x+ay");
        assert_eq!(rtf_to_html(r"{\rtf1 x\'a}"), "xa");
    }
}
