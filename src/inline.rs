//! Resource inliner
//!
//! Chapter markup references images by paths relative to the chapter. The
//! reading surface has no access to the container, so every reference that can
//! be resolved is replaced with a `data:` URI carrying the image itself.
//! References that cannot be resolved stay as they are; a broken image is
//! better than a chapter that does not render.

use std::sync::LazyLock;

use base64::{Engine, engine::general_purpose::STANDARD};
use log::{debug, warn};
use regex::{Captures, Regex};

use crate::{resource::ResourceLookup, utils::percent_decode};

static SRC_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"src\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid src attribute regex")
});

/// Resolves `reference` against the directory of `base_href`
///
/// Both are container paths using `/` as separator. A reference starting with
/// `/` is resolved from the container root instead.
///
/// Segments are applied to a stack: `..` pops one segment and is ignored when
/// the stack is already empty, `.` and empty segments do nothing, anything else
/// is pushed. A literal `...` segment is treated like `..`, matching how older
/// books were read before.
pub fn resolve_relative_path(base_href: &str, reference: &str) -> String {
    let (folder, reference) = match reference.strip_prefix('/') {
        Some(rooted) => ("", rooted),
        None => (
            base_href
                .rsplit_once('/')
                .map(|(folder, _)| folder)
                .unwrap_or(""),
            reference,
        ),
    };

    let mut stack = Vec::new();
    for segment in folder.split('/').chain(reference.split('/')) {
        match segment {
            ".." | "..." => {
                stack.pop();
            }
            "." | "" => {}
            _ => stack.push(segment),
        }
    }

    stack.join("/")
}

/// Infers an image media type from the extension of `path`
///
/// Anything that is not PNG, GIF or SVG is assumed to be JPEG.
pub fn mime_for_path(path: &str) -> &'static str {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".gif") {
        "image/gif"
    } else if lower.ends_with(".svg") {
        "image/svg+xml"
    } else {
        "image/jpeg"
    }
}

/// Builds a base64 `data:` URI
pub fn data_uri(mime: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(data))
}

/// Replaces resolvable `src` references in `markup` with embedded data
///
/// ## Parameters
/// - `markup`: The chapter markup
/// - `base_href`: The container path of the chapter, used as resolution root
/// - `lookup`: Where resolved paths are looked up
/// - `max_bytes`: Images larger than this stay as references
///
/// ## Notes
/// - Absolute URLs and `data:` URIs are never touched.
/// - A reference is percent-decoded before it is resolved; a reference that
///   does not decode is resolved as written.
/// - One failing image never affects the other references.
pub fn inline_resources<L: ResourceLookup + ?Sized>(
    markup: &str,
    base_href: &str,
    lookup: &L,
    max_bytes: Option<usize>,
) -> String {
    SRC_ATTRIBUTE
        .replace_all(markup, |captures: &Captures| {
            let original = &captures[0];
            let (reference, quote) = match (captures.get(1), captures.get(2)) {
                (Some(value), _) => (value.as_str(), '"'),
                (None, Some(value)) => (value.as_str(), '\''),
                (None, None) => return original.to_string(),
            };

            match inline_reference(reference, base_href, lookup, max_bytes) {
                Some(uri) => format!("src={quote}{uri}{quote}"),
                None => original.to_string(),
            }
        })
        .into_owned()
}

fn inline_reference<L: ResourceLookup + ?Sized>(
    reference: &str,
    base_href: &str,
    lookup: &L,
    max_bytes: Option<usize>,
) -> Option<String> {
    if reference.is_empty() || is_external(reference) {
        return None;
    }

    let reference = reference.split('#').next().unwrap_or(reference);
    let decoded = percent_decode(reference);
    let resolved = resolve_relative_path(base_href, decoded.as_deref().unwrap_or(reference));

    let Some(data) = lookup.lookup(&resolved) else {
        debug!("Image \"{}\" referenced by \"{}\" not found", resolved, base_href);
        return None;
    };

    if data.is_empty() {
        warn!("Image \"{}\" is empty, leaving the reference", resolved);
        return None;
    }

    if max_bytes.is_some_and(|limit| data.len() > limit) {
        warn!(
            "Image \"{}\" is {} bytes, too large to inline",
            resolved,
            data.len()
        );
        return None;
    }

    Some(data_uri(mime_for_path(&resolved), data))
}

/// Absolute URLs and already-embedded data
fn is_external(reference: &str) -> bool {
    let lower = reference.trim_start().to_ascii_lowercase();
    lower.starts_with("data:")
        || lower.starts_with("http:")
        || lower.starts_with("https:")
        || lower.starts_with("//")
        || lower.contains("://")
}
