//! In-memory EPUB containers for tests

use std::io::{Cursor, Write};

use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

pub(crate) const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

/// A tiny PNG signature followed by filler, enough to be recognizable
pub(crate) const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3];

pub(crate) const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

/// Builds the bytes of an EPUB container file by file
pub(crate) struct EpubFixture {
    files: Vec<(String, Vec<u8>)>,
}

impl EpubFixture {
    /// A container with `mimetype` and a `container.xml` pointing to `OEBPS/content.opf`
    pub(crate) fn new() -> Self {
        Self {
            files: vec![
                ("mimetype".to_string(), b"application/epub+zip".to_vec()),
                (
                    "META-INF/container.xml".to_string(),
                    CONTAINER_XML.as_bytes().to_vec(),
                ),
            ],
        }
    }

    /// A two-chapter book with an image and an EPUB 3 cover
    pub(crate) fn sample() -> Self {
        Self::new()
            .file(
                "OEBPS/content.opf",
                package_document(
                    r#"<dc:title>Sample Book</dc:title><dc:creator>A. Author</dc:creator><dc:language>en</dc:language><dc:identifier id="uid">urn:uuid:1</dc:identifier>"#,
                    r#"<item id="ch1" href="Text/chapter1.xhtml" media-type="application/xhtml+xml"/>
                       <item id="ch2" href="Text/chapter2.xhtml" media-type="application/xhtml+xml"/>
                       <item id="pic" href="Images/pic.png" media-type="image/png"/>
                       <item id="cover" href="Images/cover.jpg" media-type="image/jpeg" properties="cover-image"/>"#,
                    r#"<itemref idref="ch1"/><itemref idref="ch2"/>"#,
                ),
            )
            .file(
                "OEBPS/Text/chapter1.xhtml",
                chapter("Chapter One", r#"<p>First</p><img src="../Images/pic.png" alt="pic"/>"#),
            )
            .file("OEBPS/Text/chapter2.xhtml", chapter("Chapter Two", "<p>Second</p>"))
            .file("OEBPS/Images/pic.png", PNG_BYTES)
            .file("OEBPS/Images/cover.jpg", JPEG_BYTES)
    }

    pub(crate) fn file(mut self, path: &str, data: impl AsRef<[u8]>) -> Self {
        self.files.retain(|(name, _)| name != path);
        self.files.push((path.to_string(), data.as_ref().to_vec()));
        self
    }

    pub(crate) fn without(mut self, path: &str) -> Self {
        self.files.retain(|(name, _)| name != path);
        self
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in &self.files {
            let method = if name == "mimetype" {
                CompressionMethod::Stored
            } else {
                CompressionMethod::Deflated
            };
            let options = SimpleFileOptions::default().compression_method(method);

            zip.start_file(name.as_str(), options).unwrap();
            zip.write_all(data).unwrap();
        }

        zip.finish().unwrap().into_inner()
    }
}

/// An OPF package document with the given metadata, manifest and spine children
pub(crate) fn package_document(metadata: &str, manifest: &str, spine: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">{}</metadata>
  <manifest>{}</manifest>
  <spine>{}</spine>
</package>"#,
        metadata, manifest, spine
    )
}

/// An XHTML content document
pub(crate) fn chapter(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>{}</title></head><body>{}</body></html>"#,
        title, body
    )
}
