use std::{collections::HashMap, io::Cursor};

use encoding_rs::{Encoding, UTF_8};
use log::{debug, warn};
use zip::ZipArchive;

use crate::{
    config::IngestOptions,
    error::{EbookError, ParseFailure},
    inline::resolve_relative_path,
    resource::{ResourceLookup, ResourceTable},
    types::{EncryptionData, ManifestItem, MetadataItem, SpineItem},
    utils::{NormalizeWhitespace, XmlElement, XmlReader, decode_text, read_zip_entries},
};

const CONTAINER_PATH: &str = "META-INF/container.xml";
const ENCRYPTION_PATH: &str = "META-INF/encryption.xml";
const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";

/// An opened EPUB publication
///
/// `EpubModel` is the result of a successful [EpubModel::open]. Every entry of
/// the archive is read into a [ResourceTable] while opening, so the model owns
/// all of its data, holds no file handle and can be shared between threads.
/// The model is immutable; opening the same bytes twice yields equal chapter
/// lists.
///
/// Opening walks the configured encodings in order. The container and package
/// documents are decoded with each encoding in turn until one produces a
/// complete package; legacy books that declare UTF-8 but contain Latin-1 bytes
/// are read on the second attempt.
#[derive(Debug)]
pub struct EpubModel {
    /// The path to the OPF file
    pub package_path: String,

    /// The directory of the OPF file, empty for the container root
    pub base_path: String,

    /// The encoding that decoded the package documents
    pub encoding: &'static Encoding,

    /// Dublin Core metadata extracted from the OPF file
    pub metadata: Vec<MetadataItem>,

    /// The resources declared in the manifest, by id
    pub manifest: HashMap<String, ManifestItem>,

    /// The reading order; every entry references an existing manifest item
    pub spine: Vec<SpineItem>,

    /// Entries of `META-INF/encryption.xml`
    pub encryption: Vec<EncryptionData>,

    cover_id: Option<String>,
    resources: ResourceTable,
}

/// Everything parsed out of the container and package documents
struct Package {
    package_path: String,
    base_path: String,
    metadata: Vec<MetadataItem>,
    manifest: HashMap<String, ManifestItem>,
    spine: Vec<SpineItem>,
    encryption: Vec<EncryptionData>,
    cover_id: Option<String>,
}

impl EpubModel {
    /// Opens an EPUB from its bytes with the default options
    pub fn open(bytes: &[u8]) -> Result<Self, EbookError> {
        Self::open_with(bytes, &IngestOptions::default())
    }

    /// Opens an EPUB from its bytes
    ///
    /// ## Return
    /// - `Ok(EpubModel)`: The parsed publication
    /// - `Err(EbookError::ParseFailure)`: [ParseFailure::Corrupt] when the archive is
    ///   unreadable or no configured encoding yields a complete package
    pub fn open_with(bytes: &[u8], options: &IngestOptions) -> Result<Self, EbookError> {
        let archive = ZipArchive::new(Cursor::new(bytes)).map_err(|err| {
            warn!("Unreadable EPUB archive: {}", err);
            EbookError::corrupt(format!("unreadable archive: {}", err))
        })?;
        let entries = read_zip_entries(archive).map_err(|err| {
            warn!("Unreadable EPUB entry: {}", err);
            EbookError::corrupt(err.to_string())
        })?;
        let resources = ResourceTable::with_strategies(entries, options.lookup_strategies.clone());

        let mut failures = Vec::new();
        for &encoding in options.encodings() {
            match Self::parse_package(&resources, encoding) {
                Ok(package) => {
                    debug!(
                        "Opened EPUB package \"{}\" as {} with {} chapters",
                        package.package_path,
                        encoding.name(),
                        package.spine.len()
                    );
                    return Ok(Self::assemble(package, resources, encoding));
                }
                Err(err) => {
                    warn!("Parsing EPUB as {} failed: {}", encoding.name(), err);
                    failures.push(format!("{}: {}", encoding.name(), err));
                }
            }
        }

        Err(EbookError::corrupt(failures.join("; ")))
    }

    fn assemble(package: Package, resources: ResourceTable, encoding: &'static Encoding) -> Self {
        Self {
            package_path: package.package_path,
            base_path: package.base_path,
            encoding,
            metadata: package.metadata,
            manifest: package.manifest,
            spine: package.spine,
            encryption: package.encryption,
            cover_id: package.cover_id,
            resources,
        }
    }

    /// Parses the container and package documents under one encoding
    ///
    /// Parsing process
    /// 1. Parse `META-INF/container.xml` to find the OPF file
    /// 2. Parse the OPF file: metadata, manifest and spine
    /// 3. Parse `META-INF/encryption.xml` when present
    /// 4. Determine the cover image
    fn parse_package(
        resources: &ResourceTable,
        encoding: &'static Encoding,
    ) -> Result<Package, EbookError> {
        let container = Self::read_xml(resources, CONTAINER_PATH, encoding)?;
        let package_path = Self::parse_container(&container)?;
        let base_path = package_path
            .rsplit_once('/')
            .map(|(folder, _)| folder.to_string())
            .unwrap_or_default();

        let opf = Self::read_xml(resources, &package_path, encoding)?;

        let manifest_element = opf.find_elements_by_name("manifest").next().ok_or_else(|| {
            EbookError::NonCanonicalFile {
                tag: "manifest".to_string(),
            }
        })?;
        let spine_element = opf.find_elements_by_name("spine").next().ok_or_else(|| {
            EbookError::NonCanonicalFile {
                tag: "spine".to_string(),
            }
        })?;

        let (metadata, cover_meta) = match opf.find_elements_by_name("metadata").next() {
            Some(element) => Self::parse_metadata(element),
            None => (Vec::new(), None),
        };
        let manifest = Self::parse_manifest(manifest_element, &package_path);
        let spine = Self::parse_spine(spine_element, &manifest);
        let encryption = Self::parse_encryption(resources, encoding);
        let cover_id = Self::determine_cover(&manifest, cover_meta.as_deref(), &package_path);

        Ok(Package {
            package_path,
            base_path,
            metadata,
            manifest,
            spine,
            encryption,
            cover_id,
        })
    }

    fn read_xml(
        resources: &ResourceTable,
        path: &str,
        encoding: &'static Encoding,
    ) -> Result<XmlElement, EbookError> {
        let bytes = resources
            .get(path)
            .ok_or_else(|| EbookError::NonCanonicalEpub {
                expected_file: path.to_string(),
            })?;
        let text = decode_text(bytes, encoding, path)?;
        XmlReader::parse(&text)
    }

    /// Extracts the path of the OPF file from `container.xml`
    ///
    /// When several `rootfile` elements exist, the first one declaring the OPF
    /// media type wins, then the first one at all.
    fn parse_container(root: &XmlElement) -> Result<String, EbookError> {
        let rootfiles: Vec<&XmlElement> = root.find_elements_by_name("rootfile").collect();
        let rootfile = rootfiles
            .iter()
            .find(|element| {
                element.get_attr("media-type").as_deref() == Some("application/oebps-package+xml")
            })
            .or_else(|| rootfiles.first())
            .ok_or_else(|| EbookError::NonCanonicalFile {
                tag: "rootfile".to_string(),
            })?;

        let path = rootfile
            .get_attr("full-path")
            .ok_or_else(|| EbookError::MissingRequiredAttribute {
                tag: "rootfile".to_string(),
                attribute: "full-path".to_string(),
            })?;

        Ok(resolve_relative_path("", &path))
    }

    /// Collects Dublin Core metadata and the EPUB 2 cover declaration
    ///
    /// Elements are matched by namespace, or by the `dc` prefix for books that
    /// forgot to declare it. Nested containers such as `dc-metadata` are searched too.
    fn parse_metadata(metadata_element: &XmlElement) -> (Vec<MetadataItem>, Option<String>) {
        let mut metadata = Vec::new();
        let mut cover = None;

        let mut elements = Vec::new();
        Self::collect_descendants(metadata_element, &mut elements);

        for element in elements {
            let is_dc = element.namespace.as_deref() == Some(DC_NAMESPACE)
                || element.prefix.as_deref() == Some("dc");

            if is_dc {
                let value = element.text().normalize_whitespace();
                if value.is_empty() {
                    continue;
                }

                metadata.push(MetadataItem {
                    id: element.get_attr("id"),
                    property: element.name.clone(),
                    value,
                    lang: element.get_attr("xml:lang"),
                });
            } else if element.name == "meta"
                && element.get_attr("name").as_deref() == Some("cover")
                && cover.is_none()
            {
                cover = element.get_attr("content");
            }
        }

        (metadata, cover)
    }

    fn collect_descendants<'a>(element: &'a XmlElement, collection: &mut Vec<&'a XmlElement>) {
        for child in element.children() {
            collection.push(child);
            Self::collect_descendants(child, collection);
        }
    }

    /// Collects manifest items by id
    ///
    /// Items without `id` or `href` cannot be referenced and are skipped. The
    /// path of each item is resolved against the OPF file.
    fn parse_manifest(
        manifest_element: &XmlElement,
        package_path: &str,
    ) -> HashMap<String, ManifestItem> {
        let estimated_items = manifest_element.children().count();
        let mut resources = HashMap::with_capacity(estimated_items);

        for element in manifest_element.children() {
            let (Some(id), Some(href)) = (element.get_attr("id"), element.get_attr("href")) else {
                warn!("Skipping manifest {} without id or href", element.tag_name());
                continue;
            };
            let mime = element
                .get_attr("media-type")
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let href = href.split('#').next().unwrap_or_default();

            resources.insert(
                id.clone(),
                ManifestItem {
                    id,
                    path: resolve_relative_path(package_path, href),
                    mime,
                    properties: element.get_attr("properties"),
                },
            );
        }

        resources
    }

    /// Collects the reading order
    ///
    /// Entries referencing a missing manifest item are dropped, so every index
    /// of the chapter list maps to a declared resource.
    fn parse_spine(
        spine_element: &XmlElement,
        manifest: &HashMap<String, ManifestItem>,
    ) -> Vec<SpineItem> {
        let mut spine = Vec::new();
        for element in spine_element.children() {
            let Some(idref) = element.get_attr("idref") else {
                warn!("Skipping spine {} without idref", element.tag_name());
                continue;
            };

            if !manifest.contains_key(&idref) {
                warn!("Spine references unknown manifest item \"{}\"", idref);
                continue;
            }

            let linear = element
                .get_attr("linear")
                .map(|linear| linear != "no")
                .unwrap_or(true);

            spine.push(SpineItem { idref, linear });
        }

        spine
    }

    /// Parses `META-INF/encryption.xml`
    ///
    /// The file is optional and a malformed one is ignored; it only ever makes
    /// individual resources unreadable.
    fn parse_encryption(resources: &ResourceTable, encoding: &'static Encoding) -> Vec<EncryptionData> {
        if resources.resolve_key(ENCRYPTION_PATH).is_none() {
            return Vec::new();
        }

        let root = match Self::read_xml(resources, ENCRYPTION_PATH, encoding) {
            Ok(root) => root,
            Err(err) => {
                warn!("Ignoring unreadable {}: {}", ENCRYPTION_PATH, err);
                return Vec::new();
            }
        };

        root.find_elements_by_name("EncryptedData")
            .filter_map(|data| {
                let method = data
                    .find_elements_by_name("EncryptionMethod")
                    .next()
                    .and_then(|method| method.get_attr("Algorithm"))?;
                let uri = data
                    .find_elements_by_name("CipherReference")
                    .next()
                    .and_then(|reference| reference.get_attr("URI"))?;

                Some(EncryptionData {
                    method,
                    data: resolve_relative_path("", &uri),
                })
            })
            .collect()
    }

    /// Finds the manifest id of the cover image
    ///
    /// Tried in order:
    /// 1. an item with the EPUB 3 `cover-image` property
    /// 2. the EPUB 2 `<meta name="cover">` value, as an id or as a path
    /// 3. an image item whose id is `cover` or `cover-image`
    fn determine_cover(
        manifest: &HashMap<String, ManifestItem>,
        cover_meta: Option<&str>,
        package_path: &str,
    ) -> Option<String> {
        if let Some(id) = Self::first_matching(manifest, |item| item.has_property("cover-image")) {
            return Some(id);
        }

        if let Some(meta) = cover_meta {
            if manifest.contains_key(meta) {
                return Some(meta.to_string());
            }

            let path = resolve_relative_path(package_path, meta);
            if let Some(id) = Self::first_matching(manifest, |item| item.path == path) {
                return Some(id);
            }
        }

        ["cover", "cover-image"]
            .iter()
            .filter_map(|id| manifest.get(*id))
            .find(|item| item.is_image())
            .map(|item| item.id.clone())
    }

    /// The id of the matching item with the lowest id
    fn first_matching(
        manifest: &HashMap<String, ManifestItem>,
        predicate: impl Fn(&ManifestItem) -> bool,
    ) -> Option<String> {
        manifest
            .values()
            .filter(|item| predicate(item))
            .min_by(|a, b| a.id.cmp(&b.id))
            .map(|item| item.id.clone())
    }

    /// The number of chapters in reading order
    pub fn chapter_count(&self) -> usize {
        self.spine.len()
    }

    /// The container path of the chapter at `index`
    ///
    /// ## Return
    /// - `Ok(&str)`: The path, stable for the lifetime of the model
    /// - `Err(EbookError::IndexOutOfRange)`: `index` is not below [Self::chapter_count]
    pub fn chapter_href(&self, index: usize) -> Result<&str, EbookError> {
        self.spine
            .get(index)
            .and_then(|item| self.manifest.get(&item.idref))
            .map(|item| item.path.as_str())
            .ok_or(EbookError::IndexOutOfRange {
                index,
                count: self.spine.len(),
            })
    }

    /// The paths of all chapters in reading order
    pub fn chapter_hrefs(&self) -> Vec<String> {
        (0..self.chapter_count())
            .filter_map(|index| self.chapter_href(index).ok())
            .map(str::to_string)
            .collect()
    }

    /// The markup of the chapter at `index`, decoded as UTF-8
    ///
    /// A byte order mark selects UTF-16 instead. Failures concern this chapter
    /// only; the model stays usable.
    ///
    /// ## Return
    /// - `Err(EbookError::IndexOutOfRange)`: No such chapter
    /// - `Err(EbookError::ResourceNotFound)`: The chapter file is missing from the archive
    /// - `Err(EbookError::ParseFailure)`: [ParseFailure::EncodingError] for invalid
    ///   bytes, [ParseFailure::Encrypted] for a protected chapter
    pub fn chapter_raw_markup(&self, index: usize) -> Result<String, EbookError> {
        let href = self.chapter_href(index)?;

        if self.is_encrypted(href) {
            return Err(ParseFailure::Encrypted {
                resource: href.to_string(),
            }
            .into());
        }

        let bytes = self
            .resources
            .get(href)
            .ok_or_else(|| EbookError::ResourceNotFound {
                resource: href.to_string(),
            })?;

        decode_text(bytes, UTF_8, href)
    }

    /// Looks up a resource by container path
    ///
    /// Absence is a normal outcome, not an error.
    pub fn resource(&self, path: &str) -> Option<&[u8]> {
        self.resources.get(path)
    }

    /// The table holding every file of the container
    pub fn resources(&self) -> &ResourceTable {
        &self.resources
    }

    /// The manifest item of the cover image, if the book declares one
    pub fn cover_item(&self) -> Option<&ManifestItem> {
        self.cover_id.as_ref().and_then(|id| self.manifest.get(id))
    }

    /// The bytes of the cover image, if the book declares one
    pub fn cover_image(&self) -> Option<&[u8]> {
        self.cover_item()
            .and_then(|item| self.resources.get(&item.path))
    }

    /// The first title of the publication
    pub fn title(&self) -> Option<&str> {
        self.metadata_value("title").into_iter().next()
    }

    /// All metadata values for a Dublin Core property such as `creator`
    pub fn metadata_value(&self, key: &str) -> Vec<&str> {
        self.metadata
            .iter()
            .filter(|item| item.property == key)
            .map(|item| item.value.as_str())
            .collect()
    }

    /// Checks whether `path` is protected by a method other than font obfuscation
    fn is_encrypted(&self, path: &str) -> bool {
        let key = self.resources.resolve_key(path);

        self.encryption
            .iter()
            .filter(|encryption| !encryption.is_font_obfuscation())
            .any(|encryption| {
                encryption.data == path
                    || (key.is_some() && self.resources.resolve_key(&encryption.data) == key)
            })
    }
}

impl ResourceLookup for EpubModel {
    fn lookup(&self, path: &str) -> Option<&[u8]> {
        self.resource(path)
    }
}
