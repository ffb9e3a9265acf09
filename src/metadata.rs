//! Package document (OPF) parser using quick-xml SAX-style parsing
//!
//! Extracts Dublin Core metadata and the manifest. Manifest hrefs are
//! resolved against the package document's directory so every item carries
//! a normalized archive path.

extern crate alloc;

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::EpubError;
use crate::path::{percent_decode, resolve_relative};
use crate::xml::{attr_value, find_attr, resolve_entity, Nesting};

/// Media type of EPUB 2 NCX navigation documents
pub const NCX_MEDIA_TYPE: &str = "application/x-dtbncx+xml";

/// A single item in the EPUB manifest
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestItem {
    /// Resource identifier
    pub id: String,
    /// Reference exactly as written in the package document
    pub href: String,
    /// Normalized archive path
    pub path: String,
    /// MIME type (empty when not declared)
    pub media_type: String,
    /// Optional properties (e.g. "cover-image", "nav")
    pub properties: Option<String>,
}

impl ManifestItem {
    /// Whether the space-separated `properties` list contains `property`.
    pub fn has_property(&self, property: &str) -> bool {
        self.properties
            .as_deref()
            .is_some_and(|p| p.split_whitespace().any(|p| p == property))
    }

    /// Whether this item is an EPUB 2 NCX document.
    pub fn is_ncx(&self) -> bool {
        self.media_type == NCX_MEDIA_TYPE || self.path.to_ascii_lowercase().ends_with(".ncx")
    }
}

/// EPUB metadata and manifest extracted from the package document
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EpubMetadata {
    /// Book title
    pub title: String,
    /// Author name (first `dc:creator`)
    pub author: String,
    /// Language code (e.g. "en")
    pub language: String,
    /// Unique identifier (dc:identifier)
    pub identifier: Option<String>,
    /// Publisher (dc:publisher)
    pub publisher: Option<String>,
    /// Publication date (dc:date)
    pub date: Option<String>,
    /// Book description / blurb (dc:description)
    pub description: Option<String>,
    /// Subject tags (dc:subject)
    pub subjects: Vec<String>,
    /// Manifest ID of the cover image, if any
    pub cover_id: Option<String>,
    /// All resources declared in the manifest, in document order
    pub manifest: Vec<ManifestItem>,
}

impl EpubMetadata {
    /// Get manifest item by id
    pub fn get_item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    /// Get manifest item by normalized archive path
    pub fn item_by_path(&self, path: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.path == path)
    }

    /// Get cover image manifest item
    pub fn cover_item(&self) -> Option<&ManifestItem> {
        self.cover_id.as_deref().and_then(|id| self.get_item(id))
    }
}

/// Parse the package document at `package_path`.
///
/// Fails with `MalformedPackage` on XML errors and `MissingManifest` when no
/// `<manifest>` element is present. Items lacking `id` or `href` are skipped.
pub fn parse_opf(content: &[u8], package_path: &str) -> Result<EpubMetadata, EpubError> {
    let mut reader = Reader::from_reader(content);
    // Entity references split text events, so values are trimmed on store instead.
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    let mut nesting = Nesting::default();
    let mut metadata = EpubMetadata::default();

    let mut saw_manifest = false;
    let mut in_metadata = false;
    let mut in_manifest = false;
    // Dublin Core element currently collecting text, and its text so far.
    let mut current_field: Option<String> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(malformed)? {
            Event::Start(e) => {
                nesting.start();
                let name = local_name(&reader, &e)?;
                match name.as_str() {
                    "metadata" => in_metadata = true,
                    "manifest" => {
                        in_manifest = true;
                        saw_manifest = true;
                    }
                    "item" if in_manifest => {
                        push_manifest_item(&reader, &e, package_path, &mut metadata)?
                    }
                    "meta" if in_metadata => read_cover_meta(&reader, &e, &mut metadata)?,
                    _ if in_metadata && nesting.depth() > 0 => {
                        current_field = Some(name.clone());
                        text.clear();
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                nesting.empty();
                let name = local_name(&reader, &e)?;
                match name.as_str() {
                    "manifest" => saw_manifest = true,
                    "item" if in_manifest => {
                        push_manifest_item(&reader, &e, package_path, &mut metadata)?
                    }
                    "meta" if in_metadata => read_cover_meta(&reader, &e, &mut metadata)?,
                    _ => {}
                }
            }
            Event::Text(e) => {
                nesting
                    .text(&e)
                    .map_err(|msg| EpubError::MalformedPackage(msg.to_string()))?;
                if current_field.is_some() {
                    let value = e.decode().map_err(malformed)?;
                    text.push_str(&value);
                }
            }
            Event::CData(e) => {
                if current_field.is_some() {
                    text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::GeneralRef(e) => {
                if current_field.is_some() {
                    let name = e.decode().map_err(malformed)?;
                    text.push_str(&resolve_entity(&name));
                }
            }
            Event::End(e) => {
                nesting.end();
                let name = reader
                    .decoder()
                    .decode(e.local_name().as_ref())
                    .map_err(malformed)?
                    .to_string();
                match name.as_str() {
                    "metadata" => in_metadata = false,
                    "manifest" => in_manifest = false,
                    _ => {}
                }
                if let Some(field) = current_field.take() {
                    if field == name {
                        store_field(&mut metadata, &field, text.trim());
                    } else {
                        current_field = Some(field);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    nesting
        .finish()
        .map_err(|msg| EpubError::MalformedPackage(msg.to_string()))?;
    if !saw_manifest {
        return Err(EpubError::MissingManifest);
    }

    // EPUB 3 `cover-image` takes precedence over the EPUB 2 meta tag.
    if let Some(item) = metadata.manifest.iter().find(|i| i.has_property("cover-image")) {
        metadata.cover_id = Some(item.id.clone());
    }

    Ok(metadata)
}

fn malformed<E: core::fmt::Debug>(err: E) -> EpubError {
    EpubError::MalformedPackage(format!("XML parse error: {:?}", err))
}

fn local_name(reader: &Reader<&[u8]>, e: &BytesStart<'_>) -> Result<String, EpubError> {
    reader
        .decoder()
        .decode(e.local_name().as_ref())
        .map(|name| name.to_string())
        .map_err(malformed)
}

/// Record a finished Dublin Core element.
fn store_field(metadata: &mut EpubMetadata, field: &str, value: &str) {
    if value.is_empty() {
        return;
    }
    let value = value.to_string();
    match field {
        "title" if metadata.title.is_empty() => metadata.title = value,
        "creator" if metadata.author.is_empty() => metadata.author = value,
        "language" if metadata.language.is_empty() => metadata.language = value,
        "identifier" if metadata.identifier.is_none() => metadata.identifier = Some(value),
        "publisher" => metadata.publisher = Some(value),
        "date" if metadata.date.is_none() => metadata.date = Some(value),
        "description" => metadata.description = Some(value),
        "subject" => metadata.subjects.push(value),
        _ => {}
    }
}

/// Parse a manifest `<item>` and append it when both `id` and `href` exist.
fn push_manifest_item(
    reader: &Reader<&[u8]>,
    e: &BytesStart<'_>,
    package_path: &str,
    metadata: &mut EpubMetadata,
) -> Result<(), EpubError> {
    let mut id = None;
    let mut href = None;
    let mut media_type = String::new();
    let mut properties = None;

    for attr in e.attributes() {
        let attr = attr.map_err(malformed)?;
        let value = attr_value(reader, &attr).map_err(EpubError::MalformedPackage)?;
        match attr.key.local_name().as_ref() {
            b"id" => id = Some(value),
            b"href" => href = Some(value),
            b"media-type" => media_type = value,
            b"properties" => properties = Some(value),
            _ => {}
        }
    }

    let (Some(id), Some(href)) = (id, href) else {
        return Ok(());
    };
    if id.is_empty() || href.is_empty() {
        return Ok(());
    }

    let path = resolve_relative(package_path, &percent_decode(&href));
    metadata.manifest.push(ManifestItem {
        id,
        href,
        path,
        media_type,
        properties,
    });
    Ok(())
}

/// EPUB 2 `<meta name="cover" content="..."/>`
fn read_cover_meta(
    reader: &Reader<&[u8]>,
    e: &BytesStart<'_>,
    metadata: &mut EpubMetadata,
) -> Result<(), EpubError> {
    let name = find_attr(reader, e, b"name").map_err(EpubError::MalformedPackage)?;
    if name.as_deref() != Some("cover") {
        return Ok(());
    }
    if let Some(content) = find_attr(reader, e, b"content").map_err(EpubError::MalformedPackage)? {
        if !content.is_empty() {
            metadata.cover_id = Some(content);
        }
    }
    Ok(())
}
