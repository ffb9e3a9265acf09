//! EPUB spine parser
//!
//! The spine defines the reading order of chapters. Item references are
//! parsed from the package document in document order and then resolved
//! against the manifest into archive paths.

extern crate alloc;

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::EpubError;
use crate::metadata::EpubMetadata;
use crate::xml::{attr_value, Nesting};

/// A raw `<itemref>` as written in the package document
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemRef {
    /// Manifest item this spine entry references
    pub idref: String,
    /// Whether this item is part of the linear reading order
    pub linear: bool,
}

/// Spine section of a package document before manifest resolution
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpineDocument {
    /// Item references in document order
    pub itemrefs: Vec<ItemRef>,
    /// `<spine toc="...">` (EPUB 2 NCX reference)
    pub toc_id: Option<String>,
}

/// A single resolved spine entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpineItem {
    /// Manifest id the entry was resolved from
    pub idref: String,
    /// Normalized archive path of the content document
    pub path: String,
    /// `linear="no"` marks auxiliary content
    pub linear: bool,
}

/// Reading order of a book, every entry resolved to an archive path
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Spine {
    items: Vec<SpineItem>,
    toc_id: Option<String>,
}

impl Spine {
    /// Resolve each item reference through the manifest.
    ///
    /// Order is kept exactly and duplicates are not collapsed. The first
    /// reference without a manifest entry fails the whole spine.
    pub fn resolve(doc: &SpineDocument, metadata: &EpubMetadata) -> Result<Self, EpubError> {
        let mut items = Vec::with_capacity(doc.itemrefs.len());
        for itemref in &doc.itemrefs {
            let item = metadata
                .get_item(&itemref.idref)
                .ok_or_else(|| EpubError::DanglingSpineRef {
                    idref: itemref.idref.clone(),
                })?;
            items.push(SpineItem {
                idref: itemref.idref.clone(),
                path: item.path.clone(),
                linear: itemref.linear,
            });
        }
        Ok(Self {
            items,
            toc_id: doc.toc_id.clone(),
        })
    }

    /// Ordered spine entries
    pub fn items(&self) -> &[SpineItem] {
        &self.items
    }

    /// Optional TOC item id from `<spine toc="...">`
    pub fn toc_id(&self) -> Option<&str> {
        self.toc_id.as_deref()
    }

    /// Number of chapters
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the spine has no entries
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Spine entry at `index`
    pub fn get(&self, index: usize) -> Option<&SpineItem> {
        self.items.get(index)
    }

    /// Archive path of the chapter at `index`
    pub fn path(&self, index: usize) -> Option<&str> {
        self.items.get(index).map(|item| item.path.as_str())
    }

    /// Chapter paths in reading order
    pub fn paths(&self) -> impl Iterator<Item = &str> + '_ {
        self.items.iter().map(|item| item.path.as_str())
    }

    /// First spine position holding `path` (fragment ignored)
    pub fn index_of(&self, path: &str) -> Option<usize> {
        let path = path.split('#').next().unwrap_or(path);
        self.items.iter().position(|item| item.path == path)
    }
}

/// Parse the spine section of an OPF document.
///
/// Item references without an `idref` are skipped. A package document with
/// no `<spine>` element fails with `MissingSpine`.
pub fn parse_spine(content: &[u8]) -> Result<SpineDocument, EpubError> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut nesting = Nesting::default();
    let mut doc = SpineDocument::default();
    let mut saw_spine = false;
    let mut in_spine = false;

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| EpubError::MalformedPackage(format!("XML parse error: {:?}", e)))?
        {
            Event::Start(e) => {
                nesting.start();
                match e.local_name().as_ref() {
                    b"spine" => {
                        saw_spine = true;
                        in_spine = true;
                        doc.toc_id = toc_attr(&reader, &e)?;
                    }
                    b"itemref" if in_spine => push_itemref(&reader, &e, &mut doc)?,
                    _ => {}
                }
            }
            Event::Empty(e) => {
                nesting.empty();
                match e.local_name().as_ref() {
                    b"spine" => {
                        saw_spine = true;
                        doc.toc_id = toc_attr(&reader, &e)?;
                    }
                    b"itemref" if in_spine => push_itemref(&reader, &e, &mut doc)?,
                    _ => {}
                }
            }
            Event::End(e) => {
                nesting.end();
                if e.local_name().as_ref() == b"spine" {
                    in_spine = false;
                }
            }
            Event::Text(e) => nesting
                .text(&e)
                .map_err(|msg| EpubError::MalformedPackage(msg.to_string()))?,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    nesting
        .finish()
        .map_err(|msg| EpubError::MalformedPackage(msg.to_string()))?;

    if !saw_spine {
        return Err(EpubError::MissingSpine);
    }
    Ok(doc)
}

fn toc_attr(reader: &Reader<&[u8]>, e: &BytesStart<'_>) -> Result<Option<String>, EpubError> {
    let toc = crate::xml::find_attr(reader, e, b"toc").map_err(EpubError::MalformedPackage)?;
    Ok(toc.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()))
}

fn push_itemref(
    reader: &Reader<&[u8]>,
    e: &BytesStart<'_>,
    doc: &mut SpineDocument,
) -> Result<(), EpubError> {
    let mut idref = None;
    let mut linear = true;

    for attr in e.attributes() {
        let attr = attr.map_err(|e| EpubError::MalformedPackage(format!("Attr error: {:?}", e)))?;
        let value = attr_value(reader, &attr).map_err(EpubError::MalformedPackage)?;
        match attr.key.local_name().as_ref() {
            b"idref" => idref = Some(value.trim().to_string()),
            b"linear" => linear = value.trim() != "no",
            _ => {}
        }
    }

    if let Some(idref) = idref.filter(|id| !id.is_empty()) {
        doc.itemrefs.push(ItemRef { idref, linear });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::parse_opf;

    const OPF: &[u8] = br#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata/>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="cover" href="cover.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch1" href="text/ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch2" href="text/ch2.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="cover" linear="no"/>
    <itemref idref="ch1"/>
    <itemref idref="ch2"/>
    <itemref idref="ch1"/>
  </spine>
</package>"#;

    #[test]
    fn test_parse_spine_basic() {
        let doc = parse_spine(OPF).unwrap();
        let idrefs: Vec<&str> = doc.itemrefs.iter().map(|i| i.idref.as_str()).collect();
        assert_eq!(idrefs, ["cover", "ch1", "ch2", "ch1"]);
        assert_eq!(doc.toc_id.as_deref(), Some("ncx"));
        assert!(!doc.itemrefs[0].linear);
        assert!(doc.itemrefs[1].linear);
    }

    #[test]
    fn test_resolve_keeps_order_and_duplicates() {
        let metadata = parse_opf(OPF, "OEBPS/content.opf").unwrap();
        let spine = Spine::resolve(&parse_spine(OPF).unwrap(), &metadata).unwrap();

        assert_eq!(spine.len(), 4);
        let paths: Vec<&str> = spine.paths().collect();
        assert_eq!(
            paths,
            [
                "OEBPS/cover.xhtml",
                "OEBPS/text/ch1.xhtml",
                "OEBPS/text/ch2.xhtml",
                "OEBPS/text/ch1.xhtml"
            ]
        );
        assert_eq!(spine.toc_id(), Some("ncx"));
        assert_eq!(spine.index_of("OEBPS/text/ch2.xhtml#s1"), Some(2));
        assert_eq!(spine.index_of("OEBPS/text/ch1.xhtml"), Some(1));
        assert_eq!(spine.index_of("OEBPS/missing.xhtml"), None);
    }

    #[test]
    fn test_dangling_spine_ref() {
        let opf = br#"<package><manifest>
<item id="a" href="a.xhtml" media-type="application/xhtml+xml"/>
</manifest><spine><itemref idref="a"/><itemref idref="ghost"/></spine></package>"#;
        let metadata = parse_opf(opf, "content.opf").unwrap();
        let err = Spine::resolve(&parse_spine(opf).unwrap(), &metadata).unwrap_err();
        assert_eq!(
            err,
            EpubError::DanglingSpineRef {
                idref: "ghost".to_string()
            }
        );
    }

    #[test]
    fn test_missing_spine() {
        let opf = br#"<package><manifest/></package>"#;
        assert_eq!(parse_spine(opf), Err(EpubError::MissingSpine));
    }

    #[test]
    fn test_empty_spine() {
        let doc = parse_spine(br#"<package><spine/></package>"#).unwrap();
        assert!(doc.itemrefs.is_empty());
        assert_eq!(doc.toc_id, None);

        let spine = Spine::resolve(&doc, &EpubMetadata::default()).unwrap();
        assert!(spine.is_empty());
        assert_eq!(spine.get(0), None);
    }

    #[test]
    fn test_prefixed_itemrefs() {
        let opf = br#"<opf:package xmlns:opf="http://www.idpf.org/2007/opf">
<opf:spine><opf:itemref idref="a"/><opf:itemref/><opf:itemref idref="b"/></opf:spine>
</opf:package>"#;
        let doc = parse_spine(opf).unwrap();
        let idrefs: Vec<&str> = doc.itemrefs.iter().map(|i| i.idref.as_str()).collect();
        assert_eq!(idrefs, ["a", "b"]);
    }

    #[test]
    fn test_itemref_outside_spine_ignored() {
        let opf = br#"<package><guide><itemref idref="x"/></guide><spine><itemref idref="a"/></spine></package>"#;
        let doc = parse_spine(opf).unwrap();
        assert_eq!(doc.itemrefs.len(), 1);
    }

    #[test]
    fn test_malformed_package() {
        let opf = br#"<package><spine><itemref idref="a"/></package>"#;
        assert!(matches!(
            parse_spine(opf),
            Err(EpubError::MalformedPackage(_))
        ));
    }
}
