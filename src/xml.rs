//! Small helpers shared by the quick-xml event loops.

extern crate alloc;

use alloc::borrow::Cow;
use alloc::format;
use alloc::string::{String, ToString};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::BytesStart;
use quick_xml::reader::Reader;

/// Tracks element nesting so truncated documents are reported as errors.
///
/// quick-xml checks that end tags match, but a document that simply stops
/// inside an open element reaches `Eof` without complaint.
#[derive(Debug, Default)]
pub(crate) struct Nesting {
    depth: usize,
    saw_root: bool,
}

impl Nesting {
    pub(crate) fn start(&mut self) {
        self.depth += 1;
        self.saw_root = true;
    }

    pub(crate) fn empty(&mut self) {
        self.saw_root = true;
    }

    pub(crate) fn end(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    /// Character data is only allowed inside the root element.
    pub(crate) fn text(&self, raw: &[u8]) -> Result<(), &'static str> {
        if self.depth == 0 && !raw.iter().all(u8::is_ascii_whitespace) {
            return Err("text outside the root element");
        }
        Ok(())
    }

    pub(crate) fn finish(&self) -> Result<(), &'static str> {
        if !self.saw_root {
            return Err("document has no root element");
        }
        if self.depth != 0 {
            return Err("unexpected end of document");
        }
        Ok(())
    }
}

/// Decode an attribute value without expanding references.
pub(crate) fn raw_attr_value<'a>(
    reader: &Reader<&[u8]>,
    attr: &'a Attribute<'_>,
) -> Result<Cow<'a, str>, String> {
    reader
        .decoder()
        .decode(&attr.value)
        .map_err(|e| format!("Decode error: {:?}", e))
}

/// Decode and unescape an attribute value.
///
/// Values with unknown entities (`&nbsp;` in XHTML) are kept as written.
pub(crate) fn attr_value(reader: &Reader<&[u8]>, attr: &Attribute<'_>) -> Result<String, String> {
    let raw = raw_attr_value(reader, attr)?;
    let value = quick_xml::escape::unescape(&raw)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| raw.to_string());
    Ok(value)
}

/// Find an attribute by local name and return its unescaped value.
pub(crate) fn find_attr(
    reader: &Reader<&[u8]>,
    e: &BytesStart<'_>,
    local: &[u8],
) -> Result<Option<String>, String> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| format!("Attr error: {:?}", e))?;
        if attr.key.local_name().as_ref() == local {
            return attr_value(reader, &attr).map(Some);
        }
    }
    Ok(None)
}

/// Expand an entity reference reported as `Event::GeneralRef`.
///
/// XML predefined and numeric references are resolved; `nbsp` (common in
/// XHTML content) maps to U+00A0; anything else is kept as written.
pub(crate) fn resolve_entity(name: &str) -> String {
    if name == "nbsp" {
        return "\u{a0}".to_string();
    }
    let entity = format!("&{};", name);
    quick_xml::escape::unescape(&entity)
        .map(Cow::into_owned)
        .unwrap_or(entity)
}

/// Collapse runs of whitespace to single spaces and trim the ends.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<alloc::vec::Vec<_>>().join(" ")
}
