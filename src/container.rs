//! Container descriptor (`META-INF/container.xml`) resolution
//!
//! The container descriptor names the package document. Its directory is the
//! base every manifest `href` is resolved against.

extern crate alloc;

use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::EpubError;
use crate::path::{normalize_path, parent_dir};
use crate::xml::{find_attr, Nesting};

/// Fixed archive path of the container descriptor.
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Location of the package document inside the archive
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerDescriptor {
    package_path: String,
}

impl ContainerDescriptor {
    /// Normalized archive path of the package document
    pub fn package_path(&self) -> &str {
        &self.package_path
    }

    /// Directory holding the package document (`""` at archive root)
    pub fn package_dir(&self) -> &str {
        parent_dir(&self.package_path)
    }
}

/// Parse container.xml and return the first `rootfile` reference.
///
/// Fails with `MalformedContainer` when the bytes are not well-formed XML and
/// with `NoRootfile` when no `rootfile` element carries a non-empty
/// `full-path` attribute.
pub fn parse_container_xml(content: &[u8]) -> Result<ContainerDescriptor, EpubError> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut nesting = Nesting::default();
    let mut rootfile: Option<String> = None;

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| EpubError::MalformedContainer(format!("XML parse error: {:?}", e)))?
        {
            Event::Start(e) => {
                nesting.start();
                if rootfile.is_none() {
                    rootfile = rootfile_path(&reader, &e)?;
                }
            }
            Event::Empty(e) => {
                nesting.empty();
                if rootfile.is_none() {
                    rootfile = rootfile_path(&reader, &e)?;
                }
            }
            Event::End(_) => nesting.end(),
            Event::Text(e) => nesting
                .text(&e)
                .map_err(|msg| EpubError::MalformedContainer(msg.to_string()))?,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    nesting
        .finish()
        .map_err(|msg| EpubError::MalformedContainer(msg.to_string()))?;

    let package_path = rootfile.ok_or(EpubError::NoRootfile)?;
    log::debug!("[BOOK] Package document at '{}'", package_path);
    Ok(ContainerDescriptor {
        package_path: normalize_path(&package_path),
    })
}

/// `full-path` of a `rootfile` element, if it is one and the value is usable.
fn rootfile_path(reader: &Reader<&[u8]>, e: &BytesStart<'_>) -> Result<Option<String>, EpubError> {
    if e.local_name().as_ref() != b"rootfile" {
        return Ok(None);
    }
    let full_path = find_attr(reader, e, b"full-path").map_err(EpubError::MalformedContainer)?;
    Ok(full_path
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty()))
}
