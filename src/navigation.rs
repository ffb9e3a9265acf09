//! EPUB navigation parsing
//!
//! Supports both EPUB 3.x XHTML navigation documents (`epub:type="toc"`)
//! and EPUB 2.0 NCX fallback (`toc.ncx`). Both produce the same
//! [`NavPoint`] tree, which consumers normally see flattened into
//! [`TocEntry`] values by [`flatten_toc`].
//!
//! # Usage
//!
//! ```rust
//! use mu_epub_view::navigation::{flatten_toc, parse_ncx};
//!
//! # fn example() -> Result<(), mu_epub_view::error::EpubError> {
//! let ncx = br#"<ncx><navMap>
//!   <navPoint><navLabel><text>One</text></navLabel><content src="one.xhtml"/></navPoint>
//! </navMap></ncx>"#;
//! let nav = parse_ncx(ncx)?;
//! let toc = flatten_toc(&nav, "OEBPS/toc.ncx");
//! assert_eq!(toc[0].url, "OEBPS/one.xhtml");
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

extern crate alloc;

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::EpubError;
use crate::path::{percent_decode, resolve_with_fragment};
use crate::xml::{collapse_whitespace, find_attr, resolve_entity, Nesting};

/// A single navigation point (table of contents entry)
///
/// Navigation points can be nested to represent hierarchical structures
/// (e.g., chapters containing sections). `label` and `href` are empty when
/// the source node had none; such nodes still carry their children.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NavPoint {
    /// Display label, whitespace-collapsed
    pub label: String,
    /// Content href as written (relative to the navigation document)
    pub href: String,
    /// Child navigation points
    pub children: Vec<NavPoint>,
}

/// Parsed table of contents tree
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Navigation {
    /// Top-level TOC entries
    pub toc: Vec<NavPoint>,
}

impl Navigation {
    /// Create an empty navigation structure
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the navigation has any TOC entries
    pub fn has_toc(&self) -> bool {
        !self.toc.is_empty()
    }

    /// Get total number of TOC nodes (including nested and unlabeled ones)
    pub fn toc_count(&self) -> usize {
        count_nav_points(&self.toc)
    }
}

fn count_nav_points(points: &[NavPoint]) -> usize {
    points
        .iter()
        .map(|p| 1 + count_nav_points(&p.children))
        .sum()
}

/// One flattened table of contents entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TocEntry {
    /// Entry label
    pub title: String,
    /// Normalized archive path, with `#fragment` when the source had one
    pub url: String,
    /// Nesting depth in the source tree (0 = top level)
    pub depth: usize,
}

/// Flatten a navigation tree in pre-order.
///
/// Hrefs are resolved against `nav_path`, the archive path of the
/// navigation document itself. Nodes without a label or a target are not
/// emitted, but their descendants are.
pub fn flatten_toc(nav: &Navigation, nav_path: &str) -> Vec<TocEntry> {
    let mut entries = Vec::new();
    flatten_into(&nav.toc, nav_path, 0, &mut entries);
    entries
}

fn flatten_into(points: &[NavPoint], nav_path: &str, depth: usize, out: &mut Vec<TocEntry>) {
    for point in points {
        let href = point.href.trim();
        if !point.label.is_empty() && !href.is_empty() {
            out.push(TocEntry {
                title: point.label.clone(),
                url: resolve_with_fragment(nav_path, &percent_decode(href)),
                depth,
            });
        }
        flatten_into(&point.children, nav_path, depth + 1, out);
    }
}

/// `<li>` being built while its end tag has not been seen yet
#[derive(Default)]
struct PartialNavPoint {
    href: Option<String>,
    label: String,
    children: Vec<NavPoint>,
}

impl PartialNavPoint {
    fn finish(self) -> NavPoint {
        NavPoint {
            label: collapse_whitespace(&self.label),
            href: self.href.unwrap_or_default(),
            children: self.children,
        }
    }
}

/// Which kind of `<nav>` the parser is inside
#[derive(Clone, Copy, Debug, PartialEq)]
enum NavKind {
    Toc,
    Untyped,
    Other,
}

fn nav_kind(reader: &Reader<&[u8]>, e: &BytesStart<'_>) -> Result<NavKind, EpubError> {
    let kind = find_attr(reader, e, b"type").map_err(EpubError::Navigation)?;
    Ok(match kind {
        None => NavKind::Untyped,
        Some(value) if value.split_whitespace().any(|t| t == "toc") => NavKind::Toc,
        Some(_) => NavKind::Other,
    })
}

fn nav_error<E: core::fmt::Debug>(err: E) -> EpubError {
    EpubError::Navigation(format!("Nav XML parse error: {:?}", err))
}

/// Parse an EPUB 3.x XHTML navigation document
///
/// The TOC is read from the `<nav>` whose `epub:type` contains `toc`. A
/// document with no such element falls back to its first untyped `<nav>`.
/// Labels come from the `<a>` (or `<span>` heading) of each `<li>`, with
/// text from nested inline markup concatenated.
pub fn parse_nav_xhtml(content: &[u8]) -> Result<Navigation, EpubError> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(false);

    let mut nav = Navigation::new();
    let mut buf = Vec::new();
    let mut nesting = Nesting::default();

    let mut section: Option<NavKind> = None;
    let mut found_toc = false;
    // Stack of list items being built (one per <li> nesting level)
    let mut item_stack: Vec<PartialNavPoint> = Vec::new();
    let mut results: Vec<NavPoint> = Vec::new();
    // Elements opened inside the current label element
    let mut label_depth: Option<usize> = None;

    loop {
        match reader.read_event_into(&mut buf).map_err(nav_error)? {
            Event::Start(e) => {
                nesting.start();
                if let Some(depth) = label_depth.as_mut() {
                    *depth += 1;
                } else {
                    match e.local_name().as_ref() {
                        b"nav" if section.is_none() => {
                            section = Some(nav_kind(&reader, &e)?);
                            results.clear();
                            item_stack.clear();
                        }
                        b"li" if section.is_some() => item_stack.push(PartialNavPoint::default()),
                        b"a" | b"span" if section.is_some() => {
                            if let Some(item) = item_stack.last_mut() {
                                if item.href.is_none() {
                                    if e.local_name().as_ref() == b"a" {
                                        item.href = anchor_href(&reader, &e)?;
                                    }
                                    label_depth = Some(0);
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            Event::Empty(e) => {
                nesting.empty();
                // Self-closing <a href="..."/> carries a target but no label
                if label_depth.is_none() && section.is_some() && e.local_name().as_ref() == b"a" {
                    if let Some(item) = item_stack.last_mut() {
                        if item.href.is_none() {
                            item.href = anchor_href(&reader, &e)?;
                        }
                    }
                }
            }
            Event::Text(e) => {
                nesting
                    .text(&e)
                    .map_err(|msg| EpubError::Navigation(msg.into()))?;
                if label_depth.is_some() {
                    if let Some(item) = item_stack.last_mut() {
                        item.label.push_str(&e.decode().map_err(nav_error)?);
                    }
                }
            }
            Event::CData(e) => {
                if label_depth.is_some() {
                    if let Some(item) = item_stack.last_mut() {
                        item.label.push_str(&String::from_utf8_lossy(&e));
                    }
                }
            }
            Event::GeneralRef(e) => {
                if label_depth.is_some() {
                    if let Some(item) = item_stack.last_mut() {
                        item.label.push_str(&resolve_entity(&e.decode().map_err(nav_error)?));
                    }
                }
            }
            Event::End(e) => {
                nesting.end();
                match label_depth {
                    Some(0) => {
                        label_depth = None;
                        // Adjacent label elements stay separate words
                        if let Some(item) = item_stack.last_mut() {
                            item.label.push(' ');
                        }
                    }
                    Some(depth) => label_depth = Some(depth - 1),
                    None => match e.local_name().as_ref() {
                        b"li" if section.is_some() => {
                            if let Some(partial) = item_stack.pop() {
                                let point = partial.finish();
                                match item_stack.last_mut() {
                                    Some(parent) => parent.children.push(point),
                                    None => results.push(point),
                                }
                            }
                        }
                        b"nav" => {
                            let completed = core::mem::take(&mut results);
                            match section.take() {
                                Some(NavKind::Toc) if !found_toc => {
                                    nav.toc = completed;
                                    found_toc = true;
                                }
                                Some(NavKind::Untyped) if !found_toc && nav.toc.is_empty() => {
                                    nav.toc = completed;
                                }
                                _ => {}
                            }
                            item_stack.clear();
                        }
                        _ => {}
                    },
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    nesting
        .finish()
        .map_err(|msg| EpubError::Navigation(msg.into()))?;
    Ok(nav)
}

fn anchor_href(reader: &Reader<&[u8]>, e: &BytesStart<'_>) -> Result<Option<String>, EpubError> {
    find_attr(reader, e, b"href").map_err(EpubError::Navigation)
}

/// Parse an EPUB 2.0 NCX navigation document
///
/// Reads the `<navMap>` tree: `navPoint` nesting, `navLabel/text` labels
/// and `content@src` targets.
pub fn parse_ncx(content: &[u8]) -> Result<Navigation, EpubError> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(false);

    let mut nav = Navigation::new();
    let mut buf = Vec::new();
    let mut nesting = Nesting::default();

    let mut in_nav_map = false;
    let mut nav_point_stack: Vec<PartialNavPoint> = Vec::new();
    // Inside <navLabel><text> of the innermost open navPoint
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf).map_err(nav_error)? {
            Event::Start(e) => {
                nesting.start();
                match e.local_name().as_ref() {
                    b"navMap" => in_nav_map = true,
                    b"navPoint" if in_nav_map => nav_point_stack.push(PartialNavPoint::default()),
                    b"text" if !nav_point_stack.is_empty() => in_text = true,
                    b"content" => ncx_content(&reader, &e, &mut nav_point_stack)?,
                    _ => {}
                }
            }
            Event::Empty(e) => {
                nesting.empty();
                // A self-closing navPoint has neither label nor target and is dropped
                if e.local_name().as_ref() == b"content" {
                    ncx_content(&reader, &e, &mut nav_point_stack)?;
                }
            }
            Event::Text(e) => {
                nesting
                    .text(&e)
                    .map_err(|msg| EpubError::Navigation(msg.into()))?;
                if in_text {
                    if let Some(point) = nav_point_stack.last_mut() {
                        point.label.push_str(&e.decode().map_err(nav_error)?);
                    }
                }
            }
            Event::CData(e) => {
                if in_text {
                    if let Some(point) = nav_point_stack.last_mut() {
                        point.label.push_str(&String::from_utf8_lossy(&e));
                    }
                }
            }
            Event::GeneralRef(e) => {
                if in_text {
                    if let Some(point) = nav_point_stack.last_mut() {
                        point.label.push_str(&resolve_entity(&e.decode().map_err(nav_error)?));
                    }
                }
            }
            Event::End(e) => {
                nesting.end();
                match e.local_name().as_ref() {
                    b"text" => in_text = false,
                    b"navPoint" if in_nav_map => {
                        if let Some(completed) = nav_point_stack.pop() {
                            let point = completed.finish();
                            match nav_point_stack.last_mut() {
                                Some(parent) => parent.children.push(point),
                                None => nav.toc.push(point),
                            }
                        }
                    }
                    b"navMap" => in_nav_map = false,
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    nesting
        .finish()
        .map_err(|msg| EpubError::Navigation(msg.into()))?;
    Ok(nav)
}

/// `<content src="..."/>` sets the target of the innermost navPoint.
fn ncx_content(
    reader: &Reader<&[u8]>,
    e: &BytesStart<'_>,
    stack: &mut [PartialNavPoint],
) -> Result<(), EpubError> {
    if let Some(point) = stack.last_mut() {
        if point.href.is_none() {
            point.href = find_attr(reader, e, b"src").map_err(EpubError::Navigation)?;
        }
    }
    Ok(())
}
