//! High-level EPUB API.
//!
//! [`Book`] parses every structural document (container, package,
//! navigation) in one pass when it is constructed, so any defect surfaces
//! immediately. Chapters and assets are read on demand with [`Book::read`].

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use std::path::Path;

use crate::container::{parse_container_xml, ContainerDescriptor, CONTAINER_PATH};
use crate::error::{EpubError, ZipError};
use crate::metadata::{parse_opf, EpubMetadata, ManifestItem};
use crate::navigation::{flatten_toc, parse_nav_xhtml, parse_ncx, TocEntry};
use crate::path::split_fragment;
use crate::spine::{parse_spine, Spine};
use crate::zip::{EpubArchive, ZipLimits};

/// How a missing `mimetype` entry is treated.
///
/// A `mimetype` entry that is present but wrong always fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum MimetypePolicy {
    /// Fail with `InvalidMimetype` when the entry is absent.
    #[default]
    Require,
    /// Log a warning and continue when the entry is absent.
    AllowMissing,
}

/// Configuration for opening a [`Book`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct BookOptions {
    /// Optional ZIP safety limits used while reading archive entries.
    ///
    /// When `None`, no explicit file-size caps are enforced by this crate.
    pub zip_limits: Option<ZipLimits>,
    /// Treatment of archives without a `mimetype` entry.
    pub mimetype_policy: MimetypePolicy,
}

/// Builder for opening books with non-default options.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct BookBuilder {
    options: BookOptions,
}

impl BookBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set explicit ZIP limits.
    pub fn with_zip_limits(mut self, limits: ZipLimits) -> Self {
        self.options.zip_limits = Some(limits);
        self
    }

    /// Set the mimetype policy.
    pub fn mimetype_policy(mut self, policy: MimetypePolicy) -> Self {
        self.options.mimetype_policy = policy;
        self
    }

    /// Accept archives without a `mimetype` entry.
    pub fn allow_missing_mimetype(self) -> Self {
        self.mimetype_policy(MimetypePolicy::AllowMissing)
    }

    /// Options collected so far.
    pub fn options(&self) -> BookOptions {
        self.options
    }

    /// Construct a book from archive bytes.
    pub fn from_bytes(self, data: Vec<u8>) -> Result<Book, EpubError> {
        Book::from_bytes_with_options(data, self.options)
    }

    /// Read an archive from disk and construct a book.
    pub fn open<P: AsRef<Path>>(self, path: P) -> Result<Book, EpubError> {
        Book::open_with_options(path, self.options)
    }
}

/// A parsed EPUB publication.
///
/// Immutable after construction; safe to share between threads.
#[derive(Debug)]
pub struct Book {
    archive: EpubArchive,
    container: ContainerDescriptor,
    metadata: EpubMetadata,
    spine: Spine,
    toc: Vec<TocEntry>,
}

impl Book {
    /// Construct a book from the bytes of an EPUB archive.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, EpubError> {
        Self::from_bytes_with_options(data, BookOptions::default())
    }

    /// Construct a book with explicit options.
    ///
    /// The first structural failure is returned as its specific error kind;
    /// a failed navigation document only produces an empty TOC.
    pub fn from_bytes_with_options(data: Vec<u8>, options: BookOptions) -> Result<Self, EpubError> {
        let archive = EpubArchive::open_with_limits(data, options.zip_limits).map_err(|err| {
            match err {
                ZipError::InvalidFormat => EpubError::NotAnArchive,
                other => EpubError::Zip(other),
            }
        })?;
        archive.validate_mimetype(options.mimetype_policy == MimetypePolicy::Require)?;

        let container_bytes = read_structural(&archive, CONTAINER_PATH)
            .map_err(|err| err.unwrap_or(EpubError::MissingContainer))?;
        let container = parse_container_xml(&container_bytes)?;

        let package_path = container.package_path();
        let opf = read_structural(&archive, package_path).map_err(|err| {
            err.unwrap_or_else(|| EpubError::MissingPackage {
                path: package_path.to_string(),
            })
        })?;
        let metadata = parse_opf(&opf, package_path)?;
        let spine = Spine::resolve(&parse_spine(&opf)?, &metadata)?;
        log::debug!(
            "[BOOK] '{}': {} manifest items, {} spine entries",
            package_path,
            metadata.manifest.len(),
            spine.len()
        );

        let toc = load_toc(&archive, &metadata, &spine);

        Ok(Self {
            archive,
            container,
            metadata,
            spine,
            toc,
        })
    }

    /// Read an EPUB file from disk and construct a book.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EpubError> {
        Self::open_with_options(path, BookOptions::default())
    }

    /// Read an EPUB file from disk with explicit options.
    pub fn open_with_options<P: AsRef<Path>>(
        path: P,
        options: BookOptions,
    ) -> Result<Self, EpubError> {
        let data = std::fs::read(path).map_err(|e| EpubError::Io(e.to_string()))?;
        Self::from_bytes_with_options(data, options)
    }

    /// Create a builder for opening books.
    pub fn builder() -> BookBuilder {
        BookBuilder::new()
    }

    /// Reading order, each entry resolved to an archive path.
    pub fn spine(&self) -> &Spine {
        &self.spine
    }

    /// Flattened table of contents (pre-order).
    pub fn toc(&self) -> &[TocEntry] {
        &self.toc
    }

    /// Package metadata.
    pub fn metadata(&self) -> &EpubMetadata {
        &self.metadata
    }

    /// Manifest items in document order.
    pub fn manifest(&self) -> &[ManifestItem] {
        &self.metadata.manifest
    }

    /// Archive path of the package document.
    pub fn package_path(&self) -> &str {
        self.container.package_path()
    }

    /// Directory of the package document (`""` at archive root).
    pub fn package_dir(&self) -> &str {
        self.container.package_dir()
    }

    /// Underlying archive.
    pub fn archive(&self) -> &EpubArchive {
        &self.archive
    }

    /// Read a resource by normalized archive path.
    ///
    /// A fragment on `path` is ignored.
    pub fn read(&self, path: &str) -> Result<Vec<u8>, EpubError> {
        let (path, _) = split_fragment(path);
        self.archive.read(path).map_err(|err| match err {
            ZipError::FileNotFound => EpubError::AssetNotFound {
                path: path.to_string(),
            },
            other => EpubError::Zip(other),
        })
    }

    /// Whether the archive holds `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.archive.contains(split_fragment(path).0)
    }

    /// Spine position of `path` (fragment ignored).
    pub fn spine_index_of(&self, path: &str) -> Option<usize> {
        self.spine.index_of(path)
    }

    /// Media type the manifest declares for `path`.
    pub fn media_type_of(&self, path: &str) -> Option<&str> {
        self.metadata
            .item_by_path(split_fragment(path).0)
            .map(|item| item.media_type.as_str())
            .filter(|media_type| !media_type.is_empty())
    }

    /// Book title (empty when the package declares none).
    pub fn title(&self) -> &str {
        &self.metadata.title
    }

    /// First TOC entry labelled exactly `title`.
    pub fn toc_entry(&self, title: &str) -> Option<&TocEntry> {
        self.toc.iter().find(|entry| entry.title == title)
    }

    /// Archive paths of the spine in reading order.
    pub fn spine_paths(&self) -> Vec<String> {
        self.spine.paths().map(str::to_string).collect()
    }
}

/// Read a structural entry. `Err(None)` means the entry is absent.
fn read_structural(archive: &EpubArchive, path: &str) -> Result<Vec<u8>, Option<EpubError>> {
    archive.read(path).map_err(|err| match err {
        ZipError::FileNotFound => None,
        other => Some(EpubError::Zip(other)),
    })
}

/// Locate, read and flatten the navigation document.
///
/// Resolution order: spine `toc` attribute, manifest item with the `nav`
/// property, manifest item with the NCX media type. Any failure leaves the
/// book without a TOC.
fn load_toc(archive: &EpubArchive, metadata: &EpubMetadata, spine: &Spine) -> Vec<TocEntry> {
    let nav_item = spine
        .toc_id()
        .and_then(|toc_id| metadata.get_item(toc_id))
        .or_else(|| metadata.manifest.iter().find(|item| item.has_property("nav")))
        .or_else(|| metadata.manifest.iter().find(|item| item.is_ncx()));

    let Some(nav_item) = nav_item else {
        log::debug!("[BOOK] No navigation document declared");
        return Vec::new();
    };

    let nav_bytes = match archive.read(&nav_item.path) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::warn!(
                "[BOOK] Failed to read navigation document '{}': {}",
                nav_item.path,
                err
            );
            return Vec::new();
        }
    };

    let parsed = if nav_item.is_ncx() {
        parse_ncx(&nav_bytes)
    } else {
        parse_nav_xhtml(&nav_bytes)
    };

    match parsed {
        Ok(nav) => {
            let toc = flatten_toc(&nav, &nav_item.path);
            log::debug!("[BOOK] {} TOC entries from '{}'", toc.len(), nav_item.path);
            toc
        }
        Err(err) => {
            log::warn!(
                "[BOOK] Failed to parse navigation document '{}': {}",
                nav_item.path,
                err
            );
            Vec::new()
        }
    }
}
