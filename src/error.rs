//! Unified error types for mu-epub-view
//!
//! Construction of a [`Book`](crate::book::Book) fails with exactly one of the
//! structural kinds below. Rendering a chapter can fail with the recoverable
//! kinds (`ChapterParse`, `AssetNotFound`), which never end a reading session.

extern crate alloc;

use alloc::string::String;
use core::fmt;

/// Top-level error type for mu-epub-view operations
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EpubError {
    /// Input bytes are not a ZIP archive
    NotAnArchive,
    /// `META-INF/container.xml` is absent from the archive
    MissingContainer,
    /// The container descriptor is not well-formed XML
    MalformedContainer(String),
    /// The container descriptor has no usable `rootfile` reference
    NoRootfile,
    /// The package document named by the container is absent
    MissingPackage {
        /// Archive path taken from the container descriptor.
        path: String,
    },
    /// The package document is not well-formed XML
    MalformedPackage(String),
    /// The package document has no `<manifest>` element
    MissingManifest,
    /// The package document has no `<spine>` element
    MissingSpine,
    /// A spine `itemref` names an id that the manifest does not declare
    DanglingSpineRef {
        /// The unresolved `idref` value.
        idref: String,
    },
    /// Navigation document could not be parsed (never fatal for a book)
    Navigation(String),
    /// The `mimetype` entry is missing or does not read `application/epub+zip`
    InvalidMimetype(String),
    /// Chapter markup could not be parsed
    ChapterParse {
        /// Archive path of the chapter.
        path: String,
        /// Parser message.
        message: String,
    },
    /// A requested resource does not exist in the archive
    AssetNotFound {
        /// Normalized archive path that was looked up.
        path: String,
    },
    /// The host adapter has no element with the requested id
    ElementNotFound {
        /// Element id passed to the host adapter.
        id: String,
    },
    /// ZIP entry data could not be decoded
    Zip(ZipError),
    /// I/O error (description only, since `std::io::Error` is not `Clone`)
    Io(String),
}

impl EpubError {
    /// Whether this error is scoped to a single chapter render.
    ///
    /// Recoverable errors leave the book and the reading session usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EpubError::ChapterParse { .. } | EpubError::AssetNotFound { .. }
        )
    }
}

impl fmt::Display for EpubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EpubError::NotAnArchive => write!(f, "input is not a ZIP archive"),
            EpubError::MissingContainer => {
                write!(f, "META-INF/container.xml not found in archive")
            }
            EpubError::MalformedContainer(msg) => write!(f, "Malformed container.xml: {}", msg),
            EpubError::NoRootfile => write!(f, "No rootfile found in container.xml"),
            EpubError::MissingPackage { path } => {
                write!(f, "Package document '{}' not found in archive", path)
            }
            EpubError::MalformedPackage(msg) => write!(f, "Malformed package document: {}", msg),
            EpubError::MissingManifest => write!(f, "Package document has no manifest"),
            EpubError::MissingSpine => write!(f, "Package document has no spine"),
            EpubError::DanglingSpineRef { idref } => {
                write!(f, "Spine item '{}' does not exist in manifest", idref)
            }
            EpubError::Navigation(msg) => write!(f, "Navigation error: {}", msg),
            EpubError::InvalidMimetype(msg) => write!(f, "Invalid mimetype: {}", msg),
            EpubError::ChapterParse { path, message } => {
                write!(f, "Could not parse chapter '{}': {}", path, message)
            }
            EpubError::AssetNotFound { path } => write!(f, "Asset not found: {}", path),
            EpubError::ElementNotFound { id } => write!(f, "No host element with id '{}'", id),
            EpubError::Zip(kind) => write!(f, "ZIP error: {}", kind),
            EpubError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

/// ZIP-specific error variants
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ZipErrorKind {
    /// File not found in archive
    FileNotFound,
    /// Invalid ZIP format
    InvalidFormat,
    /// Unsupported compression method
    UnsupportedCompression,
    /// Decompression failed
    DecompressError,
    /// CRC32 mismatch
    CrcMismatch,
    /// File exceeds maximum allowed size
    FileTooLarge,
    /// ZIP64 structures are present but unsupported
    UnsupportedZip64,
}

/// Public ZIP error type alias used across the crate API.
pub type ZipError = ZipErrorKind;

impl fmt::Display for ZipErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZipErrorKind::FileNotFound => write!(f, "file not found in archive"),
            ZipErrorKind::InvalidFormat => write!(f, "invalid ZIP format"),
            ZipErrorKind::UnsupportedCompression => write!(f, "unsupported compression method"),
            ZipErrorKind::DecompressError => write!(f, "decompression failed"),
            ZipErrorKind::CrcMismatch => write!(f, "CRC32 checksum mismatch"),
            ZipErrorKind::FileTooLarge => write!(f, "file too large"),
            ZipErrorKind::UnsupportedZip64 => write!(f, "ZIP64 is not supported"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EpubError {}

#[cfg(feature = "std")]
impl std::error::Error for ZipErrorKind {}

impl From<ZipError> for EpubError {
    fn from(err: ZipError) -> Self {
        EpubError::Zip(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epub_error_display() {
        let err = EpubError::DanglingSpineRef {
            idref: "ch9".into(),
        };
        assert_eq!(
            format!("{}", err),
            "Spine item 'ch9' does not exist in manifest"
        );
    }

    #[test]
    fn test_zip_error_kind_debug() {
        let kind = ZipErrorKind::FileNotFound;
        assert_eq!(format!("{:?}", kind), "FileNotFound");
    }

    #[test]
    fn test_zip_error_converts() {
        assert_eq!(
            EpubError::from(ZipErrorKind::CrcMismatch),
            EpubError::Zip(ZipErrorKind::CrcMismatch)
        );
    }

    #[test]
    fn test_recoverable_kinds() {
        assert!(EpubError::AssetNotFound {
            path: "OEBPS/a.png".into()
        }
        .is_recoverable());
        assert!(EpubError::ChapterParse {
            path: "c.xhtml".into(),
            message: "x".into()
        }
        .is_recoverable());
        assert!(!EpubError::MissingSpine.is_recoverable());
        assert!(!EpubError::NotAnArchive.is_recoverable());
    }

    #[test]
    fn test_zip_error_display_in_epub_error() {
        let err = EpubError::Zip(ZipErrorKind::UnsupportedZip64);
        assert_eq!(format!("{}", err), "ZIP error: ZIP64 is not supported");
    }
}
