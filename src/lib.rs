//! mu-epub-view -- EPUB parsing and in-page rendition
//!
//! Opens an EPUB archive, resolves its structure (container, package,
//! spine, navigation) once at construction, and turns individual chapters
//! into self-contained documents with every embedded asset inlined as a
//! `data:` URI. A [`Rendition`] drives a reading session inside a host
//! document reached only through the [`HostAdapter`] trait.
//!
//! # Features
//!
//! - `std` (default) -- ZIP reader, [`Book`], chapter rewriting and rendition
//! - `async` -- `tokio`-based file opening helpers
//! - `cli` -- the `mu-epub-view` inspection binary
//!
//! Without `std` the structural parsers (`container`, `metadata`, `spine`,
//! `navigation`) and the host adapter types are still available on `alloc`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mu_epub_view::{Book, MemoryHost, Rendition};
//!
//! # fn main() -> Result<(), mu_epub_view::EpubError> {
//! let book = Arc::new(Book::open("book.epub")?);
//! let mut host = MemoryHost::new();
//! host.add_element("div", "viewer");
//! host.add_element("nav", "toc");
//!
//! let mut rendition = Rendition::new(book, host, "viewer")?;
//! rendition.display(None)?;
//! rendition.display_toc("toc")?;
//! rendition.next()?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]
#![deny(clippy::large_enum_variant, clippy::large_stack_arrays, clippy::redundant_clone)]
#![warn(
    clippy::box_collection,
    clippy::needless_collect,
    clippy::map_clone,
    clippy::implicit_clone,
    clippy::inefficient_to_string
)]

extern crate alloc;

pub mod container;
pub mod error;
pub mod host;
pub mod metadata;
pub mod navigation;
pub mod path;
pub mod spine;

mod xml;

#[cfg(feature = "std")]
pub mod book;

#[cfg(feature = "std")]
pub mod rendition;

#[cfg(feature = "std")]
pub mod rewrite;

#[cfg(feature = "async")]
pub mod async_api;

#[cfg(feature = "std")]
pub mod zip;

// Re-export key types for convenience
#[cfg(feature = "async")]
pub use async_api::{open_book_async, open_book_async_with_options};
#[cfg(feature = "std")]
pub use book::{Book, BookBuilder, BookOptions, MimetypePolicy};
pub use container::ContainerDescriptor;
pub use error::{EpubError, ZipError, ZipErrorKind};
pub use host::{HostAdapter, MemoryHost, NavAction};
pub use metadata::{EpubMetadata, ManifestItem};
pub use navigation::{NavPoint, Navigation, TocEntry};
#[cfg(feature = "std")]
pub use rendition::{Rendition, RenditionState};
#[cfg(feature = "std")]
pub use rewrite::{
    rewrite_chapter, HyperlinkPolicy, RewriteDiagnostic, RewriteDiagnosticKind, RewriteOptions,
    RewrittenDocument,
};
pub use spine::{Spine, SpineItem};
#[cfg(feature = "std")]
pub use zip::ZipLimits;
