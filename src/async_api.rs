//! Optional async helpers for opening books.
//!
//! This module is available with the `async` feature.

extern crate alloc;

use alloc::string::ToString;
use core::result::Result;
use std::path::Path;

use crate::book::{Book, BookOptions};
use crate::error::EpubError;

/// Read an EPUB file asynchronously and construct a [`Book`].
///
/// The archive is read into memory with `tokio::fs`; parsing itself is
/// synchronous.
pub async fn open_book_async<P: AsRef<Path>>(path: P) -> Result<Book, EpubError> {
    open_book_async_with_options(path, BookOptions::default()).await
}

/// Read an EPUB file asynchronously and construct a [`Book`] with options.
pub async fn open_book_async_with_options<P: AsRef<Path>>(
    path: P,
    options: BookOptions,
) -> Result<Book, EpubError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| EpubError::Io(e.to_string()))?;
    Book::from_bytes_with_options(bytes, options)
}
