//! In-memory ZIP reader for EPUB archives
//!
//! The whole archive is owned as one byte buffer. The central directory is
//! indexed once at open time and entries are decoded on demand, so lookups
//! take `&self` and an opened archive can be shared read-only.
//! Supports stored and DEFLATE entries using miniz_oxide.

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use miniz_oxide::{DataFormat, MZFlush, MZStatus};

use crate::error::EpubError;

/// Runtime-configurable ZIP safety limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZipLimits {
    /// Maximum compressed or uncompressed file size allowed for reads.
    pub max_file_read_size: usize,
    /// Maximum allowed size for the `mimetype` entry.
    pub max_mimetype_size: usize,
    /// Maximum bytes scanned from the archive tail while searching for EOCD.
    pub max_eocd_scan: usize,
}

impl ZipLimits {
    /// Create explicit ZIP limits.
    pub fn new(max_file_read_size: usize, max_mimetype_size: usize) -> Self {
        Self {
            max_file_read_size,
            max_mimetype_size,
            max_eocd_scan: MAX_EOCD_SCAN,
        }
    }

    /// Set a cap for EOCD tail scan bytes.
    pub fn with_max_eocd_scan(mut self, max_eocd_scan: usize) -> Self {
        self.max_eocd_scan = max_eocd_scan.max(EOCD_MIN_SIZE);
        self
    }
}

/// Local file header signature (little-endian)
const SIG_LOCAL_FILE_HEADER: u32 = 0x04034b50;

/// Central directory entry signature (little-endian)
const SIG_CD_ENTRY: u32 = 0x02014b50;

/// End of central directory signature (little-endian)
const SIG_EOCD: u32 = 0x06054b50;
/// ZIP64 end of central directory locator signature (little-endian)
const SIG_ZIP64_EOCD_LOCATOR: u32 = 0x07064b50;
/// Minimum EOCD record size in bytes
const EOCD_MIN_SIZE: usize = 22;
/// Maximum EOCD search window (EOCD + max comment length)
const MAX_EOCD_SCAN: usize = EOCD_MIN_SIZE + u16::MAX as usize;
/// Fixed part of a central directory record
const CD_ENTRY_FIXED_SIZE: usize = 46;
/// Fixed part of a local file header
const LOCAL_HEADER_FIXED_SIZE: usize = 30;

/// Compression methods
const METHOD_STORED: u16 = 0;
const METHOD_DEFLATED: u16 = 8;

/// Expected content of the `mimetype` entry.
pub const EPUB_MIMETYPE: &str = "application/epub+zip";

// Re-export the crate's public ZIP error alias for module consumers.
pub use crate::error::ZipError;

#[derive(Clone, Copy, Debug)]
struct EocdInfo {
    cd_offset: usize,
    cd_size: usize,
    num_entries: u16,
    uses_zip64: bool,
}

/// Central directory entry metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdEntry {
    /// Compression method (0=stored, 8=deflated)
    pub method: u16,
    /// Compressed size in bytes
    pub compressed_size: u32,
    /// Uncompressed size in bytes
    pub uncompressed_size: u32,
    /// Offset to local file header
    pub local_header_offset: u32,
    /// CRC32 checksum
    pub crc32: u32,
    /// Entry path as stored in the archive
    pub filename: String,
}

/// Random-access EPUB archive backed by an owned byte buffer
pub struct EpubArchive {
    data: Vec<u8>,
    entries: Vec<CdEntry>,
    limits: Option<ZipLimits>,
}

impl core::fmt::Debug for EpubArchive {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EpubArchive")
            .field("len", &self.data.len())
            .field("entries", &self.entries.len())
            .field("limits", &self.limits)
            .finish()
    }
}

impl EpubArchive {
    /// Open a ZIP archive and index its central directory
    pub fn open(data: Vec<u8>) -> Result<Self, ZipError> {
        Self::open_with_limits(data, None)
    }

    /// Open a ZIP archive with explicit runtime limits.
    pub fn open_with_limits(data: Vec<u8>, limits: Option<ZipLimits>) -> Result<Self, ZipError> {
        let max_eocd_scan = limits
            .map(|l| l.max_eocd_scan.min(MAX_EOCD_SCAN))
            .unwrap_or(MAX_EOCD_SCAN);
        let eocd = find_eocd(&data, max_eocd_scan)?;
        if eocd.uses_zip64 {
            return Err(ZipError::UnsupportedZip64);
        }

        let cd_end = eocd.cd_offset + eocd.cd_size;
        let mut entries = Vec::with_capacity(eocd.num_entries as usize);
        let mut pos = eocd.cd_offset;
        for _ in 0..eocd.num_entries {
            if pos >= cd_end {
                return Err(ZipError::InvalidFormat);
            }
            let (entry, next) = read_cd_entry(&data, pos, cd_end)?;
            entries.push(entry);
            pos = next;
        }

        log::debug!(
            "[ZIP] Parsed {} central directory entries (offset {})",
            entries.len(),
            eocd.cd_offset
        );

        Ok(Self {
            data,
            entries,
            limits,
        })
    }

    /// Get entry by exact archive path.
    ///
    /// Paths are case-sensitive; a single leading `/` on `name` is ignored.
    pub fn get_entry(&self, name: &str) -> Option<&CdEntry> {
        let name = name.strip_prefix('/').unwrap_or(name);
        self.entries.iter().find(|e| e.filename == name)
    }

    /// Whether the archive holds an entry at `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.get_entry(name).is_some()
    }

    /// Read and decompress the entry at `name`.
    pub fn read(&self, name: &str) -> Result<Vec<u8>, ZipError> {
        let entry = self.get_entry(name).ok_or(ZipError::FileNotFound)?;
        self.read_entry(entry)
    }

    /// Read and decompress a central directory entry.
    pub fn read_entry(&self, entry: &CdEntry) -> Result<Vec<u8>, ZipError> {
        if let Some(limits) = self.limits {
            if entry.uncompressed_size as usize > limits.max_file_read_size
                || entry.compressed_size as usize > limits.max_file_read_size
            {
                return Err(ZipError::FileTooLarge);
            }
        }

        let start = self.data_offset(entry)?;
        let end = start
            .checked_add(entry.compressed_size as usize)
            .filter(|end| *end <= self.data.len())
            .ok_or(ZipError::InvalidFormat)?;
        let compressed = &self.data[start..end];

        let out = match entry.method {
            METHOD_STORED => compressed.to_vec(),
            METHOD_DEFLATED => inflate_raw(compressed, entry.uncompressed_size as usize)
                .inspect_err(|_| {
                    log::warn!("[ZIP] Failed to inflate '{}'", entry.filename);
                })?,
            _ => return Err(ZipError::UnsupportedCompression),
        };

        if entry.crc32 != 0 && crc32fast::hash(&out) != entry.crc32 {
            return Err(ZipError::CrcMismatch);
        }
        Ok(out)
    }

    /// Check the `mimetype` entry.
    ///
    /// A present entry must read `application/epub+zip`. A missing entry is
    /// an error only when `require` is set.
    pub fn validate_mimetype(&self, require: bool) -> Result<(), EpubError> {
        let Some(entry) = self.get_entry("mimetype") else {
            if require {
                return Err(EpubError::InvalidMimetype(
                    "mimetype file not found in archive".to_string(),
                ));
            }
            log::warn!("[ZIP] Archive has no mimetype entry");
            return Ok(());
        };

        if let Some(limits) = self.limits {
            if entry.uncompressed_size as usize > limits.max_mimetype_size {
                return Err(EpubError::InvalidMimetype(
                    "mimetype file too large".to_string(),
                ));
            }
        }

        let bytes = self.read_entry(entry)?;
        let content = core::str::from_utf8(&bytes).map_err(|_| {
            EpubError::InvalidMimetype("mimetype file is not valid UTF-8".to_string())
        })?;

        if content.trim_matches(|c: char| c.is_ascii_whitespace()) != EPUB_MIMETYPE {
            return Err(EpubError::InvalidMimetype(alloc::format!(
                "expected '{}', got '{}'",
                EPUB_MIMETYPE,
                content
            )));
        }

        Ok(())
    }

    /// Number of entries in the central directory
    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// Iterate over all entries
    pub fn entries(&self) -> impl Iterator<Item = &CdEntry> {
        self.entries.iter()
    }

    /// Iterate over entry paths in central directory order
    pub fn entry_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.filename.as_str())
    }

    /// Get the active limits used by this archive.
    pub fn limits(&self) -> Option<ZipLimits> {
        self.limits
    }

    /// Calculate the offset to the actual file data (past local header)
    fn data_offset(&self, entry: &CdEntry) -> Result<usize, ZipError> {
        let offset = entry.local_header_offset as usize;
        let header = self
            .data
            .get(offset..offset + LOCAL_HEADER_FIXED_SIZE)
            .ok_or(ZipError::InvalidFormat)?;

        if read_u32_le(header, 0) != SIG_LOCAL_FILE_HEADER {
            return Err(ZipError::InvalidFormat);
        }

        let name_len = read_u16_le(header, 26) as usize;
        let extra_len = read_u16_le(header, 28) as usize;
        Ok(offset + LOCAL_HEADER_FIXED_SIZE + name_len + extra_len)
    }
}

/// Find EOCD and extract central directory info
fn find_eocd(data: &[u8], max_eocd_scan: usize) -> Result<EocdInfo, ZipError> {
    let file_size = data.len();
    if file_size < EOCD_MIN_SIZE {
        return Err(ZipError::InvalidFormat);
    }

    // Scan last (EOCD + max comment) bytes backwards for the EOCD signature.
    let scan_base = file_size - file_size.min(max_eocd_scan);
    for i in (scan_base..=file_size - EOCD_MIN_SIZE).rev() {
        if read_u32_le(data, i) != SIG_EOCD {
            continue;
        }
        let num_entries = read_u16_le(data, i + 10);
        let cd_size = read_u32_le(data, i + 12);
        let cd_offset = read_u32_le(data, i + 16);
        let comment_len = read_u16_le(data, i + 20) as usize;
        if i + EOCD_MIN_SIZE + comment_len != file_size {
            continue;
        }

        let uses_zip64_sentinel =
            num_entries == u16::MAX || cd_size == u32::MAX || cd_offset == u32::MAX;
        let uses_zip64_locator = i >= 20 && read_u32_le(data, i - 20) == SIG_ZIP64_EOCD_LOCATOR;
        if uses_zip64_sentinel || uses_zip64_locator {
            return Ok(EocdInfo {
                cd_offset: 0,
                cd_size: 0,
                num_entries: 0,
                uses_zip64: true,
            });
        }

        let cd_offset = cd_offset as usize;
        let cd_size = cd_size as usize;
        let cd_end = cd_offset
            .checked_add(cd_size)
            .ok_or(ZipError::InvalidFormat)?;
        if cd_end > i {
            return Err(ZipError::InvalidFormat);
        }

        return Ok(EocdInfo {
            cd_offset,
            cd_size,
            num_entries,
            uses_zip64: false,
        });
    }

    Err(ZipError::InvalidFormat)
}

/// Read a central directory entry starting at `pos`; returns the entry and
/// the position of the next record.
fn read_cd_entry(data: &[u8], pos: usize, cd_end: usize) -> Result<(CdEntry, usize), ZipError> {
    let fixed_end = pos + CD_ENTRY_FIXED_SIZE;
    if fixed_end > cd_end || read_u32_le(data, pos) != SIG_CD_ENTRY {
        return Err(ZipError::InvalidFormat);
    }

    let name_len = read_u16_le(data, pos + 28) as usize;
    let extra_len = read_u16_le(data, pos + 30) as usize;
    let comment_len = read_u16_le(data, pos + 32) as usize;
    let name_end = fixed_end + name_len;
    let next = name_end + extra_len + comment_len;
    if next > cd_end {
        return Err(ZipError::InvalidFormat);
    }

    let entry = CdEntry {
        method: read_u16_le(data, pos + 10),
        crc32: read_u32_le(data, pos + 16),
        compressed_size: read_u32_le(data, pos + 20),
        uncompressed_size: read_u32_le(data, pos + 24),
        local_header_offset: read_u32_le(data, pos + 42),
        filename: String::from_utf8_lossy(&data[fixed_end..name_end]).to_string(),
    };
    Ok((entry, next))
}

/// Inflate a raw DEFLATE stream of at most `max_out` bytes.
///
/// Output past `max_out` fails with `FileTooLarge`, so an entry cannot
/// inflate beyond the size its directory record declares.
fn inflate_raw(input: &[u8], max_out: usize) -> Result<Vec<u8>, ZipError> {
    let mut state =
        alloc::boxed::Box::new(miniz_oxide::inflate::stream::InflateState::new(DataFormat::Raw));
    let mut out = Vec::with_capacity(max_out.min(input.len().saturating_mul(4)));
    let mut chunk = alloc::vec![0u8; 8 * 1024];
    let mut pending = input;

    loop {
        let result = miniz_oxide::inflate::stream::inflate(
            &mut state,
            pending,
            &mut chunk,
            MZFlush::None,
        );
        let consumed = result.bytes_consumed;
        let produced = result.bytes_written;
        pending = &pending[consumed..];
        if out.len() + produced > max_out {
            return Err(ZipError::FileTooLarge);
        }
        out.extend_from_slice(&chunk[..produced]);

        match result.status {
            Ok(MZStatus::StreamEnd) => break,
            Ok(MZStatus::Ok) => {
                if consumed == 0 && produced == 0 {
                    return Err(ZipError::DecompressError);
                }
            }
            Ok(MZStatus::NeedDict) | Err(_) => return Err(ZipError::DecompressError),
        }
    }

    Ok(out)
}

/// Read u16 from buffer at offset (little-endian)
fn read_u16_le(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

/// Read u32 from buffer at offset (little-endian)
fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}
