//! Error types for dylib injection.
//!
//! Every failure aborts the run and is surfaced to the caller as-is; there is
//! no retry and no local recovery.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for injection operations.
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to open file '{path}': {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ==================== Format Errors ====================
    #[error("invalid Mach-O magic: {0:#x}")]
    InvalidMachoMagic(u32),

    #[error("byte-swapped Mach-O (magic {0:#x}) is not supported")]
    UnsupportedByteOrder(u32),

    #[error("universal (fat) binaries are not supported; extract a thin slice first")]
    FatBinary,

    #[error("parse error at offset {offset:#x}: {reason}")]
    Parse { offset: u64, reason: String },

    // ==================== Injection Errors ====================
    #[error("no free dylib name found after {attempts} attempts")]
    NameSpaceExhausted { attempts: u32 },

    #[error(
        "insufficient space for new load command (need {needed} bytes, have {available}); \
         this would require relocating segment data"
    )]
    InsufficientLoadCommandSpace { needed: u64, available: u64 },

    #[error("no section with file-backed data found; cannot bound the load command area")]
    NoDataRegion,
}

/// A specialized Result type for injection operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a parse error with a formatted message.
    #[inline]
    pub fn parse(offset: u64, reason: impl Into<String>) -> Self {
        Error::Parse {
            offset,
            reason: reason.into(),
        }
    }

    /// Returns true if the binary's layout, not the environment, caused the failure.
    ///
    /// Such errors will recur on every retry against the same file.
    #[inline]
    pub fn is_layout_error(&self) -> bool {
        matches!(
            self,
            Error::InsufficientLoadCommandSpace { .. } | Error::NoDataRegion
        )
    }
}
