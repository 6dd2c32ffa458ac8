//! Error types for OxbowDB.

use crate::types::KeyType;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using OxbowError.
pub type Result<T> = std::result::Result<T, OxbowError>;

/// Errors that can occur in OxbowDB operations.
#[derive(Debug, Error)]
pub enum OxbowError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Storage errors
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("File already exists: {0}")]
    FileExists(PathBuf),

    #[error("Page not found: {page_no} in file {file_id}")]
    PageNotFound { file_id: u32, page_no: u32 },

    #[error("Buffer pool full, unable to allocate frame")]
    BufferPoolFull,

    #[error("Record page full, unable to insert record")]
    PageFull,

    #[error("Record too large: {size} bytes (max {max})")]
    RecordTooLarge { size: usize, max: usize },

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("End of file reached")]
    EndOfFile,

    // Index errors
    #[error("Bad index meta info: {0}")]
    BadIndexInfo(String),

    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(KeyType),

    #[error("Key must be at least {expected} bytes, got {actual}")]
    KeyTooShort { expected: usize, actual: usize },

    // Scan errors
    #[error("Bad scan range: low {low} exceeds high {high}")]
    BadScanRange { low: i32, high: i32 },

    #[error("Bad scan opcodes: lower bound takes GT/GTE, upper bound takes LT/LTE")]
    BadOpcodes,

    #[error("No key in the index satisfies the scan criteria")]
    NoSuchKeyFound,

    #[error("No scan has been initialized")]
    ScanNotInitialized,

    #[error("Index scan completed")]
    IndexScanCompleted,

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}
