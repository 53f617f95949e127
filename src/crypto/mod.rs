//! Content digests for chunk and whole-file integrity checks.
//!
//! Every payload written to a node is fingerprinted with BLAKE3 and the
//! fingerprint is stored next to its placement record, so any read can be
//! verified byte-for-byte against what was originally placed.

mod hashing;

pub use hashing::{ContentHash, IncrementalHasher};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Invalid digest encoding: {0}")]
    InvalidEncoding(String),

    #[error("Invalid digest length: expected 32 bytes, got {0}")]
    InvalidLength(usize),
}
