//! Content fingerprinting for upload deduplication.
//!
//! The primary fingerprint is a SHA-256 digest of the full byte content,
//! hex-encoded. Identical bytes always produce the same string, which is what
//! makes remote dedup and the queue-level duplicate collapse work.
//!
//! [`fallback_fingerprint`] exists for the rare payload whose bytes cannot be
//! read at intake time. It is built from the length, the clock, and random
//! salt, and is therefore **not** content-stable: two fingerprints of the same
//! document will differ, so fallback-fingerprinted jobs are never dedupable
//! across sessions. Callers can branch on [`is_content_stable`].

use rand::Rng;
use sha2::{Digest, Sha256};

/// Prefix marking a non-content-stable fallback fingerprint.
const FALLBACK_PREFIX: &str = "fz_";

/// Compute the SHA-256 hash of `data`, lowercase hex-encoded.
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Build a last-resort fingerprint for a payload of `len` bytes.
///
/// Unique per call, never stable across calls. Always succeeds.
pub fn fallback_fingerprint(len: usize) -> String {
    let salt: u32 = rand::thread_rng().gen();
    format!(
        "{}{}_{}_{:08x}",
        FALLBACK_PREFIX,
        len,
        chrono::Utc::now().timestamp_millis(),
        salt
    )
}

/// Whether `hash` identifies content (SHA-256) rather than a fallback value.
pub fn is_content_stable(hash: &str) -> bool {
    !hash.starts_with(FALLBACK_PREFIX)
}
