use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Length of a rendered digest in hexadecimal characters.
pub const DIGEST_HEX_LEN: usize = 64;

/// Computes the content fingerprint used for history paths, raw bodies and
/// normalized bodies.
///
/// The result is the `SHA-256` of the UTF-8 bytes rendered as
/// [`DIGEST_HEX_LEN`] lowercase hexadecimal characters.
pub fn digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hasher
        .finalize()
        .iter()
        .fold(String::with_capacity(DIGEST_HEX_LEN), |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        })
}

/// Returns `true` when `candidate` has the shape of a value produced by [`digest`].
///
/// Older history files may carry placeholder or differently sized hashes;
/// those fail this check and are treated as untrustworthy.
pub fn is_digest(candidate: &str) -> bool {
    candidate.len() == DIGEST_HEX_LEN
        && candidate
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
