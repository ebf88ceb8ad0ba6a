//! SHA-1 content digests
//!
//! Digests are compared against `sha1sum` output on the target, so they
//! are always lowercase hex, 40 characters.

use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Hash a local file in fixed-size chunks
///
/// Memory use is constant regardless of file size.
pub fn hash_local_file(path: &Path) -> std::io::Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(128 * 1024, file);
    let mut hasher = Sha1::new();

    let mut buffer = [0u8; 8192];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Hash an in-memory buffer
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}
