#![deny(unsafe_code)]

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{ReferenceError, Result};

/// Lowercase hex SHA-256 of a file, streamed so large dimension files do
/// not land in memory.
pub fn sha256_hex_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| ReferenceError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher).map_err(|e| ReferenceError::io(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Lowercase hex SHA-256 of an in-memory buffer.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_known_vector() {
        // sha256("abc")
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn file_and_buffer_hashes_agree() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(sha256_hex_file(&path).unwrap(), sha256_hex(b"abc"));
    }
}
