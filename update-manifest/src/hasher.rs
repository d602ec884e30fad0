use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256 as Sha256Impl};

use crate::hash_types::{Hash, Sha256};

const CHUNKLEN: usize = 10 * 1024 * 1024; // 10 MiB

/// Streaming SHA-256 of an open reader. Reads to EOF.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<Hash<Sha256>> {
    let mut hasher = Sha256Impl::new();
    let mut buf = vec![0u8; CHUNKLEN];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(Hash::from_bytes(hasher.finalize().into()))
}

/// Streaming SHA-256 of a file on disk.
pub fn hash_file(path: &Path) -> io::Result<Hash<Sha256>> {
    let file = File::open(path)?;
    hash_reader(BufReader::new(file))
}

/// SHA-256 of an in-memory buffer.
pub fn hash_bytes(data: &[u8]) -> Hash<Sha256> {
    let mut hasher = Sha256Impl::new();
    hasher.update(data);
    Hash::from_bytes(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn hash_bytes_matches_known_vector() {
        // SHA-256("abc")
        let h = hash_bytes(b"abc");
        assert_eq!(h.to_hex(), "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    #[test]
    fn hash_file_matches_hash_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"hello world").unwrap();
        drop(f);

        assert_eq!(hash_file(&path).unwrap(), hash_bytes(b"hello world"));
    }

    #[test]
    fn hash_file_handles_multiple_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let data = vec![0x42u8; CHUNKLEN + 1234];
        std::fs::write(&path, &data).unwrap();

        assert_eq!(hash_file(&path).unwrap(), hash_bytes(&data));
    }
}
