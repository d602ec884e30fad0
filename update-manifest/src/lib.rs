mod canonical;
pub use canonical::canonical_bytes;

mod error;
pub use error::Error;

mod hash_types;
pub use hash_types::{Hash, HashAlgo, Sha256};

mod hasher;
pub use hasher::{hash_bytes, hash_file, hash_reader};

mod manifest;
pub use manifest::{validate_path, FileAction, HexDigest, Manifest};
