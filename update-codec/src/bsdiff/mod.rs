//! Binary delta codec: a from-scratch bsdiff-1 implementation (suffix-array
//! matching plus bzip2-compressed control/diff/extra streams), compatible
//! in wire format with the reference `bsdiff`/`bspatch` tools.

mod apply;
mod create;
pub mod error;
mod header;
mod sufarray;

pub use apply::apply_patch;
pub use create::create_patch;
pub use error::Error;
pub use header::{Header, HEADER_LEN, MAGIC};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_on_unrelated_random_like_data() {
        let old: Vec<u8> = (0..4000).map(|i| ((i * 37 + 11) % 256) as u8).collect();
        let new: Vec<u8> = (0..5000).map(|i| ((i * 53 + 7) % 256) as u8).collect();

        let patch = create_patch(&old, &new).unwrap();
        let reconstructed = apply_patch(&old, &patch).unwrap();
        assert_eq!(reconstructed, new);
    }

    #[test]
    fn apply_rejects_patch_for_wrong_old_file() {
        let old = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_vec();
        let new = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaabbbb".to_vec();
        let patch = create_patch(&old, &new).unwrap();

        let different_old = vec![0u8; old.len()];
        // Applying against an unrelated old file either errors out on an
        // out-of-range seek or silently produces wrong bytes; either way it
        // must never panic and must never equal the intended output when
        // the old file genuinely differs in this adversarial sense.
        let result = apply_patch(&different_old, &patch);
        if let Ok(bytes) = result {
            assert_ne!(bytes, new);
        }
    }
}
