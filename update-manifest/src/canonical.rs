//! The signed byte sequence for a [`Manifest`](crate::Manifest).
//!
//! Canonicalisation is: clear `Signature`, serialise to JSON with the
//! manifest's declared field order, 2-space indentation, LF-only line
//! endings, no BOM. This must be deterministic across hosts regardless of
//! platform line-ending conventions, so the encoder writes directly into a
//! `Vec<u8>` rather than going through any formatter that could introduce
//! `\r\n`.

use crate::error::Error;
use crate::manifest::Manifest;

/// Produces the canonical byte sequence that is signed (at release time) or
/// verified (at apply time) for `manifest`.
pub fn canonical_bytes(manifest: &Manifest) -> Result<Vec<u8>, Error> {
    let cleared = manifest.without_signature();

    // `serde_json::to_vec_pretty` uses 2-space indentation and `\n` line
    // endings by construction (its `PrettyFormatter` never emits `\r`), and
    // struct fields serialise in declaration order, which for `Manifest`
    // matches the schema's field order. We still go through this dedicated
    // function (rather than calling `serde_json` directly at call sites) so
    // that the "clear Signature first" step can never be forgotten by a
    // caller.
    let bytes = serde_json::to_vec_pretty(&cleared)?;

    debug_assert!(!bytes.contains(&b'\r'), "canonical encoding must not contain CR");

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::FileAction;

    fn sample(signature: Option<String>) -> Manifest {
        Manifest {
            version_id: 2,
            version: "2.0.0".into(),
            from_version_id: 1,
            release_name: Some("Spring release".into()),
            changes: vec!["fixed bugs".into()],
            files: vec![FileAction::Removed { path: "tmp/gone".into() }],
            restart_required: true,
            critical: false,
            fallback_installer_file: None,
            fallback_installer_hash: None,
            fallback_installer_arguments: None,
            full_package_file: None,
            full_package_hash: None,
            signature,
        }
    }

    #[test]
    fn canonical_encoding_has_no_cr_and_is_utf8() {
        let bytes = canonical_bytes(&sample(None)).unwrap();
        assert!(!bytes.contains(&b'\r'));
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with('{'));
    }

    #[test]
    fn canonical_encoding_ignores_prior_signature_value() {
        let a = canonical_bytes(&sample(None)).unwrap();
        let b = canonical_bytes(&sample(Some("deadbeef==".into()))).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn canonical_encoding_is_deterministic_across_calls() {
        let m = sample(None);
        assert_eq!(canonical_bytes(&m).unwrap(), canonical_bytes(&m).unwrap());
    }

    #[test]
    fn canonical_encoding_omits_absent_optional_fields() {
        let mut m = sample(None);
        m.release_name = None;
        let text = String::from_utf8(canonical_bytes(&m).unwrap()).unwrap();
        assert!(!text.contains("ReleaseName"));
        assert!(!text.contains("Signature"));
    }

    #[test]
    fn single_bit_mutation_changes_canonical_bytes() {
        let a = canonical_bytes(&sample(None)).unwrap();
        let mut mutated = sample(None);
        mutated.version_id += 1;
        let b = canonical_bytes(&mutated).unwrap();
        assert_ne!(a, b);
    }
}
