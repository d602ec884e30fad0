use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A 64 lowercase-hex-character SHA-256 digest, as carried on the wire.
///
/// Construction validates length and character set; comparisons are
/// case-insensitive (both sides are normalised to lowercase at construction).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexDigest(String);

impl HexDigest {
    pub fn parse(field: &'static str, hex: impl Into<String>) -> Result<Self, Error> {
        let hex = hex.into();
        if hex.len() != 64 {
            return Err(Error::InvalidHashLength { field, expected: 64, actual: hex.len() });
        }
        if let Some(c) = hex.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(Error::InvalidHashEncoding { field, character: c });
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for HexDigest {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        // Field name is unknown at this layer; callers that need a precise
        // field name for error messages should use `HexDigest::parse` directly
        // instead of going through serde deserialization.
        Self::parse("hash", value)
    }
}

impl From<HexDigest> for String {
    fn from(value: HexDigest) -> Self {
        value.0
    }
}

impl std::fmt::Display for HexDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single add/modify/remove instruction in a [`Manifest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Action", rename_all = "lowercase")]
pub enum FileAction {
    Added {
        #[serde(rename = "Path")]
        path: String,
        /// Package-relative path to the full new content.
        #[serde(rename = "AddFile")]
        add_file: String,
        #[serde(rename = "TargetHash")]
        target_hash: HexDigest,
        /// Hash of `AddFile`'s bytes inside the package.
        #[serde(rename = "PackageFileHash")]
        package_file_hash: HexDigest,
    },
    Modified {
        #[serde(rename = "Path")]
        path: String,
        /// Package-relative path to the bsdiff patch.
        #[serde(rename = "PatchFile")]
        patch_file: String,
        /// Expected pre-image hash of the on-disk file.
        #[serde(rename = "SourceHash")]
        source_hash: HexDigest,
        /// Expected post-image hash after the patch is applied.
        #[serde(rename = "TargetHash")]
        target_hash: HexDigest,
        /// Hash of the patch bytes inside the package.
        #[serde(rename = "PackageFileHash")]
        package_file_hash: HexDigest,
    },
    Removed {
        #[serde(rename = "Path")]
        path: String,
    },
}

impl FileAction {
    pub fn path(&self) -> &str {
        match self {
            FileAction::Added { path, .. } | FileAction::Modified { path, .. } | FileAction::Removed { path } => path,
        }
    }
}

/// The signed, versioned description of an update transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "VersionId")]
    pub version_id: u64,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "FromVersionId")]
    pub from_version_id: u64,
    #[serde(rename = "ReleaseName", skip_serializing_if = "Option::is_none", default)]
    pub release_name: Option<String>,
    #[serde(rename = "Changes", skip_serializing_if = "Vec::is_empty", default)]
    pub changes: Vec<String>,
    #[serde(rename = "Files")]
    pub files: Vec<FileAction>,
    #[serde(rename = "RestartRequired", default = "default_true")]
    pub restart_required: bool,
    #[serde(rename = "Critical", default)]
    pub critical: bool,
    #[serde(rename = "FallbackInstallerFile", skip_serializing_if = "Option::is_none", default)]
    pub fallback_installer_file: Option<String>,
    #[serde(rename = "FallbackInstallerHash", skip_serializing_if = "Option::is_none", default)]
    pub fallback_installer_hash: Option<HexDigest>,
    #[serde(rename = "FallbackInstallerArguments", skip_serializing_if = "Option::is_none", default)]
    pub fallback_installer_arguments: Option<String>,
    #[serde(rename = "FullPackageFile", skip_serializing_if = "Option::is_none", default)]
    pub full_package_file: Option<String>,
    #[serde(rename = "FullPackageHash", skip_serializing_if = "Option::is_none", default)]
    pub full_package_hash: Option<HexDigest>,
    #[serde(rename = "Signature", skip_serializing_if = "Option::is_none", default)]
    pub signature: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Manifest {
    /// Returns a copy of this manifest with `Signature` cleared, i.e. the
    /// value that is canonicalised and signed/verified.
    pub fn without_signature(&self) -> Manifest {
        let mut m = self.clone();
        m.signature = None;
        m
    }

    /// Validates the structural invariants of §3: `VersionId >
    /// FromVersionId`, unique paths, path safety, and hash-presence
    /// companion rules. Does not touch the filesystem or verify any
    /// signature.
    pub fn validate(&self) -> Result<(), Error> {
        if self.version_id <= self.from_version_id && self.from_version_id != 0 {
            return Err(Error::NonMonotonicVersion { version_id: self.version_id, from_version_id: self.from_version_id });
        }

        let mut seen = std::collections::HashSet::new();
        for action in &self.files {
            let path = action.path();
            validate_path(path)?;
            if !seen.insert(path) {
                return Err(Error::DuplicatePath(path.to_string()));
            }
        }

        if self.full_package_file.is_some() && self.full_package_hash.is_none() {
            return Err(Error::MissingCompanionHash { field: "FullPackageFile", companion: "FullPackageHash" });
        }
        if self.fallback_installer_file.is_some() && self.fallback_installer_hash.is_none() {
            return Err(Error::MissingCompanionHash { field: "FallbackInstallerFile", companion: "FallbackInstallerHash" });
        }

        Ok(())
    }
}

/// Rejects paths with `..` segments, a leading `/`, backslashes, or a drive
/// letter.
pub fn validate_path(path: &str) -> Result<(), Error> {
    let unsafe_ = path.starts_with('/')
        || path.contains('\\')
        || path.split('/').any(|seg| seg == "..")
        || path.chars().nth(1) == Some(':'); // drive letter, e.g. "C:"

    if unsafe_ || path.is_empty() {
        return Err(Error::UnsafePath(path.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(byte: u8) -> HexDigest {
        let hex: String = [byte; 32].iter().map(|b| format!("{b:02x}")).collect();
        HexDigest::parse("test", hex).unwrap()
    }

    #[test]
    fn rejects_wrong_length_hash() {
        assert!(HexDigest::parse("TargetHash", "abcd").is_err());
    }

    #[test]
    fn rejects_non_hex_characters() {
        let mut s = "a".repeat(64);
        s.replace_range(0..1, "z");
        assert!(HexDigest::parse("TargetHash", s).is_err());
    }

    #[test]
    fn accepts_uppercase_and_normalises() {
        let upper = "AB".repeat(32);
        let d = HexDigest::parse("TargetHash", upper).unwrap();
        assert_eq!(d.as_str(), "ab".repeat(32));
    }

    #[test]
    fn rejects_dotdot_and_absolute_and_backslash_paths() {
        assert!(validate_path("../etc/passwd").is_err());
        assert!(validate_path("a/../b").is_err());
        assert!(validate_path("/etc/passwd").is_err());
        assert!(validate_path("C:\\Windows").is_err());
        assert!(validate_path("a\\b").is_err());
        assert!(validate_path("").is_err());
        assert!(validate_path("a/b/c.txt").is_ok());
    }

    #[test]
    fn validate_rejects_duplicate_paths() {
        let m = Manifest {
            version_id: 2,
            version: "2.0".into(),
            from_version_id: 1,
            release_name: None,
            changes: vec![],
            files: vec![FileAction::Removed { path: "a.txt".into() }, FileAction::Removed { path: "a.txt".into() }],
            restart_required: true,
            critical: false,
            fallback_installer_file: None,
            fallback_installer_hash: None,
            fallback_installer_arguments: None,
            full_package_file: None,
            full_package_hash: None,
            signature: None,
        };
        assert!(matches!(m.validate(), Err(Error::DuplicatePath(_))));
    }

    #[test]
    fn validate_requires_monotonic_version_id() {
        let m = Manifest {
            version_id: 1,
            version: "1.0".into(),
            from_version_id: 2,
            release_name: None,
            changes: vec![],
            files: vec![],
            restart_required: true,
            critical: false,
            fallback_installer_file: None,
            fallback_installer_hash: None,
            fallback_installer_arguments: None,
            full_package_file: None,
            full_package_hash: None,
            signature: None,
        };
        assert!(matches!(m.validate(), Err(Error::NonMonotonicVersion { .. })));
    }

    #[test]
    fn validate_requires_companion_hash() {
        let mut m = Manifest {
            version_id: 2,
            version: "2.0".into(),
            from_version_id: 1,
            release_name: None,
            changes: vec![],
            files: vec![],
            restart_required: true,
            critical: false,
            fallback_installer_file: None,
            fallback_installer_hash: None,
            fallback_installer_arguments: None,
            full_package_file: Some("full.zip".into()),
            full_package_hash: None,
            signature: None,
        };
        assert!(m.validate().is_err());
        m.full_package_hash = Some(digest(1));
        assert!(m.validate().is_ok());
    }
}
