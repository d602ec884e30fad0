//! Package Applier: the pipeline that turns a downloaded package into a
//! mutated installation directory, enforcing the full integrity chain
//! before a single byte is written to `target_dir`.
//!
//! Commit atomicity is a same-volume `rename()` per staged file; there is
//! no two-phase journal, so a crash during stage 6 can leave a partially
//! applied installation. A future revision would need a journal to close
//! this gap.

use std::path::{Path, PathBuf};

use log::{info, warn};
use p256::ecdsa::VerifyingKey;
use update_codec::bsdiff;
use update_manifest::{FileAction, Manifest};

use crate::archive::PackageReader;
use crate::cancel::CancellationToken;
use crate::Error;

enum Staged {
    WriteFile { target: PathBuf, temp: PathBuf, mode: Option<u32> },
    Remove { target: PathBuf },
}

/// Applies `package_path` to `target_dir` using `verifying_key` as the
/// trust anchor. Returns the verified manifest on success. No byte is
/// written to `target_dir` unless every verification stage succeeds.
pub fn apply(package_path: &Path, target_dir: &Path, verifying_key: &VerifyingKey, cancel: &CancellationToken) -> Result<Manifest, Error> {
    // Stage 1: open and parse.
    let mut reader = PackageReader::open(package_path)?;
    let meta_bytes = reader.read_meta()?;
    let manifest: Manifest = serde_json::from_slice(&meta_bytes).map_err(|err| Error::MalformedManifest(err.to_string()))?;
    manifest.validate()?;

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    // Stage 2: verify signature over the canonical encoding.
    let canonical = update_manifest::canonical_bytes(&manifest)?;
    let signature = manifest.signature.as_deref().ok_or(Error::SignatureInvalid)?;
    if !update_codec::sign::verify(verifying_key, &canonical, signature) {
        return Err(Error::SignatureInvalid);
    }

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    // Stage 3: verify package-file hashes for every entry referenced by the
    // manifest, before any byte is hashed from the target directory.
    let mut package_bytes: Vec<(String, Vec<u8>)> = Vec::new();
    for action in &manifest.files {
        match action {
            FileAction::Added { add_file, package_file_hash, .. } => {
                let bytes = reader.read_add(add_file)?;
                verify_hash(add_file, &bytes, package_file_hash.as_str())?;
                package_bytes.push((add_file.clone(), bytes));
            }
            FileAction::Modified { patch_file, package_file_hash, .. } => {
                let bytes = reader.read_diff(patch_file)?;
                verify_hash(patch_file, &bytes, package_file_hash.as_str())?;
                package_bytes.push((patch_file.clone(), bytes));
            }
            FileAction::Removed { .. } => {}
        }
    }

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    // Stage 4: verify pre-images. Hashing multiple files is independent
    // work, so it runs across a bounded pool of worker threads; the target
    // directory is only read here, never written.
    let modified: Vec<&FileAction> = manifest.files.iter().filter(|a| matches!(a, FileAction::Modified { .. })).collect();
    let mismatches = std::sync::Mutex::new(Vec::new());
    let worker_count = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1).min(8).max(1);

    std::thread::scope(|scope| {
        let chunk_size = ((modified.len() + worker_count - 1) / worker_count).max(1);
        for chunk in modified.chunks(chunk_size) {
            let mismatches = &mismatches;
            scope.spawn(move || {
                for action in chunk {
                    if let FileAction::Modified { path, source_hash, .. } = action {
                        let on_disk = target_dir.join(path);
                        match update_manifest::hash_file(&on_disk) {
                            Ok(hash) if hash.to_hex() == source_hash.as_str() => {}
                            Ok(hash) => mismatches.lock().unwrap().push((path.clone(), source_hash.as_str().to_string(), hash.to_hex())),
                            Err(_) => mismatches.lock().unwrap().push((path.clone(), source_hash.as_str().to_string(), "<unreadable>".to_string())),
                        }
                    }
                }
            });
        }
    });

    if let Some((path, expected, actual)) = mismatches.into_inner().unwrap().into_iter().next() {
        return Err(Error::SourceMismatch { path, expected, actual });
    }

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    // Stage 5: reconstruct into a staging area; nothing here touches
    // `target_dir` except to read the pre-image of a `modified` action.
    let mut staged = Vec::new();
    let package_bytes: std::collections::HashMap<_, _> = package_bytes.into_iter().collect();

    for action in &manifest.files {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match action {
            FileAction::Modified { path, patch_file, target_hash, .. } => {
                let target = target_dir.join(path);
                let old_bytes = std::fs::read(&target).map_err(|err| Error::Io(target.clone(), err))?;
                let mode = file_mode(&target);
                let patch_bytes = package_bytes.get(patch_file).expect("package_file_hash verified above");
                let new_bytes = bsdiff::apply_patch(&old_bytes, patch_bytes)?;
                verify_target_hash(path, &new_bytes, target_hash.as_str())?;

                let temp = sibling_temp_path(&target);
                if let Some(parent) = temp.parent() {
                    std::fs::create_dir_all(parent).map_err(|err| Error::Io(parent.to_path_buf(), err))?;
                }
                std::fs::write(&temp, &new_bytes).map_err(|err| Error::Io(temp.clone(), err))?;
                staged.push(Staged::WriteFile { target, temp, mode });
            }
            FileAction::Added { path, add_file, target_hash, .. } => {
                let target = target_dir.join(path);
                let new_bytes = package_bytes.get(add_file).expect("package_file_hash verified above");
                verify_target_hash(path, new_bytes, target_hash.as_str())?;

                let temp = sibling_temp_path(&target);
                if let Some(parent) = temp.parent() {
                    std::fs::create_dir_all(parent).map_err(|err| Error::Io(parent.to_path_buf(), err))?;
                }
                std::fs::write(&temp, new_bytes).map_err(|err| Error::Io(temp.clone(), err))?;
                staged.push(Staged::WriteFile { target, temp, mode: None });
            }
            FileAction::Removed { path } => {
                staged.push(Staged::Remove { target: target_dir.join(path) });
            }
        }
    }

    if cancel.is_cancelled() {
        for item in &staged {
            if let Staged::WriteFile { temp, .. } = item {
                let _ = std::fs::remove_file(temp);
            }
        }
        return Err(Error::Cancelled);
    }

    // Stage 6: commit. Renames in manifest order, then removals. Not
    // honoured to cancel once started, per the ordering guarantee.
    for item in &staged {
        if let Staged::WriteFile { target, temp, mode } = item {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|err| Error::Io(parent.to_path_buf(), err))?;
            }
            apply_mode(temp, *mode);
            std::fs::rename(temp, target).map_err(|err| Error::Io(target.clone(), err))?;
            info!("committed {}", target.display());
        }
    }
    for item in &staged {
        if let Staged::Remove { target } = item {
            match std::fs::remove_file(target) {
                Ok(()) => info!("removed {}", target.display()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(Error::Io(target.clone(), err)),
            }
        }
    }

    // Stage 7.
    Ok(manifest)
}

/// Checks a package entry's bytes against its `PackageFileHash` (stage 3).
/// A mismatch here means the package itself is corrupt or tampered with.
fn verify_hash(name: &str, bytes: &[u8], expected: &str) -> Result<(), Error> {
    let actual = update_manifest::hash_bytes(bytes).to_hex();
    if actual != expected {
        warn!("package hash mismatch for {name}: expected {expected}, got {actual}");
        return Err(Error::PackageCorrupt(format!("{name}: expected hash {expected}, got {actual}")));
    }
    Ok(())
}

/// Checks a reconstructed file's bytes against its `TargetHash` (stage 5).
/// A mismatch here means the patch applied cleanly but produced the wrong
/// post-image, distinct from a corrupt package entry.
fn verify_target_hash(path: &str, bytes: &[u8], expected: &str) -> Result<(), Error> {
    let actual = update_manifest::hash_bytes(bytes).to_hex();
    if actual != expected {
        warn!("target hash mismatch for {path}: expected {expected}, got {actual}");
        return Err(Error::TargetMismatch { path: path.to_string(), expected: expected.to_string(), actual });
    }
    Ok(())
}

fn sibling_temp_path(target: &Path) -> PathBuf {
    let file_name = target.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    target.with_file_name(format!("{file_name}.selfupdate-tmp"))
}

#[cfg(unix)]
fn file_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).ok().map(|m| m.permissions().mode())
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> Option<u32> {
    None
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>) {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = mode {
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode));
    }
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::builder::build_update_package;
    use p256::pkcs8::DecodePublicKey;

    fn write_file(dir: &Path, rel: &str, contents: &[u8]) {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn keypair() -> (p256::ecdsa::SigningKey, VerifyingKey) {
        use p256::pkcs8::DecodePrivateKey;
        let kp = update_codec::sign::generate_keypair().unwrap();
        (p256::ecdsa::SigningKey::from_pkcs8_pem(&kp.private_key_pem).unwrap(), VerifyingKey::from_public_key_pem(&kp.public_key_pem).unwrap())
    }

    #[test]
    fn no_op_update_leaves_target_untouched() {
        let old = tempfile::tempdir().unwrap();
        let new = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        write_file(old.path(), "a.txt", b"hello");
        write_file(new.path(), "a.txt", b"hello");
        write_file(target.path(), "a.txt", b"hello");

        let (signing_key, verifying_key) = keypair();
        build_update_package(old.path(), new.path(), out.path(), &signing_key, &crate::config::ReleaseConfig::default()).unwrap();

        let manifest = apply(&out.path().join("update.pkg"), target.path(), &verifying_key, &CancellationToken::new()).unwrap();
        assert!(manifest.files.is_empty());
        assert_eq!(std::fs::read(target.path().join("a.txt")).unwrap(), b"hello");
    }

    #[test]
    fn pure_add_writes_new_file() {
        let old = tempfile::tempdir().unwrap();
        let new = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        write_file(new.path(), "x/y.txt", b"abc");

        let (signing_key, verifying_key) = keypair();
        build_update_package(old.path(), new.path(), out.path(), &signing_key, &crate::config::ReleaseConfig::default()).unwrap();

        apply(&out.path().join("update.pkg"), target.path(), &verifying_key, &CancellationToken::new()).unwrap();
        assert_eq!(std::fs::read(target.path().join("x/y.txt")).unwrap(), b"abc");
    }

    #[test]
    fn modify_via_delta_reconstructs_target() {
        let old = tempfile::tempdir().unwrap();
        let new = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();

        let mut a: Vec<u8> = (0..65536u32).map(|i| (i % 251) as u8).collect();
        write_file(old.path(), "bin/app", &a);
        for b in a.iter_mut().skip(1000).take(100) {
            *b = b.wrapping_add(1);
        }
        write_file(new.path(), "bin/app", &a);
        write_file(target.path(), "bin/app", &(0..65536u32).map(|i| (i % 251) as u8).collect::<Vec<u8>>());

        let (signing_key, verifying_key) = keypair();
        build_update_package(old.path(), new.path(), out.path(), &signing_key, &crate::config::ReleaseConfig::default()).unwrap();

        apply(&out.path().join("update.pkg"), target.path(), &verifying_key, &CancellationToken::new()).unwrap();
        assert_eq!(std::fs::read(target.path().join("bin/app")).unwrap(), a);
    }

    #[test]
    fn remove_deletes_target_file() {
        let old = tempfile::tempdir().unwrap();
        let new = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        write_file(old.path(), "tmp/gone", b"bye");
        write_file(target.path(), "tmp/gone", b"bye");

        let (signing_key, verifying_key) = keypair();
        build_update_package(old.path(), new.path(), out.path(), &signing_key, &crate::config::ReleaseConfig::default()).unwrap();

        apply(&out.path().join("update.pkg"), target.path(), &verifying_key, &CancellationToken::new()).unwrap();
        assert!(!target.path().join("tmp/gone").exists());
    }

    #[test]
    fn tampered_manifest_fails_signature_verification_without_touching_target() {
        let old = tempfile::tempdir().unwrap();
        let new = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        write_file(new.path(), "a.txt", b"abc");

        let (signing_key, verifying_key) = keypair();
        let signed = build_update_package(old.path(), new.path(), out.path(), &signing_key, &crate::config::ReleaseConfig::default()).unwrap();

        // Tamper with VersionId post-signing by rewriting meta.json and
        // repacking, mirroring an attacker who can only touch the package.
        let mut tampered = signed.clone();
        tampered.version_id = 999;
        let tampered_bytes = serde_json::to_vec_pretty(&tampered).unwrap();

        let pkg_path = out.path().join("update.pkg");
        let repacked_path = out.path().join("tampered.pkg");
        repack_with_meta(&pkg_path, &repacked_path, &tampered_bytes);

        let result = apply(&repacked_path, target.path(), &verifying_key, &CancellationToken::new());
        assert!(matches!(result, Err(Error::SignatureInvalid)));
        assert!(!target.path().join("a.txt").exists());
    }

    #[test]
    fn tampered_patch_fails_as_package_corrupt() {
        let old = tempfile::tempdir().unwrap();
        let new = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        write_file(old.path(), "bin/app", &vec![1u8; 4096]);
        write_file(new.path(), "bin/app", &vec![2u8; 4096]);
        write_file(target.path(), "bin/app", &vec![1u8; 4096]);

        let (signing_key, verifying_key) = keypair();
        build_update_package(old.path(), new.path(), out.path(), &signing_key, &crate::config::ReleaseConfig::default()).unwrap();

        let pkg_path = out.path().join("update.pkg");
        flip_byte_in_entry(&pkg_path, "diffs/bin_app.patch");

        let result = apply(&pkg_path, target.path(), &verifying_key, &CancellationToken::new());
        assert!(matches!(result, Err(Error::PackageCorrupt(_))));
        assert_eq!(std::fs::read(target.path().join("bin/app")).unwrap(), vec![1u8; 4096]);
    }

    #[test]
    fn wrong_target_hash_fails_as_target_mismatch_not_package_corrupt() {
        let old = tempfile::tempdir().unwrap();
        let new = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        write_file(new.path(), "a.txt", b"abc");

        let (signing_key, verifying_key) = keypair();
        let signed = build_update_package(old.path(), new.path(), out.path(), &signing_key, &crate::config::ReleaseConfig::default()).unwrap();

        // The package entry still hashes correctly (stage 3 passes); only
        // the manifest's own claim about the post-image is wrong, as if a
        // release process computed TargetHash from the wrong file. Re-sign
        // so this exercises stage 5, not stage 2.
        let mut tampered = signed;
        if let update_manifest::FileAction::Added { target_hash, .. } = &mut tampered.files[0] {
            *target_hash = update_manifest::HexDigest::parse("TargetHash", "ab".repeat(32)).unwrap();
        }
        let canonical = update_manifest::canonical_bytes(&tampered).unwrap();
        tampered.signature = Some(update_codec::sign::sign(&signing_key, &canonical).unwrap());
        let tampered_bytes = serde_json::to_vec_pretty(&tampered).unwrap();

        let pkg_path = out.path().join("update.pkg");
        let repacked_path = out.path().join("retargeted.pkg");
        repack_with_meta(&pkg_path, &repacked_path, &tampered_bytes);

        let result = apply(&repacked_path, target.path(), &verifying_key, &CancellationToken::new());
        assert!(matches!(result, Err(Error::TargetMismatch { .. })));
        assert!(!target.path().join("a.txt").exists());
    }

    #[test]
    fn source_drift_fails_as_source_mismatch() {
        let old = tempfile::tempdir().unwrap();
        let new = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        write_file(old.path(), "bin/app", &vec![1u8; 4096]);
        write_file(new.path(), "bin/app", &vec![2u8; 4096]);
        write_file(target.path(), "bin/app", &vec![9u8; 4096]); // drifted locally

        let (signing_key, verifying_key) = keypair();
        build_update_package(old.path(), new.path(), out.path(), &signing_key, &crate::config::ReleaseConfig::default()).unwrap();

        let result = apply(&out.path().join("update.pkg"), target.path(), &verifying_key, &CancellationToken::new());
        assert!(matches!(result, Err(Error::SourceMismatch { .. })));
    }

    fn repack_with_meta(src: &Path, dst: &Path, meta_bytes: &[u8]) {
        let mut src_archive = zip::ZipArchive::new(std::fs::File::open(src).unwrap()).unwrap();
        let mut dst_zip = zip::ZipWriter::new(std::fs::File::create(dst).unwrap());
        let options = zip::write::FileOptions::default();

        for i in 0..src_archive.len() {
            let mut entry = src_archive.by_index(i).unwrap();
            let name = entry.name().to_string();
            let mut bytes = Vec::new();
            std::io::Read::read_to_end(&mut entry, &mut bytes).unwrap();
            drop(entry);

            dst_zip.start_file(&name, options).unwrap();
            if name == "meta.json" {
                std::io::Write::write_all(&mut dst_zip, meta_bytes).unwrap();
            } else {
                std::io::Write::write_all(&mut dst_zip, &bytes).unwrap();
            }
        }
        dst_zip.finish().unwrap();
    }

    fn flip_byte_in_entry(pkg_path: &Path, entry_name: &str) {
        let tmp_path = pkg_path.with_extension("tmp");
        {
            let mut src_archive = zip::ZipArchive::new(std::fs::File::open(pkg_path).unwrap()).unwrap();
            let mut dst_zip = zip::ZipWriter::new(std::fs::File::create(&tmp_path).unwrap());
            let options = zip::write::FileOptions::default();

            for i in 0..src_archive.len() {
                let mut entry = src_archive.by_index(i).unwrap();
                let name = entry.name().to_string();
                let mut bytes = Vec::new();
                std::io::Read::read_to_end(&mut entry, &mut bytes).unwrap();
                drop(entry);

                if name == entry_name && !bytes.is_empty() {
                    bytes[0] ^= 0xff;
                }

                dst_zip.start_file(&name, options).unwrap();
                std::io::Write::write_all(&mut dst_zip, &bytes).unwrap();
            }
            dst_zip.finish().unwrap();
        }
        std::fs::rename(tmp_path, pkg_path).unwrap();
    }
}
