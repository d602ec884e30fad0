//! Package Builder: walks two directory trees, classifies each path as
//! added/modified/removed, writes patches and new-file bytes into a ZIP,
//! and assembles and signs the manifest that describes the transition.

use std::collections::BTreeSet;
use std::path::Path;

use log::info;
use p256::ecdsa::SigningKey;
use update_codec::bsdiff;
use update_manifest::{FileAction, Manifest};

use crate::archive::{mangle_path, PackageWriter};
use crate::config::ReleaseConfig;
use crate::Error;

fn relative_files(root: &Path) -> BTreeSet<String> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            e.path().strip_prefix(root).ok().map(|p| p.to_string_lossy().replace('\\', "/"))
        })
        .collect()
}

/// Builds a signed update package from `old_dir` to `new_dir`, writing
/// `<output_dir>/update.pkg` (the ZIP) and `<output_dir>/meta.json` (a
/// plain copy of the signed manifest). Returns the signed manifest.
pub fn build_update_package(
    old_dir: &Path,
    new_dir: &Path,
    output_dir: &Path,
    signing_key: &SigningKey,
    config: &ReleaseConfig,
) -> Result<Manifest, Error> {
    std::fs::create_dir_all(output_dir).map_err(|err| Error::Io(output_dir.to_path_buf(), err))?;

    let pkg_path = output_dir.join("update.pkg");
    let mut writer = PackageWriter::create(&pkg_path)?;

    let old_paths = relative_files(old_dir);
    let new_paths = relative_files(new_dir);

    let mut files = Vec::new();

    for path in old_paths.union(&new_paths) {
        let in_old = old_paths.contains(path);
        let in_new = new_paths.contains(path);

        match (in_old, in_new) {
            (true, true) => {
                let old_bytes = std::fs::read(old_dir.join(path)).map_err(|err| Error::Io(old_dir.join(path), err))?;
                let new_bytes = std::fs::read(new_dir.join(path)).map_err(|err| Error::Io(new_dir.join(path), err))?;

                if old_bytes == new_bytes {
                    continue;
                }

                info!("modified: {path}");
                let source_hash = update_manifest::hash_bytes(&old_bytes).to_hex();
                let target_hash = update_manifest::hash_bytes(&new_bytes).to_hex();
                let patch = bsdiff::create_patch(&old_bytes, &new_bytes)?;
                let package_file_hash = update_manifest::hash_bytes(&patch).to_hex();

                let mangled = format!("{}.patch", mangle_path(path));
                writer.write_diff(&mangled, &patch)?;

                files.push(FileAction::Modified {
                    path: path.clone(),
                    patch_file: mangled,
                    source_hash: parse_hash(&source_hash)?,
                    target_hash: parse_hash(&target_hash)?,
                    package_file_hash: parse_hash(&package_file_hash)?,
                });
            }
            (false, true) => {
                info!("added: {path}");
                let new_bytes = std::fs::read(new_dir.join(path)).map_err(|err| Error::Io(new_dir.join(path), err))?;
                let target_hash = update_manifest::hash_bytes(&new_bytes).to_hex();

                let mangled = mangle_path(path);
                writer.write_add(&mangled, &new_bytes)?;

                files.push(FileAction::Added {
                    path: path.clone(),
                    add_file: mangled,
                    target_hash: parse_hash(&target_hash)?,
                    package_file_hash: parse_hash(&target_hash)?,
                });
            }
            (true, false) => {
                info!("removed: {path}");
                files.push(FileAction::Removed { path: path.clone() });
            }
            (false, false) => unreachable!("path came from the union of old and new path sets"),
        }
    }

    let manifest = Manifest {
        version_id: config.version_id,
        version: config.version.clone(),
        from_version_id: config.from_version_id,
        release_name: config.release_name.clone(),
        changes: config.changes.clone(),
        files,
        restart_required: config.restart_required,
        critical: config.critical,
        fallback_installer_file: config.fallback_installer_file.clone(),
        fallback_installer_hash: config.fallback_installer_hash.as_deref().map(parse_hash).transpose()?,
        fallback_installer_arguments: config.fallback_installer_arguments.clone(),
        full_package_file: config.full_package_file.clone(),
        full_package_hash: config.full_package_hash.as_deref().map(parse_hash).transpose()?,
        signature: None,
    };

    manifest.validate()?;

    let canonical = update_manifest::canonical_bytes(&manifest)?;
    let signature = update_codec::sign::sign(signing_key, &canonical)?;

    let mut signed = manifest;
    signed.signature = Some(signature);

    let meta_bytes = serde_json::to_vec_pretty(&signed).map_err(|err| Error::MalformedManifest(err.to_string()))?;
    writer.write_meta(&meta_bytes)?;
    writer.finish()?;

    std::fs::write(output_dir.join("meta.json"), &meta_bytes).map_err(|err| Error::Io(output_dir.join("meta.json"), err))?;

    Ok(signed)
}

fn parse_hash(hex: &str) -> Result<update_manifest::HexDigest, Error> {
    update_manifest::HexDigest::parse("hash", hex.to_string()).map_err(Error::from)
}
