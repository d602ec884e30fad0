//! Full-package recovery path: invoked by an outer controller when the
//! applier reports `SourceMismatch` and the trusted manifest carries a
//! `FullPackageFile`/`FullPackageHash` pair.

use std::path::Path;

use update_manifest::Manifest;

use crate::archive;
use crate::Error;

/// Fetches bytes from a URL. The default implementation wraps a blocking
/// `reqwest` client; tests inject an in-memory fake.
pub trait FetchClient {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, Error>;
}

pub struct ReqwestFetchClient {
    client: reqwest::blocking::Client,
}

impl Default for ReqwestFetchClient {
    fn default() -> Self {
        Self { client: reqwest::blocking::Client::new() }
    }
}

impl FetchClient for ReqwestFetchClient {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, Error> {
        let mut response = self.client.get(url).send()?;
        let mut buf = Vec::new();
        response.copy_to(&mut buf)?;
        Ok(buf)
    }
}

/// Drives the full-package recovery path described for a manifest whose
/// delta could not be applied.
pub struct FallbackController<F: FetchClient> {
    fetch_client: F,
    confirm: Box<dyn Fn(&Manifest) -> bool>,
}

impl<F: FetchClient> FallbackController<F> {
    pub fn new(fetch_client: F, confirm: Box<dyn Fn(&Manifest) -> bool>) -> Self {
        Self { fetch_client, confirm }
    }

    /// Downloads the manifest's full-package archive from `base_url`,
    /// verifies its hash against `FullPackageHash`, asks the injected
    /// confirmation callback, and replaces `target_dir` with its contents.
    pub fn recover(&self, manifest: &Manifest, base_url: &str, target_dir: &Path) -> Result<(), Error> {
        let file = manifest.full_package_file.as_deref().ok_or_else(|| Error::MalformedManifest("no FullPackageFile in manifest".into()))?;
        let expected_hash = manifest.full_package_hash.as_ref().ok_or_else(|| Error::MalformedManifest("no FullPackageHash in manifest".into()))?;

        let url = format!("{}/{}", base_url.trim_end_matches('/'), file);
        let bytes = self.fetch_client.fetch(&url)?;

        let actual_hash = update_manifest::hash_bytes(&bytes).to_hex();
        if actual_hash != expected_hash.as_str() {
            return Err(Error::PackageCorrupt(format!("full package hash mismatch: expected {expected_hash}, got {actual_hash}")));
        }

        if !(self.confirm)(manifest) {
            return Err(Error::Cancelled);
        }

        archive::extract_full_archive(&bytes, target_dir)
    }
}
