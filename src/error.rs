use std::path::PathBuf;

/// The application-level error taxonomy: every failure mode the package
/// builder and applier can produce, distinguished so callers can treat
/// security failures (`SignatureInvalid`, `PackageCorrupt`, `TargetMismatch`)
/// differently from ordinary I/O errors.
#[derive(Debug)]
pub enum Error {
    Io(PathBuf, std::io::Error),
    MalformedManifest(String),
    SignatureInvalid,
    PackageCorrupt(String),
    SourceMismatch { path: String, expected: String, actual: String },
    TargetMismatch { path: String, expected: String, actual: String },
    MalformedPatch(update_codec::bsdiff::Error),
    Signing(update_codec::sign::Error),
    Cancelled,
    Zip(zip::result::ZipError),
    Http(reqwest::Error),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(path, err) => write!(f, "I/O error at {path:?}: {err}"),
            Error::MalformedManifest(msg) => write!(f, "malformed manifest: {msg}"),
            Error::SignatureInvalid => write!(f, "manifest signature is invalid"),
            Error::PackageCorrupt(msg) => write!(f, "package is corrupt: {msg}"),
            Error::SourceMismatch { path, expected, actual } => {
                write!(f, "source hash mismatch for {path}: expected {expected}, found {actual}")
            }
            Error::TargetMismatch { path, expected, actual } => {
                write!(f, "target hash mismatch for {path}: expected {expected}, found {actual}")
            }
            Error::MalformedPatch(err) => write!(f, "malformed patch: {err}"),
            Error::Signing(err) => write!(f, "signing failed: {err}"),
            Error::Cancelled => write!(f, "operation cancelled"),
            Error::Zip(err) => write!(f, "zip error: {err}"),
            Error::Http(err) => write!(f, "HTTP error: {err}"),
        }
    }
}

impl From<update_manifest::Error> for Error {
    fn from(err: update_manifest::Error) -> Self {
        Error::MalformedManifest(err.to_string())
    }
}

impl From<update_codec::bsdiff::Error> for Error {
    fn from(err: update_codec::bsdiff::Error) -> Self {
        Error::MalformedPatch(err)
    }
}

impl From<update_codec::sign::Error> for Error {
    fn from(err: update_codec::sign::Error) -> Self {
        Error::Signing(err)
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::Zip(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err)
    }
}
