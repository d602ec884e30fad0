use std::fmt;

#[derive(Debug)]
pub enum Error {
    InvalidHashLength { field: &'static str, expected: usize, actual: usize },
    InvalidHashEncoding { field: &'static str, character: char },
    DuplicatePath(String),
    UnsafePath(String),
    NonMonotonicVersion { version_id: u64, from_version_id: u64 },
    MissingCompanionHash { field: &'static str, companion: &'static str },
    Json(serde_json::Error),
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidHashLength { field, expected, actual } => {
                write!(f, "field {field}: invalid hash length: expected {expected} hex chars, got {actual}")
            }
            Error::InvalidHashEncoding { field, character } => write!(f, "field {field}: invalid hash encoding: unexpected character {character:?}"),
            Error::DuplicatePath(path) => write!(f, "duplicate path in manifest: {path}"),
            Error::UnsafePath(path) => write!(f, "unsafe path in manifest: {path}"),
            Error::NonMonotonicVersion { version_id, from_version_id } => {
                write!(f, "VersionId ({version_id}) must be greater than FromVersionId ({from_version_id})")
            }
            Error::MissingCompanionHash { field, companion } => {
                write!(f, "field {field} is present but its companion hash {companion} is missing")
            }
            Error::Json(err) => write!(f, "failed to parse manifest JSON: {err}"),
            Error::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
