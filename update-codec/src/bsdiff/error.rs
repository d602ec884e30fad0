#[derive(Debug)]
pub enum Error {
    BadMagic([u8; 8]),
    Truncated(&'static str),
    NegativeLength { field: &'static str, value: i64 },
    ControlExceedsOutput { add: i64, copy: i64, remaining: i64 },
    OldCursorOutOfRange { cursor: i64, old_len: usize },
    OutputSizeMismatch { expected: i64, actual: usize },
    Io(std::io::Error),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::BadMagic(magic) => write!(f, "bad bsdiff magic: {magic:?}"),
            Error::Truncated(what) => write!(f, "truncated patch stream while reading {what}"),
            Error::NegativeLength { field, value } => write!(f, "negative {field} in control triple: {value}"),
            Error::ControlExceedsOutput { add, copy, remaining } => {
                write!(f, "control triple (add={add}, copy={copy}) exceeds remaining output ({remaining} bytes)")
            }
            Error::OldCursorOutOfRange { cursor, old_len } => {
                write!(f, "old-file cursor {cursor} out of range for old file of length {old_len}")
            }
            Error::OutputSizeMismatch { expected, actual } => write!(f, "output size mismatch: header declared {expected}, produced {actual}"),
            Error::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
