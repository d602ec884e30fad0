use std::path::PathBuf;

#[derive(Debug)]
pub enum Error {
    ReadKeyFile(PathBuf, std::io::Error),
    DecodePrivateKey(p256::pkcs8::Error),
    DecodePublicKey(p256::pkcs8::spki::Error),
    EncodePrivateKey(p256::pkcs8::Error),
    EncodePublicKey(p256::pkcs8::spki::Error),
    InvalidBase64(ct_codecs::Error),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ReadKeyFile(path, err) => write!(f, "failed to read key file {path:?}: {err}"),
            Error::DecodePrivateKey(err) => write!(f, "failed to decode private key: {err}"),
            Error::DecodePublicKey(err) => write!(f, "failed to decode public key: {err}"),
            Error::EncodePrivateKey(err) => write!(f, "failed to encode private key: {err}"),
            Error::EncodePublicKey(err) => write!(f, "failed to encode public key: {err}"),
            Error::InvalidBase64(err) => write!(f, "invalid base64: {err}"),
        }
    }
}
