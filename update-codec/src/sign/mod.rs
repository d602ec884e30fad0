//! ECDSA P-256/SHA-256 signing and verification over detached, base64-encoded
//! signatures. Keys are consumed from PEM text; this module never persists
//! a key itself, only signs and verifies with keys the caller already holds.

mod error;
pub use error::Error;

use std::fs;
use std::path::Path;

use ct_codecs::{Base64, Decoder, Encoder};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};

pub type Result<T> = std::result::Result<T, Error>;

/// A freshly generated P-256 keypair, PEM-encoded, ready to write to disk.
pub struct GeneratedKeyPair {
    pub private_key_pem: String,
    pub public_key_pem: String,
}

/// Generates a new P-256 keypair. Callers are responsible for persisting the
/// private key securely; this module never writes it itself.
pub fn generate_keypair() -> Result<GeneratedKeyPair> {
    let signing_key = SigningKey::random(&mut rand_core::OsRng);
    let verifying_key = VerifyingKey::from(&signing_key);

    let private_key_pem = signing_key.to_pkcs8_pem(LineEnding::LF).map_err(Error::EncodePrivateKey)?.to_string();
    let public_key_pem = verifying_key.to_public_key_pem(LineEnding::LF).map_err(Error::EncodePublicKey)?;

    Ok(GeneratedKeyPair { private_key_pem, public_key_pem })
}

pub fn load_signing_key(path: &Path) -> Result<SigningKey> {
    let pem = fs::read_to_string(path).map_err(|err| Error::ReadKeyFile(path.to_path_buf(), err))?;
    SigningKey::from_pkcs8_pem(&pem).map_err(Error::DecodePrivateKey)
}

pub fn load_verifying_key(path: &Path) -> Result<VerifyingKey> {
    let pem = fs::read_to_string(path).map_err(|err| Error::ReadKeyFile(path.to_path_buf(), err))?;
    VerifyingKey::from_public_key_pem(&pem).map_err(Error::DecodePublicKey)
}

/// Signs `data` with `signing_key`, returning the base64 encoding of the
/// fixed-length 64-byte IEEE-P1363 (r||s) signature.
pub fn sign(signing_key: &SigningKey, data: &[u8]) -> Result<String> {
    let signature: Signature = signing_key.sign(data);
    Base64::encode_to_string(signature.to_bytes()).map_err(Error::InvalidBase64)
}

/// Verifies `signature_base64` (a P1363 r||s signature, or, as a
/// compatibility shim, a DER-encoded one) over `data` against
/// `verifying_key`. Never panics or returns an error on signature shape
/// mismatch — a malformed or forged signature simply verifies as `false`.
pub fn verify(verifying_key: &VerifyingKey, data: &[u8], signature_base64: &str) -> bool {
    let Ok(raw) = Base64::decode_to_vec(signature_base64, None) else {
        return false;
    };

    let signature = match Signature::try_from(raw.as_slice()) {
        Ok(sig) => sig,
        Err(_) => match Signature::from_der(&raw) {
            Ok(sig) => sig,
            Err(_) => return false,
        },
    };

    verifying_key.verify(data, &signature).is_ok()
}
