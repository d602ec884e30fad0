use std::fmt;
use std::str;

use ct_codecs::{Base64, Decoder, Encoder, Error as CodecError, Hex};

#[derive(PartialEq, Eq, Clone)]
pub struct Sha256;

pub trait HashAlgo {
    const HASH_NAME: &'static str;

    type Output: AsRef<[u8]> + AsMut<[u8]> + Default + Sized + Eq;
}

impl HashAlgo for Sha256 {
    const HASH_NAME: &'static str = "Sha256";
    type Output = [u8; 32];
}

/// A digest produced by `T`, rendered as lowercase hex wherever it is
/// displayed or embedded in a manifest.
#[derive(PartialEq, Eq, Clone)]
pub struct Hash<T: HashAlgo>(T::Output);

impl<T: HashAlgo> Hash<T> {
    pub fn from_bytes(digest: T::Output) -> Self {
        Self(digest)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    pub fn to_hex(&self) -> String {
        // Hex::encode_to_string only fails on an encoder bug, never on input length.
        Hex::encode_to_string(self.0.as_ref()).expect("hex encoding of a fixed-size digest cannot fail")
    }
}

impl<T: HashAlgo> fmt::Debug for Hash<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple(&format!("Hash<{}>", T::HASH_NAME)).field(&self.to_hex()).finish()
    }
}

impl<T: HashAlgo> fmt::Display for Hash<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl<T: HashAlgo> str::FromStr for Hash<T> {
    type Err = CodecError;

    fn from_str(hash_hex: &str) -> Result<Self, Self::Err> {
        Self::from_hex(hash_hex)
    }
}

impl<T: HashAlgo> Hash<T> {
    #[inline]
    fn decode<D: Decoder>(hash: &str) -> Result<Self, CodecError> {
        let mut digest = T::Output::default();
        D::decode(digest.as_mut(), hash, None)?;
        Ok(Self(digest))
    }

    pub fn from_base64(hash_base64: &str) -> Result<Self, CodecError> {
        Self::decode::<Base64>(hash_base64)
    }

    pub fn from_hex(hash_hex: &str) -> Result<Self, CodecError> {
        // Comparisons are case-insensitive, but storage is always lowercase;
        // normalise before decoding so "AB..." and "ab..." both parse.
        Self::decode::<Hex>(&hash_hex.to_ascii_lowercase())
    }
}
