use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::error::Error;

pub const MAGIC: &[u8; 8] = b"BSDIFF40";
pub const HEADER_LEN: usize = 32;

/// The 32-byte bsdiff-1 header: magic, then the compressed length of the
/// control block, the compressed length of the diff block, and the length
/// of the reconstructed `new` file, each a little-endian signed 64-bit
/// integer.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub control_len: i64,
    pub diff_len: i64,
    pub new_len: i64,
}

impl Header {
    pub fn write<W: Write>(&self, w: &mut W) -> Result<(), Error> {
        w.write_all(MAGIC)?;
        w.write_i64::<LittleEndian>(self.control_len)?;
        w.write_i64::<LittleEndian>(self.diff_len)?;
        w.write_i64::<LittleEndian>(self.new_len)?;
        Ok(())
    }

    pub fn read<R: Read>(r: &mut R) -> Result<Self, Error> {
        let mut magic = [0u8; 8];
        r.read_exact(&mut magic).map_err(|_| Error::Truncated("header magic"))?;
        if &magic != MAGIC {
            return Err(Error::BadMagic(magic));
        }

        let control_len = r.read_i64::<LittleEndian>().map_err(|_| Error::Truncated("control block length"))?;
        let diff_len = r.read_i64::<LittleEndian>().map_err(|_| Error::Truncated("diff block length"))?;
        let new_len = r.read_i64::<LittleEndian>().map_err(|_| Error::Truncated("new file length"))?;

        if control_len < 0 {
            return Err(Error::NegativeLength { field: "control_len", value: control_len });
        }
        if diff_len < 0 {
            return Err(Error::NegativeLength { field: "diff_len", value: diff_len });
        }
        if new_len < 0 {
            return Err(Error::NegativeLength { field: "new_len", value: new_len });
        }

        Ok(Self { control_len, diff_len, new_len })
    }
}

/// Encodes a control-triple integer in bsdiff's sign-magnitude form: bit 63
/// is the sign, the low 63 bits are the magnitude.
pub fn write_offset<W: Write>(w: &mut W, value: i64) -> Result<(), Error> {
    let magnitude = value.unsigned_abs();
    let mut encoded = magnitude;
    if value < 0 {
        encoded |= 1u64 << 63;
    }
    w.write_u64::<LittleEndian>(encoded)?;
    Ok(())
}

pub fn read_offset<R: Read>(r: &mut R) -> Result<i64, Error> {
    let encoded = r.read_u64::<LittleEndian>().map_err(|_| Error::Truncated("control triple"))?;
    let magnitude = (encoded & !(1u64 << 63)) as i64;
    if encoded & (1u64 << 63) != 0 {
        Ok(-magnitude)
    } else {
        Ok(magnitude)
    }
}
