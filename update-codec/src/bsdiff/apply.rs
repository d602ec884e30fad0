//! Patch application: replays the control stream against `old`, adding the
//! diff bytes modulo 256 and splicing in the extra bytes verbatim.

use std::io::Read;

use bzip2::read::BzDecoder;

use super::error::Error;
use super::header::{self, Header};

/// Applies `patch` (a complete bsdiff-1 patch, as produced by
/// [`super::create::create_patch`]) to `old`, returning the reconstructed
/// `new` bytes. Every control triple is bounds-checked against both the
/// remaining output budget and the extent of `old` before use; a
/// corrupted or adversarial patch is rejected rather than causing an
/// out-of-bounds read.
pub fn apply_patch(old: &[u8], patch: &[u8]) -> Result<Vec<u8>, Error> {
    let mut cursor = std::io::Cursor::new(patch);
    let header = Header::read(&mut cursor)?;

    let control_start = header::HEADER_LEN;
    let diff_start = control_start + header.control_len as usize;
    let extra_start = diff_start + header.diff_len as usize;

    let control_bytes = patch.get(control_start..diff_start).ok_or(Error::Truncated("control block"))?;
    let diff_block = patch.get(diff_start..extra_start).ok_or(Error::Truncated("diff block"))?;
    let extra_block = patch.get(extra_start..).ok_or(Error::Truncated("extra block"))?;

    let mut control_reader = BzDecoder::new(control_bytes);
    let mut diff_reader = BzDecoder::new(diff_block);
    let mut extra_reader = BzDecoder::new(extra_block);

    let mut control_plain = Vec::new();
    control_reader.read_to_end(&mut control_plain)?;
    let mut control_cursor = std::io::Cursor::new(control_plain);

    let new_len = header.new_len as usize;
    let mut out = Vec::with_capacity(new_len);
    let mut old_cursor: i64 = 0;

    while out.len() < new_len {
        let copy_len = header::read_offset(&mut control_cursor)?;
        let extra_len = header::read_offset(&mut control_cursor)?;
        let seek = header::read_offset(&mut control_cursor)?;

        if copy_len < 0 {
            return Err(Error::NegativeLength { field: "copy_len", value: copy_len });
        }
        if extra_len < 0 {
            return Err(Error::NegativeLength { field: "extra_len", value: extra_len });
        }

        let remaining = (new_len - out.len()) as i64;
        if copy_len + extra_len > remaining {
            return Err(Error::ControlExceedsOutput { add: extra_len, copy: copy_len, remaining });
        }

        if old_cursor < 0 || old_cursor + copy_len > old.len() as i64 {
            return Err(Error::OldCursorOutOfRange { cursor: old_cursor, old_len: old.len() });
        }

        let mut diff_chunk = vec![0u8; copy_len as usize];
        diff_reader.read_exact(&mut diff_chunk)?;
        for (i, byte) in diff_chunk.into_iter().enumerate() {
            let old_byte = old[(old_cursor as usize) + i];
            out.push(byte.wrapping_add(old_byte));
        }

        let mut extra_chunk = vec![0u8; extra_len as usize];
        extra_reader.read_exact(&mut extra_chunk)?;
        out.extend_from_slice(&extra_chunk);

        old_cursor += copy_len;
        old_cursor += seek;
    }

    if out.len() != new_len {
        return Err(Error::OutputSizeMismatch { expected: header.new_len, actual: out.len() });
    }

    Ok(out)
}
