//! Patch creation: the classic Colin Percival bsdiff scan (suffix-array
//! longest match, then forward/backward mismatch-tolerant extension with
//! overlap resolution) emitting the three control/diff/extra streams.

use std::io::Write;

use bzip2::write::BzEncoder;
use bzip2::Compression;

use super::error::Error;
use super::header::{self, Header};
use super::sufarray;

fn old_at(old: &[u8], idx: i64) -> Option<u8> {
    if idx >= 0 && (idx as usize) < old.len() {
        Some(old[idx as usize])
    } else {
        None
    }
}

struct Control {
    copy_len: i64,
    extra_len: i64,
    seek: i64,
}

fn scan(old: &[u8], new: &[u8]) -> (Vec<Control>, Vec<u8>, Vec<u8>) {
    let sa = sufarray::build(old);
    let oldsize = old.len() as i64;
    let newsize = new.len() as i64;

    let mut controls = Vec::new();
    let mut diff_bytes = Vec::new();
    let mut extra_bytes = Vec::new();

    let mut scan: i64 = 0;
    let mut pos: i64 = 0;
    let mut len: i64 = 0;
    let mut lastscan: i64 = 0;
    let mut lastpos: i64 = 0;
    let mut lastoffset: i64 = 0;

    while scan < newsize {
        let mut oldscore: i64 = 0;
        scan += len;
        let mut scsc = scan;

        while scan < newsize {
            let (match_pos, match_len) = sufarray::longest_match(&sa, old, &new[scan as usize..]);
            pos = match_pos as i64;
            len = match_len as i64;

            while scsc < scan + len {
                if old_at(old, scsc + lastoffset) == Some(new[scsc as usize]) {
                    oldscore += 1;
                }
                scsc += 1;
            }

            if (len == oldscore && len != 0) || len > oldscore + 8 {
                break;
            }

            if old_at(old, scan + lastoffset) == Some(new[scan as usize]) {
                oldscore -= 1;
            }
            scan += 1;
        }

        if len != oldscore || scan == newsize {
            let mut s: i64 = 0;
            let mut sf: i64 = 0;
            let mut lenf: i64 = 0;
            let mut i: i64 = 0;
            while lastscan + i < scan && lastpos + i < oldsize {
                if old[(lastpos + i) as usize] == new[(lastscan + i) as usize] {
                    s += 1;
                }
                i += 1;
                if s * 2 - i > sf * 2 - lenf {
                    sf = s;
                    lenf = i;
                }
            }

            let mut lenb: i64 = 0;
            if scan < newsize {
                let mut s: i64 = 0;
                let mut sb: i64 = 0;
                let mut i: i64 = 1;
                while scan >= lastscan + i && pos >= i {
                    if old[(pos - i) as usize] == new[(scan - i) as usize] {
                        s += 1;
                    }
                    if s * 2 - i > sb * 2 - lenb {
                        sb = s;
                        lenb = i;
                    }
                    i += 1;
                }
            }

            if lastscan + lenf > scan - lenb {
                let overlap = (lastscan + lenf) - (scan - lenb);
                let mut s: i64 = 0;
                let mut ss: i64 = 0;
                let mut lens: i64 = 0;
                for i in 0..overlap {
                    if new[(lastscan + lenf - overlap + i) as usize] == old[(lastpos + lenf - overlap + i) as usize] {
                        s += 1;
                    }
                    if new[(scan - lenb + i) as usize] == old[(pos - lenb + i) as usize] {
                        s -= 1;
                    }
                    if s > ss {
                        ss = s;
                        lens = i + 1;
                    }
                }
                lenf += lens - overlap;
                lenb -= lens;
            }

            for i in 0..lenf {
                diff_bytes.push(new[(lastscan + i) as usize].wrapping_sub(old[(lastpos + i) as usize]));
            }
            let extra_len = (scan - lenb) - (lastscan + lenf);
            for i in 0..extra_len {
                extra_bytes.push(new[(lastscan + lenf + i) as usize]);
            }

            controls.push(Control { copy_len: lenf, extra_len, seek: (pos - lenb) - (lastpos + lenf) });

            lastscan = scan - lenb;
            lastpos = pos - lenb;
            lastoffset = pos - scan;
        }
    }

    (controls, diff_bytes, extra_bytes)
}

fn bzip2_compress(data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut encoder = BzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    encoder.finish().map_err(Error::from)
}

/// Produces a complete bsdiff-1 patch transforming `old` into `new`.
pub fn create_patch(old: &[u8], new: &[u8]) -> Result<Vec<u8>, Error> {
    let (controls, diff_bytes, extra_bytes) = scan(old, new);

    let mut control_plain = Vec::new();
    for c in &controls {
        header::write_offset(&mut control_plain, c.copy_len)?;
        header::write_offset(&mut control_plain, c.extra_len)?;
        header::write_offset(&mut control_plain, c.seek)?;
    }

    let control_compressed = bzip2_compress(&control_plain)?;
    let diff_compressed = bzip2_compress(&diff_bytes)?;
    let extra_compressed = bzip2_compress(&extra_bytes)?;

    let header = Header {
        control_len: control_compressed.len() as i64,
        diff_len: diff_compressed.len() as i64,
        new_len: new.len() as i64,
    };

    let mut out = Vec::with_capacity(header::HEADER_LEN + control_compressed.len() + diff_compressed.len() + extra_compressed.len());
    header.write(&mut out)?;
    out.extend_from_slice(&control_compressed);
    out.extend_from_slice(&diff_compressed);
    out.extend_from_slice(&extra_compressed);

    Ok(out)
}
