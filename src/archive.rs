//! ZIP package I/O (meta.json + diffs/ + add/) and a deterministic TAR
//! writer/reader for full-install recovery archives.

use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use zip::write::FileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::Error;

pub const META_ENTRY: &str = "meta.json";
pub const DIFFS_DIR: &str = "diffs";
pub const ADD_DIR: &str = "add";

pub struct PackageWriter {
    zip: ZipWriter<File>,
}

impl PackageWriter {
    pub fn create(path: &Path) -> Result<Self, Error> {
        let file = File::create(path).map_err(|err| Error::Io(path.to_path_buf(), err))?;
        Ok(Self { zip: ZipWriter::new(file) })
    }

    pub fn write_meta(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.write_entry(META_ENTRY, bytes)
    }

    pub fn write_diff(&mut self, mangled_name: &str, bytes: &[u8]) -> Result<(), Error> {
        self.write_entry(&format!("{DIFFS_DIR}/{mangled_name}"), bytes)
    }

    pub fn write_add(&mut self, mangled_name: &str, bytes: &[u8]) -> Result<(), Error> {
        self.write_entry(&format!("{ADD_DIR}/{mangled_name}"), bytes)
    }

    fn write_entry(&mut self, name: &str, bytes: &[u8]) -> Result<(), Error> {
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        self.zip.start_file(name, options)?;
        self.zip.write_all(bytes).map_err(|err| Error::Io(Path::new(name).to_path_buf(), err))?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<(), Error> {
        self.zip.finish()?;
        Ok(())
    }
}

pub struct PackageReader {
    archive: ZipArchive<File>,
}

impl PackageReader {
    pub fn open(path: &Path) -> Result<Self, Error> {
        let file = File::open(path).map_err(|err| Error::Io(path.to_path_buf(), err))?;
        let archive = ZipArchive::new(file)?;
        Ok(Self { archive })
    }

    pub fn read_meta(&mut self) -> Result<Vec<u8>, Error> {
        self.read_entry(META_ENTRY)
    }

    pub fn read_diff(&mut self, mangled_name: &str) -> Result<Vec<u8>, Error> {
        self.read_entry(&format!("{DIFFS_DIR}/{mangled_name}"))
    }

    pub fn read_add(&mut self, mangled_name: &str) -> Result<Vec<u8>, Error> {
        self.read_entry(&format!("{ADD_DIR}/{mangled_name}"))
    }

    fn read_entry(&mut self, name: &str) -> Result<Vec<u8>, Error> {
        let mut entry = self.archive.by_name(name).map_err(|_| Error::PackageCorrupt(format!("missing package entry {name}")))?;
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf).map_err(|err| Error::Io(Path::new(name).to_path_buf(), err))?;
        Ok(buf)
    }
}

/// Escapes a forward-slash-relative path into a flat package-internal
/// entry name by replacing separators with `_`.
pub fn mangle_path(path: &str) -> String {
    path.replace('/', "_")
}

/// Writes every regular file under `dir` into a TAR stream, sorted
/// lexicographically by relative path so two invocations over identical
/// trees produce byte-identical archives.
pub fn write_full_archive<W: Write>(dir: &Path, writer: W) -> Result<(), Error> {
    let mut builder = tar::Builder::new(writer);

    let mut entries: Vec<_> =
        walkdir::WalkDir::new(dir).into_iter().filter_map(Result::ok).filter(|e| e.file_type().is_file()).collect();
    entries.sort_by(|a, b| a.path().cmp(b.path()));

    for entry in entries {
        let relative = entry.path().strip_prefix(dir).expect("walkdir entries are always under the root");
        builder.append_path_with_name(entry.path(), relative).map_err(|err| Error::Io(entry.path().to_path_buf(), err))?;
    }

    builder.finish().map_err(|err| Error::Io(dir.to_path_buf(), err))?;
    Ok(())
}

/// Extracts a TAR stream (as produced by [`write_full_archive`]) into
/// `target_dir`, creating parent directories as needed.
pub fn extract_full_archive(bytes: &[u8], target_dir: &Path) -> Result<(), Error> {
    let mut archive = tar::Archive::new(Cursor::new(bytes));
    archive.unpack(target_dir).map_err(|err| Error::Io(target_dir.to_path_buf(), err))?;
    Ok(())
}
