//! Zip archive backend. Reads go straight through `zip::read::ZipArchive`
//! (as in `archives.rs::scan_zip_entries`); writes rebuild the archive into a
//! temp file and rename it over the original, which is the container's
//! atomic-replace primitive (§4.3: "the ZIP backend uses the underlying
//! container's atomic-replace semantics").

use std::fs::File as StdFile;
use std::io::{Read, Write};
use std::path::Path;

use zip::read::ZipArchive;
use zip::write::{FileOptions, ZipWriter};

use crate::error::{Error, Result};

pub fn list_entries(path: &Path) -> Result<Vec<(String, u64)>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let f = StdFile::open(path).map_err(|e| Error::io(path, e))?;
    let mut zip = ZipArchive::new(f).map_err(|e| Error::format(path, e.to_string()))?;
    let mut out = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let entry = zip
            .by_index(i)
            .map_err(|e| Error::format(path, e.to_string()))?;
        if entry.is_file() {
            out.push((entry.name().to_string(), entry.size()));
        }
    }
    Ok(out)
}

pub fn read_member(path: &Path, name: &str) -> Result<Vec<u8>> {
    let f = StdFile::open(path).map_err(|e| Error::io(path, e))?;
    let mut zip = ZipArchive::new(f).map_err(|e| Error::format(path, e.to_string()))?;
    let mut entry = zip
        .by_name(name)
        .map_err(|e| Error::format(path, e.to_string()))?;
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut buf)
        .map_err(|e| Error::io(path, e))?;
    Ok(buf)
}

pub struct PendingWrite {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Rebuilds the archive from `surviving` (existing members to keep, read from
/// the original file) plus `writes` (new/replaced members), then atomically
/// replaces `path`. An archive with no members at all is removed instead
/// unless `keep_empty` is set.
pub fn commit(
    path: &Path,
    surviving: &[String],
    writes: &[PendingWrite],
    keep_empty: bool,
) -> Result<()> {
    if surviving.is_empty() && writes.is_empty() {
        if !keep_empty && path.exists() {
            std::fs::remove_file(path).map_err(|e| Error::io(path, e))?;
        }
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let temp_path = path.with_extension("ckmame-tmp");
    {
        let out = StdFile::create(&temp_path).map_err(|e| Error::io(&temp_path, e))?;
        let mut writer = ZipWriter::new(out);
        let options: FileOptions<'_, ()> =
            FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for name in surviving {
            let bytes = read_member(path, name)?;
            writer
                .start_file(name, options)
                .map_err(|e| Error::format(&temp_path, e.to_string()))?;
            writer
                .write_all(&bytes)
                .map_err(|e| Error::io(&temp_path, e))?;
        }
        for write in writes {
            writer
                .start_file(&write.name, options)
                .map_err(|e| Error::format(&temp_path, e.to_string()))?;
            writer
                .write_all(&write.bytes)
                .map_err(|e| Error::io(&temp_path, e))?;
        }
        writer
            .finish()
            .map_err(|e| Error::format(&temp_path, e.to_string()))?;
    }

    std::fs::rename(&temp_path, path).map_err(|e| Error::io(path, e))?;
    Ok(())
}
