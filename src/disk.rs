//! Disk image probing: single-file blobs (CHD-like) that live outside any
//! archive container (§4.9 Step E). Generalized from the teacher's
//! `roms::chd::parse_chd_header` magic-sniffing reader into a plain
//! size-plus-hash probe, because parsing the container format itself (CHD's
//! own header/compression scheme) is out of scope here — only identity
//! (size, hash) matters to the matcher and fixer.

use std::fs::File as StdFile;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};
use crate::hashes::{HashSet, HashType, HashUpdater};

const PROBE_CHUNK: usize = 512 * 1024;

/// A probed disk image: its path, size, and requested hashes, computed
/// without any container-format parsing.
#[derive(Debug, Clone)]
pub struct DiskProbe {
    pub path: std::path::PathBuf,
    pub size: u64,
    pub hashes: HashSet,
}

/// Streams the file at `path`, computing the requested hash types over its
/// whole contents (a disk image has no header/trailer to trim, unlike an
/// archive member run through [`crate::detector::Detector`]).
pub fn probe(path: &Path, wanted: &[HashType]) -> Result<DiskProbe> {
    let mut file = StdFile::open(path).map_err(|e| Error::io(path, e))?;
    let mut updater = HashUpdater::new(wanted);
    let mut buf = vec![0u8; PROBE_CHUNK];
    loop {
        let n = file.read(&mut buf).map_err(|e| Error::io(path, e))?;
        if n == 0 {
            break;
        }
        updater.update(&buf[..n]);
    }
    let hashes = updater.finalize();
    let size = hashes.size.unwrap_or(0);
    Ok(DiskProbe {
        path: path.to_path_buf(),
        size,
        hashes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_computes_size_and_requested_hashes() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        use std::io::Write;
        f.write_all(b"disk image payload bytes").unwrap();

        let probed = probe(f.path(), &[HashType::Crc32, HashType::Sha1]).unwrap();
        assert_eq!(probed.size, 24);
        assert!(probed.hashes.has(HashType::Crc32));
        assert!(probed.hashes.has(HashType::Sha1));
    }

    #[test]
    fn probe_missing_file_is_io_error() {
        let err = probe(Path::new("/no/such/disk.chd"), &[HashType::Crc32]).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
