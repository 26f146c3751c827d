//! Composite fingerprint over CRC-32 / MD5 / SHA-1 / SHA-256 / size, with
//! partial-match comparison over whichever types two values have in common.

use std::fmt;

use crc32fast::Hasher as Crc32Hasher;
use md5::{Digest as Md5Digest, Md5};
use serde::{Deserialize, Serialize};
use sha1_smol::Sha1;
use sha2::Sha256;

/// A single hash algorithm (or the synthetic "size" type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashType {
    Crc32,
    Md5,
    Sha1,
    Sha256,
    Size,
}

impl HashType {
    pub const ALL: [HashType; 5] = [
        HashType::Crc32,
        HashType::Md5,
        HashType::Sha1,
        HashType::Sha256,
        HashType::Size,
    ];

    fn bit(self) -> u8 {
        match self {
            HashType::Crc32 => 1 << 0,
            HashType::Md5 => 1 << 1,
            HashType::Sha1 => 1 << 2,
            HashType::Sha256 => 1 << 3,
            HashType::Size => 1 << 4,
        }
    }
}

/// Result of comparing two hash values over their intersection of present types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Match,
    Mismatch,
    NoCommonTypes,
}

/// Distinguishes "no size recorded" from "size = 0".
pub const SIZE_UNKNOWN: u64 = u64::MAX;

/// Composite hash value: a bitset of present types plus their digests/size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashSet {
    mask: u8,
    pub crc32: Option<[u8; 4]>,
    pub md5: Option<[u8; 16]>,
    pub sha1: Option<[u8; 20]>,
    pub sha256: Option<[u8; 32]>,
    pub size: Option<u64>,
}

impl HashSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a digest from raw bytes (panics if `bytes.len()` doesn't match `ty`; `Size` is not
    /// settable through this path — use [`HashSet::set_size`]).
    pub fn set(&mut self, ty: HashType, bytes: &[u8]) {
        match ty {
            HashType::Crc32 => {
                let mut a = [0u8; 4];
                a.copy_from_slice(bytes);
                self.crc32 = Some(a);
            }
            HashType::Md5 => {
                let mut a = [0u8; 16];
                a.copy_from_slice(bytes);
                self.md5 = Some(a);
            }
            HashType::Sha1 => {
                let mut a = [0u8; 20];
                a.copy_from_slice(bytes);
                self.sha1 = Some(a);
            }
            HashType::Sha256 => {
                let mut a = [0u8; 32];
                a.copy_from_slice(bytes);
                self.sha256 = Some(a);
            }
            HashType::Size => panic!("use set_size for the Size type"),
        }
        self.mask |= ty.bit();
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = Some(size);
        self.mask |= HashType::Size.bit();
    }

    pub fn has(&self, ty: HashType) -> bool {
        self.mask & ty.bit() != 0
    }

    pub fn has_all(&self, other: &HashSet) -> bool {
        other.mask & !self.mask == 0
    }

    /// Build a hash set from a hex string of a known type, e.g. an 8-char CRC32.
    pub fn from_hex_string(ty: HashType, s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let mut h = HashSet::new();
        h.set(ty, &bytes);
        Some(h)
    }

    pub fn hex(&self, ty: HashType) -> Option<String> {
        match ty {
            HashType::Crc32 => self.crc32.map(hex::encode),
            HashType::Md5 => self.md5.map(hex::encode),
            HashType::Sha1 => self.sha1.map(hex::encode),
            HashType::Sha256 => self.sha256.map(hex::encode),
            HashType::Size => self.size.map(|s| s.to_string()),
        }
    }

    /// Compare two hash sets over the intersection of their present types.
    pub fn compare(&self, other: &HashSet) -> Comparison {
        let common = self.mask & other.mask;
        if common == 0 {
            return Comparison::NoCommonTypes;
        }
        for ty in HashType::ALL {
            if common & ty.bit() == 0 {
                continue;
            }
            let eq = match ty {
                HashType::Crc32 => self.crc32 == other.crc32,
                HashType::Md5 => self.md5 == other.md5,
                HashType::Sha1 => self.sha1 == other.sha1,
                HashType::Sha256 => self.sha256 == other.sha256,
                HashType::Size => self.size == other.size,
            };
            if !eq {
                return Comparison::Mismatch;
            }
        }
        Comparison::Match
    }
}

impl fmt::Display for HashSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(c) = self.hex(HashType::Crc32) {
            write!(f, "crc32={c} ")?;
        }
        if let Some(s) = self.size {
            write!(f, "size={s}")?;
        }
        Ok(())
    }
}

/// Union-of-requested streaming hash updater. Construct with the set of types a caller
/// needs, `update()` every chunk of the logical payload exactly once, then `finalize()`.
pub struct HashUpdater {
    crc32: Option<Crc32Hasher>,
    md5: Option<Md5>,
    sha1: Option<Sha1>,
    sha256: Option<Sha256>,
    bytes_seen: u64,
}

impl HashUpdater {
    pub fn new(wanted: &[HashType]) -> Self {
        let want = |t: HashType| wanted.contains(&t);
        Self {
            crc32: want(HashType::Crc32).then(Crc32Hasher::new),
            md5: want(HashType::Md5).then(Md5::new),
            sha1: want(HashType::Sha1).then(Sha1::new),
            sha256: want(HashType::Sha256).then(Sha256::new),
            bytes_seen: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.bytes_seen += data.len() as u64;
        if let Some(h) = self.crc32.as_mut() {
            h.update(data);
        }
        if let Some(h) = self.md5.as_mut() {
            h.update(data);
        }
        if let Some(h) = self.sha1.as_mut() {
            h.update(data);
        }
        if let Some(h) = self.sha256.as_mut() {
            h.update(data);
        }
    }

    pub fn finalize(self) -> HashSet {
        let mut h = HashSet::new();
        if let Some(c) = self.crc32 {
            h.set(HashType::Crc32, &c.finalize().to_be_bytes());
        }
        if let Some(m) = self.md5 {
            let digest = m.finalize();
            h.set(HashType::Md5, &digest);
        }
        if let Some(s) = self.sha1 {
            h.set(HashType::Sha1, &s.digest().bytes());
        }
        if let Some(s) = self.sha256 {
            h.set(HashType::Sha256, &s.finalize());
        }
        h.set_size(self.bytes_seen);
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_matches_on_common_types_only() {
        let mut a = HashSet::new();
        a.set(HashType::Crc32, &[1, 2, 3, 4]);
        a.set_size(10);

        let mut b = HashSet::new();
        b.set(HashType::Crc32, &[1, 2, 3, 4]);
        b.set(HashType::Md5, &[0u8; 16]);

        assert_eq!(a.compare(&b), Comparison::Match);
    }

    #[test]
    fn compare_mismatch_on_differing_common_type() {
        let mut a = HashSet::new();
        a.set(HashType::Crc32, &[1, 2, 3, 4]);
        let mut b = HashSet::new();
        b.set(HashType::Crc32, &[9, 9, 9, 9]);
        assert_eq!(a.compare(&b), Comparison::Mismatch);
    }

    #[test]
    fn compare_no_common_types_is_inconclusive() {
        let mut a = HashSet::new();
        a.set(HashType::Crc32, &[1, 2, 3, 4]);
        let mut b = HashSet::new();
        b.set(HashType::Md5, &[0u8; 16]);
        assert_eq!(a.compare(&b), Comparison::NoCommonTypes);
    }

    #[test]
    fn size_unknown_sentinel_differs_from_zero() {
        assert_ne!(SIZE_UNKNOWN, 0);
    }

    #[test]
    fn updater_streams_and_matches_whole_buffer_hash() {
        let data = b"hello world, this is a streamed payload";
        let mut updater = HashUpdater::new(&[HashType::Crc32, HashType::Sha1]);
        for chunk in data.chunks(7) {
            updater.update(chunk);
        }
        let streamed = updater.finalize();

        let mut whole = HashUpdater::new(&[HashType::Crc32, HashType::Sha1]);
        whole.update(data);
        let whole = whole.finalize();

        assert_eq!(streamed.crc32, whole.crc32);
        assert_eq!(streamed.sha1, whole.sha1);
        assert_eq!(streamed.size, Some(data.len() as u64));
    }

    #[test]
    fn from_hex_string_round_trips() {
        let h = HashSet::from_hex_string(HashType::Crc32, "01020304").unwrap();
        assert_eq!(h.hex(HashType::Crc32).unwrap(), "01020304");
    }
}
