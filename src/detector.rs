//! Header detector (§4.4): an ordered rule list producing a logical
//! offset/length window (plus transform) for a physical file, so hashes are
//! computed over the detected payload rather than raw bytes. Modeled per
//! Design Notes §9 as a pure function from a small `FileProbe` to an
//! `Option<Window>`, rather than the original's procedural walk over a
//! shared buffer (`original_source/src/detector_parse_ps.cc`).

use serde::{Deserialize, Serialize};

use crate::hashes::HashUpdater;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    None,
    Bitswap,
    Byteswap,
    Wordswap,
}

impl Operation {
    fn apply(self, data: &mut [u8]) {
        match self {
            Operation::None => {}
            Operation::Bitswap => {
                for b in data.iter_mut() {
                    *b = b.reverse_bits();
                }
            }
            Operation::Byteswap => {
                for pair in data.chunks_exact_mut(2) {
                    pair.swap(0, 1);
                }
            }
            Operation::Wordswap => {
                for quad in data.chunks_exact_mut(4) {
                    quad.swap(0, 2);
                    quad.swap(1, 3);
                }
            }
        }
    }
}

/// An absolute offset, or "relative to EOF" as the spec's tests use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Offset {
    Absolute(u64),
    FromEnd(u64),
    EndOfFile,
}

impl Offset {
    fn resolve(self, size: u64) -> u64 {
        match self {
            Offset::Absolute(o) => o,
            Offset::FromEnd(back) => size.saturating_sub(back),
            Offset::EndOfFile => size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizeCmp {
    Eq,
    Lt,
    Gt,
    PowerOfTwo,
}

/// The boolean operator a `Test::Mask` applies between each data byte and its
/// corresponding mask byte before comparing to `value` (§4.4 and/or/xor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskOp {
    And,
    Or,
    Xor,
}

impl MaskOp {
    fn apply(self, byte: u8, mask: u8) -> u8 {
        match self {
            MaskOp::And => byte & mask,
            MaskOp::Or => byte | mask,
            MaskOp::Xor => byte ^ mask,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Test {
    FileSize { cmp: SizeCmp, value: u64 },
    Data { offset: Offset, value: Vec<u8>, expect: bool },
    Mask { offset: Offset, mask: Option<Vec<u8>>, op: MaskOp, value: Vec<u8>, expect: bool },
}

/// A small read-only view of the physical file a rule evaluates against.
/// Keeps the detector decoupled from any particular archive backend.
pub struct FileProbe<'a> {
    pub size: u64,
    bytes: &'a [u8],
}

impl<'a> FileProbe<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        FileProbe {
            size: bytes.len() as u64,
            bytes,
        }
    }

    fn read_at(&self, offset: u64, len: usize) -> Option<&[u8]> {
        let start = offset as usize;
        let end = start.checked_add(len)?;
        self.bytes.get(start..end)
    }
}

impl Test {
    fn eval(&self, probe: &FileProbe) -> bool {
        match self {
            Test::FileSize { cmp, value } => match cmp {
                SizeCmp::Eq => probe.size == *value,
                SizeCmp::Lt => probe.size < *value,
                SizeCmp::Gt => probe.size > *value,
                SizeCmp::PowerOfTwo => probe.size > 0 && probe.size & (probe.size - 1) == 0,
            },
            Test::Data { offset, value, expect } => {
                let off = offset.resolve(probe.size);
                let matched = probe
                    .read_at(off, value.len())
                    .map(|got| got == value.as_slice())
                    .unwrap_or(false);
                matched == *expect
            }
            Test::Mask { offset, mask, op, value, expect } => {
                let off = offset.resolve(probe.size);
                let matched = match probe.read_at(off, value.len()) {
                    Some(got) => match mask {
                        Some(m) => got
                            .iter()
                            .zip(m.iter())
                            .map(|(b, mbit)| op.apply(*b, *mbit))
                            .eq(value.iter().copied()),
                        None => got == value.as_slice(),
                    },
                    None => false,
                };
                matched == *expect
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub start_offset: Offset,
    pub end_offset: Offset,
    pub operation: Operation,
    pub tests: Vec<Test>,
}

impl Rule {
    fn matches(&self, probe: &FileProbe) -> bool {
        self.tests.iter().all(|t| t.eval(probe))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Detector {
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Copy)]
pub struct Window {
    pub start: u64,
    pub end: u64,
    pub operation: Operation,
}

impl Detector {
    pub fn new(rules: Vec<Rule>) -> Self {
        Detector { rules }
    }

    /// The first rule whose tests all succeed defines the window; if none
    /// match, there is no detected window (caller should fall back to raw
    /// hashes).
    pub fn detect(&self, probe: &FileProbe) -> Option<Window> {
        self.rules.iter().find(|r| r.matches(probe)).map(|r| Window {
            start: r.start_offset.resolve(probe.size),
            end: r.end_offset.resolve(probe.size),
            operation: r.operation,
        })
    }

    /// Computes hashes over the detected window (or the whole file if no rule
    /// matches), applying the window's transform before feeding the updater.
    pub fn hash_detected(&self, bytes: &[u8], wanted: &[crate::hashes::HashType]) -> crate::hashes::HashSet {
        let probe = FileProbe::new(bytes);
        let mut updater = HashUpdater::new(wanted);
        match self.detect(&probe) {
            Some(window) => {
                let start = window.start.min(bytes.len() as u64) as usize;
                let end = window.end.min(bytes.len() as u64) as usize;
                let mut slice = bytes.get(start..end.max(start)).unwrap_or(&[]).to_vec();
                window.operation.apply(&mut slice);
                updater.update(&slice);
            }
            None => updater.update(bytes),
        }
        updater.finalize()
    }

    /// A content-hash for the detector's own serialized rule set, so two DAT
    /// files sharing the same detector share a cache namespace (§4.4).
    pub fn content_hash(&self) -> String {
        let mut updater = HashUpdater::new(&[crate::hashes::HashType::Sha1]);
        for rule in &self.rules {
            updater.update(format!("{rule:?}").as_bytes());
        }
        updater
            .finalize()
            .hex(crate::hashes::HashType::Sha1)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashes::HashType;

    #[test]
    fn no_rule_matches_falls_back_to_raw_hash() {
        let detector = Detector::new(vec![]);
        let data = b"raw payload";
        let with_detector = detector.hash_detected(data, &[HashType::Crc32]);

        let mut plain = HashUpdater::new(&[HashType::Crc32]);
        plain.update(data);
        let plain = plain.finalize();

        assert_eq!(with_detector.crc32, plain.crc32);
    }

    #[test]
    fn matching_rule_trims_header_before_hashing() {
        let rule = Rule {
            start_offset: Offset::Absolute(16),
            end_offset: Offset::EndOfFile,
            operation: Operation::None,
            tests: vec![Test::FileSize {
                cmp: SizeCmp::Gt,
                value: 16,
            }],
        };
        let detector = Detector::new(vec![rule]);

        let mut data = vec![0xAAu8; 16];
        data.extend_from_slice(b"payload");
        let detected = detector.hash_detected(&data, &[HashType::Crc32]);

        let mut plain = HashUpdater::new(&[HashType::Crc32]);
        plain.update(b"payload");
        let plain = plain.finalize();

        assert_eq!(detected.crc32, plain.crc32);
    }

    #[test]
    fn data_test_reads_relative_to_eof() {
        let data = b"0123456789";
        let test = Test::Data {
            offset: Offset::FromEnd(3),
            value: b"789".to_vec(),
            expect: true,
        };
        let probe = FileProbe::new(data);
        assert!(test.eval(&probe));
    }

    #[test]
    fn mask_test_and_matches_on_common_bits_only() {
        let data = [0b1111_0000u8];
        let test = Test::Mask {
            offset: Offset::Absolute(0),
            mask: Some(vec![0b0000_1111]),
            op: MaskOp::And,
            value: vec![0b0000_0000],
            expect: true,
        };
        let probe = FileProbe::new(&data);
        assert!(test.eval(&probe));
    }

    #[test]
    fn mask_test_or_sets_masked_bits() {
        let data = [0b0000_0001u8];
        let test = Test::Mask {
            offset: Offset::Absolute(0),
            mask: Some(vec![0b1111_0000]),
            op: MaskOp::Or,
            value: vec![0b1111_0001],
            expect: true,
        };
        let probe = FileProbe::new(&data);
        assert!(test.eval(&probe));
    }

    #[test]
    fn mask_test_xor_flips_masked_bits() {
        let data = [0b1010_1010u8];
        let test = Test::Mask {
            offset: Offset::Absolute(0),
            mask: Some(vec![0b1111_1111]),
            op: MaskOp::Xor,
            value: vec![0b0101_0101],
            expect: true,
        };
        let probe = FileProbe::new(&data);
        assert!(test.eval(&probe));
    }

    #[test]
    fn first_matching_rule_wins() {
        let never = Rule {
            start_offset: Offset::Absolute(0),
            end_offset: Offset::EndOfFile,
            operation: Operation::None,
            tests: vec![Test::FileSize {
                cmp: SizeCmp::Lt,
                value: 0,
            }],
        };
        let always = Rule {
            start_offset: Offset::Absolute(4),
            end_offset: Offset::EndOfFile,
            operation: Operation::None,
            tests: vec![],
        };
        let detector = Detector::new(vec![never, always]);
        let probe = FileProbe::new(b"12345678");
        let window = detector.detect(&probe).unwrap();
        assert_eq!(window.start, 4);
    }
}
