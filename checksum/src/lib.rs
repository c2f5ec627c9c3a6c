/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Composite content fingerprint used to decide whether a preprocessor output has already
//! produced the object file currently on disk.

use std::fmt::{self, Display, Formatter};

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

/// A `(CRC-32, MD5)` pair identifying the contents of a buffer.
///
/// Two fingerprints are equal iff both components match; the CRC-32 catches the common case
/// cheaply; the MD5 component is kept alongside it rather than trusted alone, matching the
/// two-hash scheme of the system this crate backs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    crc32: u32,
    md5: [u8; 16],
}

impl Fingerprint {
    /// Computes the fingerprint of `buffer`.
    pub fn compute(buffer: &[u8]) -> Self {
        let crc32 = crc32fast::hash(buffer);
        let md5 = Md5::digest(buffer);
        Self {
            crc32,
            md5: md5.into(),
        }
    }

    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    pub fn md5(&self) -> [u8; 16] {
        self.md5
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}:", self.crc32)?;
        for byte in &self.md5 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// An ordered, deduplicating set of fingerprints accepted for one cache entry.
///
/// Modeled as a plain growable vector of values rather than the intrusive linked chain of the
/// original implementation; merging a fingerprint after a structural-compare hit is just a
/// push behind a membership check.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintSet {
    accepted: Vec<Fingerprint>,
}

impl FingerprintSet {
    pub fn new() -> Self {
        Self {
            accepted: Vec::new(),
        }
    }

    pub fn singleton(fingerprint: Fingerprint) -> Self {
        Self {
            accepted: vec![fingerprint],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.accepted.contains(fingerprint)
    }

    /// Inserts `fingerprint` if not already a member. Returns whether it was newly inserted.
    pub fn insert(&mut self, fingerprint: Fingerprint) -> bool {
        if self.contains(&fingerprint) {
            return false;
        }
        self.accepted.push(fingerprint);
        true
    }

    pub fn reset_to(&mut self, fingerprint: Fingerprint) {
        self.accepted.clear();
        self.accepted.push(fingerprint);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fingerprint> {
        self.accepted.iter()
    }

    pub fn len(&self) -> usize {
        self.accepted.len()
    }
}
