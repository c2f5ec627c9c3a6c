/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use anyhow::Context;
use checksum::FingerprintSet;
use serde::{Deserialize, Serialize};

use crate::fileio;
use crate::path::{AbsolutePath, CacheRelativePath};

/// Bumped whenever [`OnDiskForm`]'s shape changes. A mismatch is treated exactly like "never
/// populated" (full rebuild), per the format-stability note in the spec.
const MAGIC: u32 = 0x6b4f_6263; // "kObc"
const FORMAT_VERSION: u32 = 1;

/// The persisted content of a populated cache entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OnDiskForm {
    magic: u32,
    version: u32,
    pub object_path: CacheRelativePath,
    pub compile_argv: Vec<String>,
    pub preprocessor_output_path: CacheRelativePath,
    pub accepted_fingerprints: FingerprintSet,
}

impl OnDiskForm {
    pub fn new(
        object_path: CacheRelativePath,
        compile_argv: Vec<String>,
        preprocessor_output_path: CacheRelativePath,
        accepted_fingerprints: FingerprintSet,
    ) -> Self {
        Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
            object_path,
            compile_argv,
            preprocessor_output_path,
            accepted_fingerprints,
        }
    }

    fn is_current_format(&self) -> bool {
        self.magic == MAGIC && self.version == FORMAT_VERSION
    }
}

/// In-memory state of one cache entry: its identity (directory + file name) and, if it has
/// ever been written, its persisted contents.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub cache_dir: AbsolutePath,
    pub cache_file_name: String,
    pub populated: Option<OnDiskForm>,
}

impl CacheEntry {
    /// Creates the in-memory entry for `cache_file`, split into the directory it lives in and
    /// its leaf name; all other paths on the entry resolve against that directory.
    pub fn new_unloaded(cache_file: &AbsolutePath) -> Self {
        let cache_dir = AbsolutePath::new(
            cache_file
                .as_ref()
                .parent()
                .unwrap_or_else(|| std::path::Path::new(".")),
        );
        Self {
            cache_dir,
            cache_file_name: cache_file.leaf().to_owned(),
            populated: None,
        }
    }

    fn cache_file_path(&self) -> AbsolutePath {
        self.cache_dir.join(&self.cache_file_name)
    }

    /// Loads the entry from disk if the cache file exists and is readable as the current
    /// on-disk format; otherwise leaves the entry unpopulated (a cache miss, not an error).
    pub fn load(cache_file: &AbsolutePath) -> anyhow::Result<Self> {
        let mut entry = Self::new_unloaded(cache_file);
        let path = entry.cache_file_path();
        if !fileio::exists_as_regular_file(&path) {
            return Ok(entry);
        }
        let raw = fileio::open_read_whole(&path)?;
        match bincode::deserialize::<OnDiskForm>(&raw) {
            Ok(form) if form.is_current_format() => {
                entry.populated = Some(form);
            }
            _ => {
                // Unparseable or stale format: treated as "never populated", not a fatal error.
            }
        }
        Ok(entry)
    }

    /// Serializes the entry atomically: write to a temporary file, then rename over the cache
    /// file, so a reader never observes a half-written entry.
    pub fn write(&self) -> anyhow::Result<()> {
        let form = self
            .populated
            .as_ref()
            .context("cannot persist a cache entry with no populated state")?;
        let bytes = bincode::serialize(form).context("failed to encode cache entry")?;
        fileio::write_atomic(&self.cache_file_path(), &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checksum::Fingerprint;

    fn sample_form() -> OnDiskForm {
        OnDiskForm::new(
            CacheRelativePath::new("out/a.o"),
            vec!["cc".into(), "-c".into(), "a.i".into()],
            CacheRelativePath::new("out/a.i"),
            FingerprintSet::singleton(Fingerprint::compute(b"A")),
        )
    }

    #[test]
    fn missing_cache_file_loads_as_unpopulated() {
        let dir = tempfile::tempdir().unwrap();
        let cache_file = AbsolutePath::new(&dir.path().join("entry.kobj"));
        let entry = CacheEntry::load(&cache_file).unwrap();
        assert!(entry.populated.is_none());
    }

    #[test]
    fn round_trips_through_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache_file = AbsolutePath::new(&dir.path().join("entry.kobj"));
        let mut entry = CacheEntry::new_unloaded(&cache_file);
        entry.populated = Some(sample_form());
        entry.write().unwrap();

        let reloaded = CacheEntry::load(&cache_file).unwrap();
        assert_eq!(reloaded.populated, entry.populated);
    }

    #[test]
    fn format_mismatch_is_treated_as_unpopulated() {
        let dir = tempfile::tempdir().unwrap();
        let cache_file = AbsolutePath::new(&dir.path().join("entry.kobj"));
        fileio::write_atomic(&cache_file, b"not a valid entry").unwrap();
        let entry = CacheEntry::load(&cache_file).unwrap();
        assert!(entry.populated.is_none());
    }
}
