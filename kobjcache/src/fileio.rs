/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::path::AbsolutePath;

/// Reads `path` fully into memory. Preserves the underlying I/O error via [`anyhow::Context`]
/// so a fatal diagnostic can name both the path and the OS error.
pub fn open_read_whole(path: &AbsolutePath) -> anyhow::Result<Vec<u8>> {
    fs::read(path.as_ref()).with_context(|| format!("failed to read '{}'", path))
}

pub fn unlink_if_exists(path: &AbsolutePath) -> anyhow::Result<()> {
    match fs::remove_file(path.as_ref()) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove '{}'", path)),
    }
}

pub fn rename(old: &AbsolutePath, new: &AbsolutePath) -> anyhow::Result<()> {
    fs::rename(old.as_ref(), new.as_ref())
        .with_context(|| format!("failed to rename '{}' to '{}'", old, new))
}

/// True only when a stat succeeds and the entry is a regular file; any error (missing file,
/// not-a-directory, permission denied) is folded into `false` rather than propagated.
pub fn exists_as_regular_file(path: &AbsolutePath) -> bool {
    fs::metadata(path.as_ref())
        .map(|m| m.is_file())
        .unwrap_or(false)
}

pub fn write_atomic(path: &AbsolutePath, contents: &[u8]) -> anyhow::Result<()> {
    let tmp = path.join_sibling_tmp();
    fs::write(tmp.as_ref(), contents)
        .with_context(|| format!("failed to write temporary file '{}'", tmp))?;
    fs::rename(tmp.as_ref(), path.as_ref())
        .with_context(|| format!("failed to commit '{}' (from '{}')", path, tmp))
}

impl AbsolutePath {
    /// Sibling temp path used for atomic writes: same directory, so the final rename is
    /// same-filesystem and therefore atomic on POSIX.
    fn join_sibling_tmp(&self) -> AbsolutePath {
        let path: &Path = self.as_ref();
        let file_name = path
            .file_name()
            .map(|n| {
                let mut s = n.to_os_string();
                s.push(".tmp");
                s
            })
            .unwrap_or_else(|| "entry.tmp".into());
        match path.parent() {
            Some(parent) => AbsolutePath::new(parent).join(file_name),
            None => AbsolutePath::new(Path::new(&file_name)),
        }
    }
}
