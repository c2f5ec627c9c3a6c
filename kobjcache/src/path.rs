/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fmt::{self, Display, Formatter};
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PathError {
    #[error("path '{0}' does not lie under cache directory '{1}'")]
    UnsupportedPath(String, String),
}

/// An absolute path as handed to us by the caller (the outer build driver), before it has
/// been made relative to a cache directory.
#[derive(Clone, Debug)]
pub struct AbsolutePath {
    base: Box<Path>,
}

impl AbsolutePath {
    pub fn new(path: &Path) -> Self {
        Self {
            base: canonicalize_or_unchanged(path).into_boxed_path(),
        }
    }

    /// Strips `dir` as a prefix, honoring platform case and separator conventions. Fails with
    /// [`PathError::UnsupportedPath`] when the path does not lie under `dir` even after
    /// canonicalization; this design never synthesizes a `..` traversal.
    pub fn make_relative(&self, dir: &AbsolutePath) -> Result<CacheRelativePath, PathError> {
        if let Ok(rel) = self.base.strip_prefix(dir.as_ref()) {
            return Ok(CacheRelativePath::new(rel));
        }
        // Exact strip_prefix failed; fall back to the case/separator-tolerant comparison the
        // contract calls for before giving up. Component-wise, so there's no byte-offset
        // slicing of a lossily-converted string that could land off a char boundary.
        if let Some(rel) = strip_prefix_tolerant(&self.base, dir.as_ref()) {
            return Ok(CacheRelativePath::new(rel));
        }
        Err(PathError::UnsupportedPath(
            self.to_string(),
            dir.to_string(),
        ))
    }

    pub fn join<P: AsRef<Path>>(&self, path: P) -> Self {
        Self {
            base: self.base.join(path).into_boxed_path(),
        }
    }

    /// Position just after the final directory separator (or drive-letter colon on DOS-style
    /// paths), i.e. the filename component.
    pub fn leaf(&self) -> &str {
        self.base
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
    }
}

impl Display for AbsolutePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base.display())
    }
}

impl AsRef<Path> for AbsolutePath {
    fn as_ref(&self) -> &Path {
        self.base.as_ref()
    }
}

/// A path stored on a [`crate::entry::CacheEntry`], always interpreted relative to that
/// entry's cache directory. Never mixed with an [`AbsolutePath`] without an explicit `resolve`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CacheRelativePath {
    rel: PathBuf,
}

impl CacheRelativePath {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { rel: path.into() }
    }

    pub fn resolve(&self, dir: &AbsolutePath) -> AbsolutePath {
        dir.join(&self.rel)
    }
}

impl Display for CacheRelativePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rel.display())
    }
}

impl AsRef<Path> for CacheRelativePath {
    fn as_ref(&self) -> &Path {
        self.rel.as_ref()
    }
}

/// Compares whether `path` lies under `dir`, honoring case-insensitivity and dual separator
/// conventions on platforms whose filesystem asks for it (`cfg` gate keeps the orchestrator
/// itself free of platform branches).
pub fn compare_prefix(path: &Path, dir: &Path) -> bool {
    strip_prefix_tolerant(path, dir).is_some()
}

/// Strips `dir` off the front of `path` component by component, folding case (on platforms
/// whose filesystem is case-insensitive) and treating `/`/`\` as the same separator. Returns
/// `None` rather than panicking when `path` does not lie under `dir`, or when fewer components
/// remain in `path` than in `dir`.
fn strip_prefix_tolerant(path: &Path, dir: &Path) -> Option<PathBuf> {
    let mut path_components = path.components();
    for dir_component in dir.components() {
        let path_component = path_components.next()?;
        if !components_match(path_component, dir_component) {
            return None;
        }
    }
    Some(path_components.as_path().to_path_buf())
}

fn components_match(a: Component, b: Component) -> bool {
    match (a, b) {
        (Component::Normal(a), Component::Normal(b)) => normalize_component(a) == normalize_component(b),
        _ => a == b,
    }
}

fn normalize_component(c: &std::ffi::OsStr) -> String {
    let s = c.to_string_lossy().replace('\\', "/");
    if cfg!(windows) {
        s.to_lowercase()
    } else {
        s
    }
}

fn canonicalize_or_unchanged(path: &Path) -> PathBuf {
    match path.canonicalize() {
        Ok(p) => p,
        Err(_) => normalize_dots(path),
    }
}

/// Lexically collapses `.`/`..` without touching the filesystem, used when `canonicalize`
/// fails (e.g. the path does not exist yet, as is common for a freshly named object file).
fn normalize_dots(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_relative_succeeds_under_dir() {
        let dir = AbsolutePath::new(Path::new("/tmp/cache"));
        let path = AbsolutePath::new(Path::new("/tmp/cache/obj/a.o"));
        let rel = path.make_relative(&dir).unwrap();
        assert_eq!(rel.to_string(), "obj/a.o");
    }

    #[test]
    fn make_relative_fails_outside_dir() {
        let dir = AbsolutePath::new(Path::new("/tmp/cache"));
        let path = AbsolutePath::new(Path::new("/var/elsewhere/a.o"));
        assert!(path.make_relative(&dir).is_err());
    }

    #[test]
    fn compare_prefix_treats_separators_as_equal() {
        assert!(compare_prefix(
            Path::new("/tmp/cache/a"),
            Path::new("/tmp/cache")
        ));
    }
}
