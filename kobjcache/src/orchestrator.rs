/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::time::Duration;

use anyhow::Context;
use checksum::{Fingerprint, FingerprintSet};
use log::{debug, info};

use crate::entry::{CacheEntry, OnDiskForm};
use crate::fileio;
use crate::path::AbsolutePath;
use crate::process::{self, ProcessInvocation};
use crate::PROGRESS_TARGET;

const OLD_SUFFIX: &str = "-old";

pub struct PreprocessSection {
    /// Where the expanded text should end up, as an absolute path supplied by the caller.
    pub output_path: AbsolutePath,
    pub argv: Vec<String>,
    /// If set, the preprocessor's stdout is redirected to `output_path`; otherwise the
    /// preprocessor is expected to write the file itself.
    pub redir_stdout: bool,
}

pub struct CompileSection {
    pub object_path: AbsolutePath,
    pub argv: Vec<String>,
}

pub struct RunRequest {
    pub cache_file: AbsolutePath,
    pub preprocess: PreprocessSection,
    pub compile: CompileSection,
    pub timeout: Option<Duration>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Hit,
    Recompiled,
}

/// Runs one entry through rotate → preprocess → decide → build → persist.
pub fn run(request: RunRequest) -> anyhow::Result<Outcome> {
    let mut entry = CacheEntry::load(&request.cache_file)
        .with_context(|| format!("failed to load cache entry '{}'", request.cache_file))?;

    let rotated_old = rotate(&entry)?;

    let (new_preprocessor_rel, new_buffer, new_fingerprint) =
        preprocess(&entry, &request.preprocess, request.timeout)?;

    let new_object_rel = request
        .compile
        .object_path
        .make_relative(&entry.cache_dir)
        .context("object path could not be expressed relative to the cache directory")?;

    let decision = decide(
        &entry,
        &new_object_rel,
        &request.compile.argv,
        &request.compile.object_path,
        &new_fingerprint,
        rotated_old.as_ref(),
        &new_buffer,
    )?;

    // Step C: the rotated text is never needed past the decide step.
    if let Some(old) = &rotated_old {
        fileio::unlink_if_exists(old)?;
    }

    let outcome = if decision.needs_compile {
        // The preprocessor buffers are dropped here (by going out of scope after this point)
        // so the compiler, which may be memory-hungry, has the headroom back.
        drop(new_buffer);

        fileio::unlink_if_exists(&request.compile.object_path)?;
        info!("recompiling: {}", decision.reason);
        info!(target: PROGRESS_TARGET, "recompiling: {}", decision.reason);
        process::spawn_and_wait(ProcessInvocation {
            argv: &request.compile.argv,
            label: "compile",
            stdout_redirect: None,
            timeout: request.timeout,
        })
        .map_err(anyhow::Error::from)
        .with_context(|| "compiler invocation failed")?;

        entry.populated = Some(OnDiskForm::new(
            new_object_rel,
            request.compile.argv.clone(),
            new_preprocessor_rel,
            FingerprintSet::singleton(new_fingerprint),
        ));
        Outcome::Recompiled
    } else {
        info!("cache hit: {}", decision.reason);
        info!(target: PROGRESS_TARGET, "cache hit: {}", decision.reason);
        let mut accepted = decision.accepted_fingerprints;
        accepted.insert(new_fingerprint);
        entry.populated = Some(OnDiskForm::new(
            new_object_rel,
            request.compile.argv.clone(),
            new_preprocessor_rel,
            accepted,
        ));
        Outcome::Hit
    };

    entry
        .write()
        .with_context(|| format!("failed to persist cache entry '{}'", request.cache_file))?;

    Ok(outcome)
}

/// Step R: rename a previously recorded preprocessor output to its `-old` suffix, unlinking
/// any stale `-old` file first. Returns the rotated path when rotation happened.
fn rotate(entry: &CacheEntry) -> anyhow::Result<Option<AbsolutePath>> {
    let Some(form) = &entry.populated else {
        return Ok(None);
    };
    let current = form.preprocessor_output_path.resolve(&entry.cache_dir);
    if !fileio::exists_as_regular_file(&current) {
        return Ok(None);
    }
    let old = current.join_with_suffix(OLD_SUFFIX);
    fileio::unlink_if_exists(&old)?;
    fileio::rename(&current, &old)?;
    debug!("rotated previous preprocessor output to '{}'", old);
    Ok(Some(old))
}

/// Step P: invoke the preprocessor, then read and fingerprint its output.
fn preprocess(
    entry: &CacheEntry,
    section: &PreprocessSection,
    timeout: Option<Duration>,
) -> anyhow::Result<(crate::path::CacheRelativePath, Vec<u8>, Fingerprint)> {
    let rel = section
        .output_path
        .make_relative(&entry.cache_dir)
        .context("preprocessor output path could not be expressed relative to the cache directory")?;

    process::spawn_and_wait(ProcessInvocation {
        argv: &section.argv,
        label: "preprocess",
        stdout_redirect: if section.redir_stdout {
            Some(&section.output_path)
        } else {
            None
        },
        timeout,
    })
    .map_err(anyhow::Error::from)
    .context("preprocessor invocation failed")?;

    let buffer = fileio::open_read_whole(&section.output_path)?;
    let fingerprint = Fingerprint::compute(&buffer);
    Ok((rel, buffer, fingerprint))
}

struct Decision {
    needs_compile: bool,
    reason: &'static str,
    accepted_fingerprints: FingerprintSet,
}

/// Step D: the short-circuiting chain of checks described in the spec, in order.
#[allow(clippy::too_many_arguments)]
fn decide(
    entry: &CacheEntry,
    new_object_rel: &crate::path::CacheRelativePath,
    new_argv: &[String],
    new_object_abs: &AbsolutePath,
    new_fingerprint: &Fingerprint,
    rotated_old: Option<&AbsolutePath>,
    new_buffer: &[u8],
) -> anyhow::Result<Decision> {
    let Some(form) = &entry.populated else {
        return Ok(Decision {
            needs_compile: true,
            reason: "no prior entry",
            accepted_fingerprints: FingerprintSet::new(),
        });
    };

    if &form.object_path != new_object_rel {
        return Ok(Decision {
            needs_compile: true,
            reason: "object path changed",
            accepted_fingerprints: form.accepted_fingerprints.clone(),
        });
    }

    if form.compile_argv != new_argv {
        return Ok(Decision {
            needs_compile: true,
            reason: "compiler argument vector changed",
            accepted_fingerprints: form.accepted_fingerprints.clone(),
        });
    }

    if !fileio::exists_as_regular_file(new_object_abs) {
        return Ok(Decision {
            needs_compile: true,
            reason: "recorded object file is missing",
            accepted_fingerprints: form.accepted_fingerprints.clone(),
        });
    }

    if form.accepted_fingerprints.contains(new_fingerprint) {
        return Ok(Decision {
            needs_compile: false,
            reason: "fingerprint matches an accepted preprocessor output",
            accepted_fingerprints: form.accepted_fingerprints.clone(),
        });
    }

    if let Some(old) = rotated_old {
        let old_buffer = fileio::open_read_whole(old)?;
        if structural_compare_equivalent(&old_buffer, new_buffer) {
            return Ok(Decision {
                needs_compile: false,
                reason: "structurally equivalent to the previous preprocessor output",
                accepted_fingerprints: form.accepted_fingerprints.clone(),
            });
        }
    }

    Ok(Decision {
        needs_compile: true,
        reason: "preprocessor output changed and is not structurally equivalent",
        accepted_fingerprints: form.accepted_fingerprints.clone(),
    })
}

/// Step D.6's structural-compare hook. The current behavior is "never equivalent": the
/// decision is always forced to exact fingerprint match, matching the original tool's stub.
/// A real comparator (tolerating e.g. repositioned declarations) only changes the cache hit
/// rate, never correctness, so leaving it stubbed is a deliberate, documented choice (see
/// DESIGN.md open question 1 for the related argv question).
fn structural_compare_equivalent(_old: &[u8], _new: &[u8]) -> bool {
    false
}

impl AbsolutePath {
    fn join_with_suffix(&self, suffix: &str) -> AbsolutePath {
        let path: &std::path::Path = self.as_ref();
        let mut os = path.as_os_str().to_owned();
        os.push(suffix);
        AbsolutePath::new(std::path::Path::new(&os))
    }
}
