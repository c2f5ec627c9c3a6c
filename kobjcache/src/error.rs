/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use thiserror::Error;

/// Driver-level parse failures. Distinguished from [`crate::process::ExecError`] and
/// [`crate::path::PathError`] because a malformed command line is reported and exits before
/// any cache entry is even created, unlike the fatal I/O/subprocess failures the orchestrator
/// can raise once it is running.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("{0}")]
    Syntax(String),
}
