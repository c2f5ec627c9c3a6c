/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use serde::{Deserialize, Serialize};

/// Optional run configuration, loaded from TOML. Supplies defaults that command-line flags
/// may override; a missing config file is not an error, only a missing override source.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Enable progress messages unless `-q`/`-v` say otherwise on the command line.
    pub verbose: bool,
    /// Per-child wall-clock bound in seconds; `0` means no timeout.
    pub child_timeout_secs: u64,
}

impl Config {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration file '{}'", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse configuration file '{}'", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_absent() {
        let config = Config::default();
        assert!(!config.verbose);
        assert_eq!(config.child_timeout_secs, 0);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config: Config = toml::from_str("verbose = true\n").unwrap();
        assert!(config.verbose);
        assert_eq!(config.child_timeout_secs, 0);
    }

    #[test]
    fn malformed_toml_is_reported_distinctly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is not [valid toml").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse configuration"));
    }
}
