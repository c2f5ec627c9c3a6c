/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use args::Args;
use config::Config;
use log::{info, LevelFilter};
use orchestrator::{CompileSection, PreprocessSection, RunRequest};
use path::AbsolutePath;

mod args;
mod config;
mod entry;
mod error;
mod fileio;
mod orchestrator;
mod path;
mod process;

/// Target for the verbosity-gated progress stream, distinct from the library's own diagnostic
/// logger (the unprefixed `debug!`/`info!`/`error!` calls, whose level is fixed by config and
/// never moved by `-v`/`-q`).
pub(crate) const PROGRESS_TARGET: &str = "kobjcache::progress";

fn main() {
    let raw_args: Vec<String> = std::env::args().skip(1).collect();
    let args = match Args::parse_from(raw_args) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("kObjCache: syntax error: {}", e);
            std::process::exit(1);
        }
    };

    let entry_label = args.file.clone();
    if let Err(err) = run(args) {
        eprintln!("kObjCache {} - fatal error: {:?}", entry_label, err);
        std::process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => Config::load(Path::new(path))?,
        None => Config::default(),
    };

    let verbose = args.verbose || (config.verbose && !args.quiet);
    let progress_level = if args.quiet {
        LevelFilter::Off
    } else if verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };
    init_logging(progress_level);
    info!("kObjCache starting for entry '{}'", args.file);
    log::info!(target: PROGRESS_TARGET, "progress messages enabled");

    let timeout = if config.child_timeout_secs > 0 {
        Some(Duration::from_secs(config.child_timeout_secs))
    } else {
        None
    };

    let cache_file = AbsolutePath::new(Path::new(&args.file));
    let preprocess_output = AbsolutePath::new(Path::new(&args.sections.preprocess_name));
    let object_path = AbsolutePath::new(Path::new(&args.sections.compile_name));

    let request = RunRequest {
        cache_file,
        preprocess: PreprocessSection {
            output_path: preprocess_output,
            argv: args.sections.preprocess_argv,
            redir_stdout: args.redir_stdout,
        },
        compile: CompileSection {
            object_path,
            argv: args.sections.compile_argv,
        },
        timeout,
    };

    let outcome = orchestrator::run(request)?;
    info!("kObjCache finished: {:?}", outcome);
    Ok(())
}

/// Initializes the global logger, grafting a `kobjcache::progress` logger at `progress_level`
/// onto whatever appenders/loggers `log4rs.yml` defines (or the fallback config, if the file is
/// absent or fails to parse). The progress level is computed from `-v`/`-q` before this runs, so
/// it has to be baked into the config at construction time rather than adjusted afterwards.
fn init_logging(progress_level: LevelFilter) {
    let config_path = "log4rs.yml";
    let config = if Path::new(config_path).exists() {
        build_config_from_file(config_path, progress_level).unwrap_or_else(|e| {
            eprintln!("kObjCache: failed to init logger from '{}': {}", config_path, e);
            fallback_log_config(progress_level)
        })
    } else {
        fallback_log_config(progress_level)
    };
    let _ = log4rs::init_config(config);
}

fn build_config_from_file(path: &str, progress_level: LevelFilter) -> anyhow::Result<log4rs::Config> {
    use log4rs::config::{Deserializers, Logger, RawConfig};

    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read '{}'", path))?;
    let raw: RawConfig =
        serde_yaml::from_str(&source).with_context(|| format!("failed to parse '{}'", path))?;

    let (appenders, errors) = raw.appenders_lossy(&Deserializers::default());
    if !errors.is_empty() {
        return Err(errors.into());
    }
    let progress_appender = appenders
        .iter()
        .find(|a| a.name() == "stdout")
        .map(|a| a.name().to_owned())
        .unwrap_or_else(|| "stdout".to_owned());

    log4rs::Config::builder()
        .appenders(appenders)
        .loggers(raw.loggers())
        .logger(
            Logger::builder()
                .appender(progress_appender)
                .additive(false)
                .build(PROGRESS_TARGET, progress_level),
        )
        .build(raw.root())
        .context("assembled logging configuration is invalid")
}

fn fallback_log_config(progress_level: LevelFilter) -> log4rs::Config {
    use log4rs::append::console::ConsoleAppender;
    use log4rs::config::{Appender, Logger, Root};
    use log4rs::encode::pattern::PatternEncoder;

    let stderr = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%H:%M:%S)} {l} - {m}{n}")))
        .target(log4rs::append::console::Target::Stderr)
        .build();
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{m}{n}")))
        .build();

    log4rs::Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .logger(
            Logger::builder()
                .appender("stdout")
                .additive(false)
                .build(PROGRESS_TARGET, progress_level),
        )
        .build(Root::builder().appender("stderr").build(LevelFilter::Info))
        .expect("fallback logging configuration is statically valid")
}
