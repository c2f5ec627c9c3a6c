/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use clap::Parser;

use crate::error::DriverError;

const SECTION_CPP: &str = "--kObjCache-cpp";
const SECTION_CC: &str = "--kObjCache-cc";
const SECTION_BOTH: &str = "--kObjCache-both";

/// The head of the command line: switches `clap` can parse structurally. Everything from the
/// first `--kObjCache-*` token onward is a raw, hand-scanned section (see [`Sections`]) —
/// `clap`'s derive model has no way to express "capture the trailing tokens of section A,
/// unless flag B introduced them, in which case append to both A and C".
#[derive(Parser, Debug)]
#[command(name = "kobjcache", version, about = "Object-file cache engine", long_about = None)]
struct HeadArgs {
    /// Cache-entry file
    #[arg(short = 'f', long = "file")]
    file: String,

    /// Redirect preprocessor stdout to its output file
    #[arg(short = 'r', long = "redir-stdout", default_value_t = false)]
    redir_stdout: bool,

    /// Enable progress messages
    #[arg(short = 'v', long = "verbose", default_value_t = false)]
    verbose: bool,

    /// Disable progress messages
    #[arg(short = 'q', long = "quiet", default_value_t = false)]
    quiet: bool,

    /// Optional run configuration file in TOML format
    #[arg(short = 'c', long = "config")]
    config: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Sections {
    pub preprocess_name: String,
    pub preprocess_argv: Vec<String>,
    pub compile_name: String,
    pub compile_argv: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Args {
    pub file: String,
    pub redir_stdout: bool,
    pub verbose: bool,
    pub quiet: bool,
    pub config: Option<String>,
    pub sections: Sections,
}

impl Args {
    pub fn parse_from<I: IntoIterator<Item = String>>(raw: I) -> Result<Self, DriverError> {
        let mut tokens: Vec<String> = raw.into_iter().collect();
        // `-?` is a help alias clap's derive model cannot express directly as a short flag
        // alongside `-h`; translate it before handing the head off to clap.
        for token in tokens.iter_mut() {
            if token == "-?" {
                *token = "--help".to_owned();
            }
        }

        let split_at = tokens
            .iter()
            .position(|t| t == SECTION_CPP || t == SECTION_CC || t == SECTION_BOTH);
        let (head, tail) = match split_at {
            Some(idx) => tokens.split_at(idx),
            None => (tokens.as_slice(), &tokens[tokens.len()..]),
        };

        let mut head_argv = vec!["kobjcache".to_owned()];
        head_argv.extend(head.iter().cloned());
        let head = match HeadArgs::try_parse_from(head_argv) {
            Ok(head) => head,
            Err(e) => {
                use clap::error::ErrorKind;
                match e.kind() {
                    // `try_parse_from`, unlike `Parser::parse`, does not print-and-exit for
                    // these on its own; do it ourselves so `--help`/`-?`/`--version` still
                    // print to stdout and exit 0 instead of being folded into a syntax error.
                    ErrorKind::DisplayHelp
                    | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                    | ErrorKind::DisplayVersion => e.exit(),
                    _ => return Err(DriverError::Syntax(e.to_string())),
                }
            }
        };

        let sections = parse_sections(tail)?;

        Ok(Args {
            file: head.file,
            redir_stdout: head.redir_stdout,
            verbose: head.verbose,
            quiet: head.quiet,
            config: head.config,
            sections,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    None,
    Cpp,
    Cc,
    Both,
}

fn parse_sections(tail: &[String]) -> Result<Sections, DriverError> {
    let mut mode = Mode::None;
    let mut cpp_name: Option<String> = None;
    let mut cpp_argv = Vec::new();
    let mut cc_name: Option<String> = None;
    let mut cc_argv = Vec::new();

    let mut iter = tail.iter().peekable();
    while let Some(token) = iter.next() {
        match token.as_str() {
            SECTION_CPP => {
                if cpp_name.is_some() {
                    return Err(DriverError::Syntax(format!(
                        "{} may only be specified once",
                        SECTION_CPP
                    )));
                }
                let name = iter.next().ok_or_else(|| {
                    DriverError::Syntax(format!("{} requires an output file name", SECTION_CPP))
                })?;
                cpp_name = Some(name.clone());
                mode = Mode::Cpp;
            }
            SECTION_CC => {
                if cc_name.is_some() {
                    return Err(DriverError::Syntax(format!(
                        "{} may only be specified once",
                        SECTION_CC
                    )));
                }
                let name = iter.next().ok_or_else(|| {
                    DriverError::Syntax(format!("{} requires an object file name", SECTION_CC))
                })?;
                cc_name = Some(name.clone());
                mode = Mode::Cc;
            }
            SECTION_BOTH => {
                mode = Mode::Both;
            }
            _ => match mode {
                Mode::None => {
                    return Err(DriverError::Syntax(format!(
                        "unrecognized token '{}'",
                        token
                    )));
                }
                Mode::Cpp => cpp_argv.push(token.clone()),
                Mode::Cc => cc_argv.push(token.clone()),
                Mode::Both => {
                    cpp_argv.push(token.clone());
                    cc_argv.push(token.clone());
                }
            },
        }
    }

    let preprocess_name = cpp_name.ok_or_else(|| {
        DriverError::Syntax(format!("missing required {} section", SECTION_CPP))
    })?;
    let compile_name =
        cc_name.ok_or_else(|| DriverError::Syntax(format!("missing required {} section", SECTION_CC)))?;

    Ok(Sections {
        preprocess_name,
        preprocess_argv: cpp_argv,
        compile_name,
        compile_argv: cc_argv,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_minimal_invocation() {
        let args = Args::parse_from(strs(&[
            "-f",
            "entry.kobj",
            "--kObjCache-cpp",
            "a.i",
            "gcc",
            "-E",
            "a.c",
            "--kObjCache-cc",
            "a.o",
            "gcc",
            "-c",
            "a.i",
        ]))
        .unwrap();
        assert_eq!(args.file, "entry.kobj");
        assert_eq!(args.sections.preprocess_name, "a.i");
        assert_eq!(args.sections.preprocess_argv, strs(&["gcc", "-E", "a.c"]));
        assert_eq!(args.sections.compile_name, "a.o");
        assert_eq!(args.sections.compile_argv, strs(&["gcc", "-c", "a.i"]));
    }

    #[test]
    fn both_appends_to_both_sections() {
        let args = Args::parse_from(strs(&[
            "-f",
            "entry.kobj",
            "--kObjCache-cpp",
            "a.i",
            "gcc",
            "--kObjCache-cc",
            "a.o",
            "gcc",
            "--kObjCache-both",
            "-DNDEBUG",
        ]))
        .unwrap();
        assert_eq!(args.sections.preprocess_argv, strs(&["gcc", "-DNDEBUG"]));
        assert_eq!(args.sections.compile_argv, strs(&["gcc", "-DNDEBUG"]));
    }

    #[test]
    fn missing_cache_file_is_syntax_error() {
        let result = Args::parse_from(strs(&[
            "--kObjCache-cpp",
            "a.i",
            "gcc",
            "--kObjCache-cc",
            "a.o",
            "gcc",
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn missing_compile_section_is_syntax_error() {
        let result = Args::parse_from(strs(&["-f", "entry.kobj", "--kObjCache-cpp", "a.i", "gcc"]));
        assert!(matches!(result, Err(DriverError::Syntax(_))));
    }

    #[test]
    fn respecifying_a_section_is_a_syntax_error() {
        let result = Args::parse_from(strs(&[
            "-f",
            "entry.kobj",
            "--kObjCache-cpp",
            "a.i",
            "gcc",
            "--kObjCache-cpp",
            "b.i",
            "gcc",
            "--kObjCache-cc",
            "a.o",
            "gcc",
        ]));
        assert!(matches!(result, Err(DriverError::Syntax(_))));
    }

    #[test]
    fn unrecognized_top_level_token_is_syntax_error() {
        let result = Args::parse_from(strs(&["-f", "entry.kobj", "--not-a-real-flag"]));
        assert!(result.is_err());
    }
}
