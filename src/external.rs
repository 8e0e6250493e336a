//! Subprocess seam for the native model binaries (`runtpm`, `fittm`).
//!
//! Both binaries read one parameter line on stdin and print several lines on
//! stdout, of which only the ones carrying a record marker are consumed.

use std::fmt;
use std::io::Write;
use std::process::{Command, Stdio};

use log::warn;

use crate::error::TpmError;

/// One fully specified call of an external binary.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: String,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "echo {} | {}", self.stdin, self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
}

/// Runs an [`Invocation`] to completion and hands back its stdout.
///
/// Implementations are shared by every worker of a pool, hence `Sync`.
pub trait CommandRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, TpmError>;
}

/// Launches the program as a child process. Blocks until it exits; there is no timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, TpmError> {
        let spawn_err = |source| TpmError::Spawn {
            program: invocation.program.clone(),
            source,
        };

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(spawn_err)?;

        if let Some(mut stdin) = child.stdin.take() {
            writeln!(stdin, "{}", invocation.stdin).map_err(spawn_err)?;
        }

        let output = child.wait_with_output().map_err(spawn_err)?;
        if !output.status.success() {
            warn!("{} exited with {}", invocation.program, output.status);
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}

/// Whitespace tokens of every stdout line containing `marker`, in order.
pub fn marker_tokens<'a>(stdout: &'a str, marker: &str) -> Vec<&'a str> {
    stdout
        .lines()
        .filter(|line| line.contains(marker))
        .flat_map(str::split_whitespace)
        .collect()
}

/// Parses the token at `index` as a float, mapping failures onto the output contract errors.
pub fn token_f64(
    tokens: &[&str],
    index: usize,
    invocation: &Invocation,
) -> Result<f64, TpmError> {
    let token = tokens.get(index).ok_or_else(|| TpmError::MalformedOutput {
        command: invocation.to_string(),
        expected: index + 1,
        found: tokens.len(),
        output: tokens.join(" "),
    })?;
    token.parse::<f64>().map_err(|_| TpmError::InvalidNumber {
        command: invocation.to_string(),
        token: token.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_filter_keeps_only_marked_lines() {
        let stdout = "# runtpm v1\nf> 1 2 3\nnoise line\n f> 4 5\n";
        assert_eq!(marker_tokens(stdout, "f>"), vec!["f>", "1", "2", "3", "f>", "4", "5"]);
    }

    #[test]
    fn test_marker_filter_empty_when_absent() {
        assert!(marker_tokens("header\nbody\n", "o>").is_empty());
    }

    #[test]
    fn test_invocation_display_reads_like_a_pipeline() {
        let inv = Invocation {
            program: "fittm".to_string(),
            args: vec!["-m".to_string(), "1".to_string()],
            stdin: "18.118 0.15".to_string(),
        };
        assert_eq!(inv.to_string(), "echo 18.118 0.15 | fittm -m 1");
    }

    #[test]
    fn test_token_f64_reports_short_output() {
        let inv = Invocation {
            program: "fittm".to_string(),
            args: vec![],
            stdin: String::new(),
        };
        let err = token_f64(&["o>", "1.2"], 5, &inv).unwrap_err();
        assert!(matches!(err, TpmError::MalformedOutput { expected: 6, found: 2, .. }));

        let err = token_f64(&["o>", "nan?"], 1, &inv).unwrap_err();
        assert!(matches!(err, TpmError::InvalidNumber { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_runner_pipes_stdin() {
        let inv = Invocation {
            program: "cat".to_string(),
            args: vec![],
            stdin: "f> 1 2 3".to_string(),
        };
        let out = ProcessRunner.run(&inv).unwrap();
        assert_eq!(out.stdout.trim(), "f> 1 2 3");
    }

    #[test]
    fn test_process_runner_missing_binary() {
        let inv = Invocation {
            program: "definitely-not-a-real-runtpm-binary".to_string(),
            args: vec![],
            stdin: String::new(),
        };
        assert!(matches!(ProcessRunner.run(&inv), Err(TpmError::Spawn { .. })));
    }
}
