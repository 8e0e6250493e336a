use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while preparing, running or reading back external model runs.
#[derive(Error, Debug)]
pub enum TpmError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("command produced no output: {command}")]
    EmptyOutput { command: String },

    #[error("unexpected output from {command}: expected at least {expected} tokens, got {found}: {output}")]
    MalformedOutput {
        command: String,
        expected: usize,
        found: usize,
        output: String,
    },

    #[error("cannot parse `{token}` as a number in output of {command}")]
    InvalidNumber { command: String, token: String },

    #[error("{}: {message}", path.display())]
    Format { path: PathBuf, message: String },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl TpmError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        TpmError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        TpmError::Format {
            path: path.into(),
            message: message.into(),
        }
    }
}
