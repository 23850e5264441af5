use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("could not spawn `{program}`: `{source}`")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("io error: `{0}`")]
    IOError(#[from] io::Error),

    #[error("command `{command}` failed with {status}\nStdout: {stdout}\nStderr: {stderr}")]
    Failed {
        command: String,
        status: String,
        stdout: String,
        stderr: String,
    },
}

impl CommandError {
    /// Text reported by the failed process, used to classify the failure reason.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            CommandError::Failed { stderr, .. } => Some(stderr.as_str()),
            _ => None,
        }
    }
}
