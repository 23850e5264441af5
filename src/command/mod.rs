mod error;
mod process;
mod toolbox;

use std::fmt::{self, Display};

pub use error::CommandError;
pub use process::ProcessExecutor;
pub use toolbox::ToolboxExecutor;

/// A single invocation of an external binary.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl CommandSpec {
    pub fn new<S, I, A>(program: S, args: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            stdin: None,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    /// Returns true if `expected` appears as a contiguous run of the argument list.
    pub fn has_args(&self, expected: &[&str]) -> bool {
        if expected.is_empty() {
            return true;
        }
        self.args
            .windows(expected.len())
            .any(|w| w.iter().map(String::as_str).eq(expected.iter().copied()))
    }
}

impl Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in self.args.iter() {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Runs external commands and returns their standard output.
///
/// Every collaborator that shells out receives an implementation at construction time, so the
/// channel used to reach a binary (local process, toolbox pod, ...) is decided by the caller.
#[cfg_attr(test, mockall::automock)]
pub trait Executor {
    fn run(&self, command: &CommandSpec) -> Result<String, CommandError>;
}
