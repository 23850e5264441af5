use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;

use tracing::{debug, warn};

use super::{CommandError, CommandSpec, Executor};

/// Runs commands as local child processes.
#[derive(Debug, Default, Clone)]
pub struct ProcessExecutor;

impl Executor for ProcessExecutor {
    fn run(&self, spec: &CommandSpec) -> Result<String, CommandError> {
        debug!(command = %spec, "running command");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        // The child may fill its stdout pipe before consuming all of stdin.
        let writer = match (spec.stdin.clone(), child.stdin.take()) {
            (Some(input), Some(mut stdin)) => Some(thread::spawn(move || {
                stdin.write_all(input.as_bytes())
            })),
            _ => None,
        };

        let output = child.wait_with_output()?;

        if let Some(writer) = writer {
            match writer.join() {
                Ok(Err(err)) => warn!(command = %spec, "writing stdin: {err}"),
                Err(_) => warn!(command = %spec, "stdin writer thread panicked"),
                Ok(Ok(())) => {}
            }
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            return Err(CommandError::Failed {
                command: spec.to_string(),
                status: output.status.to_string(),
                stdout,
                stderr,
            });
        }

        Ok(stdout)
    }
}
