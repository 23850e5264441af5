use std::sync::Arc;

use super::{CommandError, CommandSpec, Executor};

pub const TOOLBOX_DEPLOYMENT: &str = "rook-ceph-tools";

/// Executes commands inside the toolbox deployment of a namespace through `kubectl exec`.
///
/// Storage admin binaries are not available on the machine running the tests, so any
/// collaborator built on top of this executor transparently reaches them in the cluster.
pub struct ToolboxExecutor<E> {
    inner: Arc<E>,
    kubectl: String,
    namespace: String,
}

impl<E: Executor> ToolboxExecutor<E> {
    pub fn new(inner: Arc<E>, kubectl: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            inner,
            kubectl: kubectl.into(),
            namespace: namespace.into(),
        }
    }

    fn wrap(&self, command: &CommandSpec) -> CommandSpec {
        let mut args = vec![
            "-n".to_string(),
            self.namespace.clone(),
            "exec".to_string(),
        ];
        if command.stdin.is_some() {
            args.push("-i".to_string());
        }
        args.push(format!("deploy/{TOOLBOX_DEPLOYMENT}"));
        args.push("--".to_string());
        args.push(command.program.clone());
        args.extend(command.args.iter().cloned());

        CommandSpec {
            program: self.kubectl.clone(),
            args,
            stdin: command.stdin.clone(),
        }
    }
}

impl<E: Executor> Executor for ToolboxExecutor<E> {
    fn run(&self, command: &CommandSpec) -> Result<String, CommandError> {
        self.inner.run(&self.wrap(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::MockExecutor;

    #[test]
    fn wraps_command_in_kubectl_exec() {
        let mut inner = MockExecutor::new();
        inner
            .expect_run()
            .withf(|cmd| {
                cmd.program == "kubectl"
                    && cmd.args
                        == [
                            "-n",
                            "rook-ceph",
                            "exec",
                            "deploy/rook-ceph-tools",
                            "--",
                            "ceph",
                            "status",
                        ]
                    && cmd.stdin.is_none()
            })
            .once()
            .returning(|_| Ok("HEALTH_OK".to_string()));

        let toolbox = ToolboxExecutor::new(Arc::new(inner), "kubectl", "rook-ceph");
        let out = toolbox
            .run(&CommandSpec::new("ceph", ["status"]))
            .unwrap();
        assert_eq!("HEALTH_OK", out);
    }

    #[test]
    fn keeps_stdin_interactive() {
        let mut inner = MockExecutor::new();
        inner
            .expect_run()
            .withf(|cmd| cmd.has_args(&["exec", "-i"]) && cmd.stdin.as_deref() == Some("keyring"))
            .once()
            .returning(|_| Ok(String::new()));

        let toolbox = ToolboxExecutor::new(Arc::new(inner), "kubectl", "rook-ceph");
        toolbox
            .run(&CommandSpec::new("ceph", ["auth", "import", "-i", "-"]).with_stdin("keyring"))
            .unwrap();
    }
}
