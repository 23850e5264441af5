use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::command::{CommandError, CommandSpec, Executor};

#[derive(Error, Debug)]
pub enum HelmError {
    #[error("the package manager returned an error: `{0}`")]
    Command(#[from] CommandError),

    #[error("error deserializing chart search output: `{0}`")]
    SerdeJson(#[from] serde_json::Error),

    #[error("chart `{0}` not found in the local repositories")]
    ChartNotFound(String),
}

/// Entry of `helm search repo -o json`.
#[derive(Debug, Deserialize)]
struct ChartEntry {
    version: String,
}

/// Installs and removes charts through the package manager cli.
pub struct HelmHelper<E> {
    executor: Arc<E>,
    binary: String,
}

impl<E: Executor> HelmHelper<E> {
    pub fn new(executor: Arc<E>, binary: impl Into<String>) -> Self {
        Self {
            executor,
            binary: binary.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, HelmError> {
        let command = CommandSpec::new(self.binary.as_str(), args.iter().copied());
        debug!("running `{command}`");
        Ok(self.executor.run(&command)?)
    }

    /// Version of the first match of `chart` in the locally configured repositories.
    pub fn local_chart_version(&self, chart: &str) -> Result<String, HelmError> {
        let output = self.run(&["search", "repo", chart, "-o", "json"])?;
        let entries: Vec<ChartEntry> = serde_json::from_str(&output)?;
        entries
            .into_iter()
            .next()
            .map(|entry| entry.version)
            .ok_or_else(|| HelmError::ChartNotFound(chart.to_string()))
    }

    pub fn install_chart(
        &self,
        chart: &str,
        release: &str,
        version: &str,
        namespace: &str,
    ) -> Result<(), HelmError> {
        info!("installing chart {chart}:{version} as release {release} in namespace {namespace}");
        self.run(&[
            "install",
            release,
            chart,
            "--version",
            version,
            "--namespace",
            namespace,
            "--create-namespace",
        ])
        .map(drop)
    }

    pub fn uninstall_chart(&self, release: &str, namespace: &str) -> Result<(), HelmError> {
        info!("uninstalling release {release} from namespace {namespace}");
        self.run(&["uninstall", release, "--namespace", namespace])
            .map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::MockExecutor;
    use assert_matches::assert_matches;

    fn helm(executor: MockExecutor) -> HelmHelper<MockExecutor> {
        HelmHelper::new(Arc::new(executor), "helm")
    }

    #[test]
    fn chart_version_is_the_first_match() {
        let mut executor = MockExecutor::new();
        executor.should_run(
            &["search", "repo", "rook-release/rook-ceph", "-o", "json"],
            r#"[
  {"name": "rook-release/rook-ceph", "version": "v1.0.1", "app_version": "", "description": "File, Block, and Object Storage Services"},
  {"name": "rook-release/rook-ceph-cluster", "version": "v1.0.0", "app_version": "", "description": ""}
]"#,
        );

        assert_eq!(
            "v1.0.1",
            helm(executor)
                .local_chart_version("rook-release/rook-ceph")
                .unwrap()
        );
    }

    #[test]
    fn missing_chart() {
        let mut executor = MockExecutor::new();
        executor.should_run(&["search", "repo"], "[]");

        assert_matches!(
            helm(executor).local_chart_version("rook-release/rook-ceph"),
            Err(HelmError::ChartNotFound(chart)) if chart == "rook-release/rook-ceph"
        );
    }

    #[test]
    fn install_and_uninstall() {
        let mut executor = MockExecutor::new();
        executor.should_run(
            &[
                "install",
                "rook-ceph",
                "rook-release/rook-ceph",
                "--version",
                "v1.0.1",
                "--namespace",
                "rook-ceph-system",
            ],
            "STATUS: deployed",
        );
        executor.should_fail(
            &["uninstall", "rook-ceph", "--namespace", "rook-ceph-system"],
            "Error: uninstall: Release not loaded: rook-ceph: release: not found",
        );

        let helm = helm(executor);
        helm.install_chart(
            "rook-release/rook-ceph",
            "rook-ceph",
            "v1.0.1",
            "rook-ceph-system",
        )
        .unwrap();
        assert_matches!(
            helm.uninstall_chart("rook-ceph", "rook-ceph-system"),
            Err(HelmError::Command(CommandError::Failed { .. }))
        );
    }
}
