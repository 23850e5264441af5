use std::fmt::{self, Display};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::command::{CommandError, CommandSpec, Executor};

pub const CEPH_BINARY: &str = "ceph";

#[derive(Error, Debug)]
pub enum CephError {
    #[error("ceph command failed: `{0}`")]
    Command(#[from] CommandError),

    #[error("error deserializing ceph output: `{0}`")]
    SerdeJson(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum HealthStatus {
    #[serde(rename = "HEALTH_OK")]
    Ok,
    #[serde(rename = "HEALTH_WARN")]
    Warn,
    #[serde(rename = "HEALTH_ERR")]
    Err,
}

impl Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self {
            HealthStatus::Ok => "HEALTH_OK",
            HealthStatus::Warn => "HEALTH_WARN",
            HealthStatus::Err => "HEALTH_ERR",
        };
        write!(f, "{status}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Health {
    pub status: HealthStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CephStatus {
    #[serde(default)]
    pub fsid: String,
    pub health: Health,
}

/// Storage admin commands. Where they run is decided by the executor, usually a
/// [crate::command::ToolboxExecutor].
pub struct CephAdmin<E> {
    executor: Arc<E>,
}

impl<E: Executor> CephAdmin<E> {
    pub fn new(executor: Arc<E>) -> Self {
        Self { executor }
    }

    pub fn status(&self) -> Result<CephStatus, CephError> {
        let command = CommandSpec::new(CEPH_BINARY, ["status", "--format", "json"]);
        let output = self.executor.run(&command)?;
        Ok(serde_json::from_str(&output)?)
    }

    pub fn health(&self) -> Result<HealthStatus, CephError> {
        Ok(self.status()?.health.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::MockExecutor;
    use assert_matches::assert_matches;

    #[test]
    fn status_is_parsed() {
        let mut executor = MockExecutor::new();
        executor
            .expect_run()
            .withf(|cmd| cmd.program == "ceph" && cmd.has_args(&["status", "--format", "json"]))
            .once()
            .returning(|_| {
                Ok(r#"{
  "fsid": "5c3b7d2c-5d4e-4c3a-9b0e-1f2a3b4c5d6e",
  "health": {"checks": {}, "status": "HEALTH_WARN"},
  "election_epoch": 3,
  "quorum_names": ["a"]
}"#
                .to_string())
            });

        let admin = CephAdmin::new(Arc::new(executor));
        let status = admin.status().unwrap();
        assert_eq!("5c3b7d2c-5d4e-4c3a-9b0e-1f2a3b4c5d6e", status.fsid);
        assert_eq!(HealthStatus::Warn, status.health.status);
    }

    #[test]
    fn health() {
        let mut executor = MockExecutor::new();
        executor.should_run(&["status"], r#"{"health": {"status": "HEALTH_OK"}}"#);
        let admin = CephAdmin::new(Arc::new(executor));
        assert_eq!(HealthStatus::Ok, admin.health().unwrap());
        assert_eq!("HEALTH_OK", HealthStatus::Ok.to_string());

        let mut executor = MockExecutor::new();
        executor.should_run(&["status"], "not json");
        let admin = CephAdmin::new(Arc::new(executor));
        assert_matches!(admin.health(), Err(CephError::SerdeJson(_)));
    }
}
