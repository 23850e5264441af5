pub mod error;

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::manifests::CephRelease;
use crate::provision::RetryPolicy;
use crate::utils::retry::WaitPolicy;

pub use error::ConfigError;

pub const DEFAULT_ROOK_VERSION: &str = "master";
pub const DEFAULT_BASE_TEST_DIR: &str = "/var/lib/rook";
pub const DEFAULT_LOGS_DIR: &str = "_output/tests";

/// Settings of a test run. Every field is optional in the YAML file.
///
/// ```yaml
/// kubectl: /usr/local/bin/kubectl
/// rook_version: v1.0.0
/// ceph_version: mimic
/// crd_retry:
///   max_attempts: 5
///   delay: 10s
/// pod_wait:
///   attempts: 60
///   interval: 5s
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    pub kubectl: String,
    pub helm: String,
    /// Rook is already installed, install and uninstall become no-ops. Meant for local debugging.
    pub skip_install: bool,
    pub host_type: String,
    pub base_test_dir: PathBuf,
    /// The data dirs are on this host and can be created locally.
    pub create_base_test_dir: bool,
    pub force_use_devices: bool,
    pub logs_dir: PathBuf,
    pub rook_version: String,
    pub ceph_version: CephRelease,
    pub crd_retry: RetryPolicy,
    pub pod_wait: WaitPolicy,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            kubectl: "kubectl".to_string(),
            helm: "helm".to_string(),
            skip_install: false,
            host_type: "localhost".to_string(),
            base_test_dir: PathBuf::from(DEFAULT_BASE_TEST_DIR),
            create_base_test_dir: false,
            force_use_devices: false,
            logs_dir: PathBuf::from(DEFAULT_LOGS_DIR),
            rook_version: DEFAULT_ROOK_VERSION.to_string(),
            ceph_version: CephRelease::default(),
            crd_retry: RetryPolicy::default(),
            pod_wait: WaitPolicy::default(),
        }
    }
}

impl InstallerConfig {
    /// Reads the config from `path`, defaults are used when there is no file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            debug!("no config file given, using defaults");
            return Ok(Self::default());
        };

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.crd_retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "crd_retry.max_attempts must be greater than zero".to_string(),
            ));
        }
        if self.kubectl.trim().is_empty() {
            return Err(ConfigError::Invalid("kubectl cannot be empty".to_string()));
        }
        Ok(self)
    }
}

impl std::str::FromStr for InstallerConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // an empty file has no document at all
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: InstallerConfig = serde_yaml::from_str(s)?;
        config.validate()
    }
}
