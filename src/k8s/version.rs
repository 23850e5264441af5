use std::fmt::{self, Display};
use std::sync::OnceLock;

use regex::Regex;

use super::error::K8sError;

/// Matches `v1.13.4`, `1.28`, `v1.27.3+k3s1`, ...
const VERSION_RE: &str = r"^v?(\d+)\.(\d+)(?:\.(\d+))?";

fn version_re() -> &'static Regex {
    static RE_ONCE: OnceLock<Regex> = OnceLock::new();
    RE_ONCE.get_or_init(|| Regex::new(VERSION_RE).expect("version regex is valid"))
}

/// Kubernetes server version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct KubeVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl KubeVersion {
    pub fn parse(version: &str) -> Result<Self, K8sError> {
        let invalid = || K8sError::InvalidVersion(version.to_string());
        let caps = version_re().captures(version.trim()).ok_or_else(invalid)?;

        let number = |idx: usize| -> Result<u64, K8sError> {
            caps.get(idx)
                .map_or(Ok(0), |m| m.as_str().parse().map_err(|_| invalid()))
        };

        Ok(Self {
            major: number(1)?,
            minor: number(2)?,
            patch: number(3)?,
        })
    }

    /// Returns true if this version is greater or equal than `version`. Unparseable versions are
    /// never satisfied.
    pub fn at_least(&self, version: &str) -> bool {
        KubeVersion::parse(version).is_ok_and(|min| *self >= min)
    }
}

impl Display for KubeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}
