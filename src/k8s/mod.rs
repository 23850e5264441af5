pub mod error;
pub mod kubectl;
pub mod labels;
pub mod version;

pub use error::{ErrorKind, K8sError};
pub use kubectl::Kubectl;
pub use version::KubeVersion;
