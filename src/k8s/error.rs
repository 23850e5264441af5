use crate::command::CommandError;

const ALREADY_EXISTS_REASON: &str = "AlreadyExists";
const NOT_FOUND_REASON: &str = "NotFound";
const UNKNOWN_RESOURCE_TYPE: &str = "the server doesn't have a resource type";

#[derive(thiserror::Error, Debug)]
pub enum K8sError {
    #[error("resource already exists: `{0}`")]
    AlreadyExists(String),

    #[error("resource not found: `{0}`")]
    NotFound(String),

    #[error("the cluster cli returned an error: `{0}`")]
    Command(CommandError),

    #[error("error deserializing cluster cli output: `{0}`")]
    SerdeJson(#[from] serde_json::Error),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("unexpected server version `{0}`")]
    InvalidVersion(String),

    #[error("io error: `{0}`")]
    IOError(#[from] std::io::Error),
}

/// Failure reasons reported by the cluster that callers may act upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AlreadyExists,
    NotFound,
    Other,
}

impl K8sError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            K8sError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            K8sError::NotFound(_) => ErrorKind::NotFound,
            _ => ErrorKind::Other,
        }
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind() == ErrorKind::AlreadyExists
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Errors from the cli arrive as plain text; the known reasons are translated into kinds here so
/// nothing past this boundary needs to inspect messages.
impl From<CommandError> for K8sError {
    fn from(err: CommandError) -> Self {
        let classified = match err.stderr() {
            Some(stderr) if stderr.contains(ALREADY_EXISTS_REASON) => {
                Some(K8sError::AlreadyExists(stderr.to_string()))
            }
            Some(stderr)
                if stderr.contains(NOT_FOUND_REASON) || stderr.contains(UNKNOWN_RESOURCE_TYPE) =>
            {
                Some(K8sError::NotFound(stderr.to_string()))
            }
            _ => None,
        };
        classified.unwrap_or(K8sError::Command(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn failed(stderr: &str) -> CommandError {
        CommandError::Failed {
            command: "kubectl create -f -".to_string(),
            status: "exit status: 1".to_string(),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn already_exists_is_classified() {
        let err = K8sError::from(failed(
            r#"Error from server (AlreadyExists): error when creating "STDIN": customresourcedefinitions.apiextensions.k8s.io "cephclusters.ceph.rook.io" already exists"#,
        ));
        assert_matches!(err, K8sError::AlreadyExists(_));
        assert!(err.is_already_exists());
    }

    #[test]
    fn not_found_is_classified() {
        let err = K8sError::from(failed(
            r#"Error from server (NotFound): namespaces "rook-ceph" not found"#,
        ));
        assert_eq!(ErrorKind::NotFound, err.kind());

        let err = K8sError::from(failed(
            r#"error: the server doesn't have a resource type "cephclusters""#,
        ));
        assert!(err.is_not_found());
    }

    #[test]
    fn anything_else_stays_opaque() {
        let err = K8sError::from(failed(
            "The connection to the server localhost:8080 was refused",
        ));
        assert_eq!(ErrorKind::Other, err.kind());
        assert!(err.to_string().contains("was refused"));

        let err = K8sError::from(CommandError::IOError(std::io::Error::other("broken pipe")));
        assert_matches!(err, K8sError::Command(CommandError::IOError(_)));
    }
}
