use std::collections::BTreeMap;

pub const APP_LABEL_KEY: &str = "app";
pub const HOSTNAME_LABEL_KEY: &str = "kubernetes.io/hostname";

/// Prefix added to the hostname label of every node so daemons cannot assume that the node name
/// and its hostname match.
pub const HOSTNAME_TEST_PREFIX: &str = "test-prefix-this-is-a-very-long-hostname-";

/// Collection of labels used to select the pods of a daemon.
#[derive(Default)]
pub struct Labels(BTreeMap<String, String>);

impl Labels {
    pub fn new() -> Self {
        Labels(BTreeMap::new())
    }

    /// Labels set by the operator on every pod of the `app` daemon.
    pub fn app(app: &str) -> Self {
        Self::new().with(APP_LABEL_KEY, app)
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }

    /// Prints a label selector that matches all labels in the set.
    pub fn selector(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::{Labels, APP_LABEL_KEY};

    #[test]
    fn selector() {
        assert_eq!("app=rook-ceph-osd", Labels::app("rook-ceph-osd").selector());
        assert_eq!(
            format!("{APP_LABEL_KEY}=rook-ceph-mon,mon=a"),
            Labels::app("rook-ceph-mon").with("mon", "a").selector()
        );
        assert_eq!("", Labels::new().selector());
    }
}
