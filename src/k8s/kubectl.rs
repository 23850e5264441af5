use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::version::Info;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::error::K8sError;
use super::labels::{Labels, HOSTNAME_LABEL_KEY, HOSTNAME_TEST_PREFIX};
use super::version::KubeVersion;
use crate::command::{CommandSpec, Executor};
use crate::manifests::{ManifestAction, ManifestResource};
use crate::utils::retry::{retry, WaitPolicy};

pub const POD_RUNNING: &str = "Running";

const REMOVE_FINALIZERS_PATCH: &str = r#"{"metadata":{"finalizers":[]}}"#;
const ANON_BINDING_NAME: &str = "anon-user-access";

/// Output of `kubectl get <kind> -o json`.
#[derive(Deserialize)]
struct ItemList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

/// Any object listed from the cluster, only its metadata is needed.
#[derive(Deserialize)]
struct AnyObject {
    #[serde(default)]
    metadata: ObjectMeta,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionOutput {
    server_version: Info,
}

/// Drives a cluster through its command line client.
///
/// Failed invocations are classified into [K8sError] variants as soon as they come back, callers
/// only ever match on kinds.
pub struct Kubectl<E> {
    executor: Arc<E>,
    binary: String,
    wait: WaitPolicy,
}

impl<E: Executor> Kubectl<E> {
    pub fn new(executor: Arc<E>, binary: impl Into<String>, wait: WaitPolicy) -> Self {
        Self {
            executor,
            binary: binary.into(),
            wait,
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn executor(&self) -> Arc<E> {
        self.executor.clone()
    }

    fn run<I, A>(&self, args: I) -> Result<String, K8sError>
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        let command = CommandSpec::new(self.binary.as_str(), args);
        debug!("running `{command}`");
        Ok(self.executor.run(&command)?)
    }

    fn run_with_stdin<I, A>(&self, stdin: &str, args: I) -> Result<String, K8sError>
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        let command = CommandSpec::new(self.binary.as_str(), args).with_stdin(stdin);
        debug!("running `{command}` with manifest on stdin");
        Ok(self.executor.run(&command)?)
    }

    fn list<T: DeserializeOwned>(&self, args: &[&str]) -> Result<Vec<T>, K8sError> {
        let output = self.run(args.iter().copied())?;
        let list: ItemList<T> = serde_json::from_str(&output)?;
        Ok(list.items)
    }

    pub fn create(&self, manifest: &str) -> Result<(), K8sError> {
        self.run_with_stdin(manifest, ["create", "-f", "-"])
            .map(drop)
    }

    pub fn delete(&self, manifest: &str) -> Result<(), K8sError> {
        self.run_with_stdin(manifest, ["delete", "-f", "-"])
            .map(drop)
    }

    pub fn apply(&self, resource: &ManifestResource) -> Result<(), K8sError> {
        match resource.action() {
            ManifestAction::Create => self.create(resource.content()),
            ManifestAction::Delete => self.delete(resource.content()),
        }
    }

    /// Clears the finalizers of a cluster scoped object so its deletion is not blocked.
    pub fn patch_remove_finalizers(&self, kind: &str, name: &str) -> Result<(), K8sError> {
        self.run(["patch", kind, name, "--type=merge", "-p", REMOVE_FINALIZERS_PATCH])
            .map(drop)
    }

    /// Removes every instance of the custom `resource` in all namespaces, clearing their
    /// finalizers first. Returns how many instances were found.
    ///
    /// Unknown resource types and objects that disappear in the meantime are not errors.
    pub fn purge_custom_resources(&self, resource: &str) -> Result<usize, K8sError> {
        let objects =
            match self.list::<AnyObject>(&["get", resource, "--all-namespaces", "-o", "json"]) {
                Err(err) if err.is_not_found() => return Ok(0),
                result => result?,
            };

        for object in objects.iter() {
            let Some(name) = object.metadata.name.as_deref() else {
                continue;
            };
            let mut scope = Vec::new();
            if let Some(namespace) = object.metadata.namespace.as_deref() {
                scope.extend(["-n", namespace]);
            }
            info!("purging {resource} {name}");

            let patch = [
                "patch",
                resource,
                name,
                "--type=merge",
                "-p",
                REMOVE_FINALIZERS_PATCH,
            ];
            match self.run(scope.iter().chain(patch.iter()).copied()) {
                Err(err) if err.is_not_found() => continue,
                result => result?,
            };

            let delete = ["delete", resource, name, "--ignore-not-found", "--wait=false"];
            self.run(scope.iter().chain(delete.iter()).copied())?;
        }

        Ok(objects.len())
    }

    pub fn delete_resources(&self, kind: &str, names: &[&str]) -> Result<(), K8sError> {
        if names.is_empty() {
            return Ok(());
        }
        let mut args = vec!["delete", kind];
        args.extend_from_slice(names);
        args.push("--ignore-not-found");
        self.run(args).map(drop)
    }

    pub fn delete_namespaced(&self, namespace: &str, kind: &str, name: &str) -> Result<(), K8sError> {
        self.run(["-n", namespace, "delete", kind, name, "--ignore-not-found"])
            .map(drop)
    }

    /// Polls until the object is gone. `namespace` is `None` for cluster scoped kinds.
    pub fn wait_for_resource_deletion(
        &self,
        namespace: Option<&str>,
        kind: &str,
        name: &str,
    ) -> Result<(), K8sError> {
        let mut args = Vec::new();
        if let Some(namespace) = namespace {
            args.extend(["-n", namespace]);
        }
        args.extend(["get", kind, name, "-o", "name"]);

        retry(self.wait.attempts, self.wait.interval, || {
            match self.run(args.iter().copied()) {
                Err(err) if err.is_not_found() => Ok(()),
                Err(err) => Err(err),
                Ok(_) => {
                    debug!("{kind} {name} still exists");
                    Err(K8sError::Timeout(format!("deletion of {kind} {name}")))
                }
            }
        })
    }

    /// Deletes the object without waiting in the client and then polls until it is gone. A kind
    /// unknown to the cluster has nothing to delete.
    pub fn delete_resource_and_wait(
        &self,
        namespace: Option<&str>,
        kind: &str,
        name: &str,
    ) -> Result<(), K8sError> {
        let mut args = Vec::new();
        if let Some(namespace) = namespace {
            args.extend(["-n", namespace]);
        }
        args.extend(["delete", kind, name, "--ignore-not-found", "--wait=false"]);
        match self.run(args) {
            Err(err) if err.is_not_found() => {
                debug!("{kind} is not known to the cluster, nothing to delete");
                return Ok(());
            }
            result => result?,
        };
        self.wait_for_resource_deletion(namespace, kind, name)
    }

    /// Creates the namespace, an existing one is reused.
    pub fn create_namespace(&self, name: &str) -> Result<(), K8sError> {
        match self.run(["create", "namespace", name]) {
            Err(err) if err.is_already_exists() => {
                debug!("namespace {name} already exists");
                Ok(())
            }
            result => result.map(drop),
        }
    }

    /// Grants cluster admin to anonymous users, needed by kubeadm based test environments.
    pub fn create_anon_system_cluster_binding(&self) -> Result<(), K8sError> {
        let result = self.run([
            "create",
            "clusterrolebinding",
            ANON_BINDING_NAME,
            "--clusterrole=cluster-admin",
            "--user=system:anonymous",
        ]);
        match result {
            Err(err) if err.is_already_exists() => Ok(()),
            result => result.map(drop),
        }
    }

    pub fn pods(&self, selector: &str, namespace: &str) -> Result<Vec<Pod>, K8sError> {
        self.list(&["-n", namespace, "get", "pods", "-l", selector, "-o", "json"])
    }

    /// Waits until at least `count` pods match `selector`.
    pub fn wait_for_pod_count(
        &self,
        selector: &str,
        namespace: &str,
        count: usize,
    ) -> Result<(), K8sError> {
        info!("waiting for {count} pods with label {selector} in namespace {namespace}");
        retry(self.wait.attempts, self.wait.interval, || {
            let found = self.pods(selector, namespace)?.len();
            if found >= count {
                return Ok(());
            }
            debug!("found {found}/{count} pods with label {selector}");
            Err(K8sError::Timeout(format!(
                "{count} pods with label {selector} in namespace {namespace}"
            )))
        })
    }

    /// Waits until there is at least one pod matching `selector` and all of them are running.
    pub fn wait_for_labeled_pods_to_run(
        &self,
        selector: &str,
        namespace: &str,
    ) -> Result<(), K8sError> {
        retry(self.wait.attempts, self.wait.interval, || {
            let pods = self.pods(selector, namespace)?;
            if !pods.is_empty() && pods.iter().all(|pod| phase(pod) == Some(POD_RUNNING)) {
                return Ok(());
            }
            Err(K8sError::Timeout(format!(
                "pods with label {selector} in namespace {namespace} to run"
            )))
        })
    }

    /// Returns true once every pod of the `app` daemon reaches `expected` phase, false if that
    /// does not happen before the wait policy runs out.
    pub fn is_pod_in_expected_state(&self, app: &str, namespace: &str, expected: &str) -> bool {
        let selector = Labels::app(app).selector();
        let result = retry(self.wait.attempts, self.wait.interval, || {
            let pods = self.pods(&selector, namespace)?;
            if !pods.is_empty() && pods.iter().all(|pod| phase(pod) == Some(expected)) {
                return Ok(());
            }
            Err(K8sError::Timeout(format!("{app} pods to be {expected}")))
        });
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!("pod {app} in namespace {namespace} is not {expected}: {err}");
                false
            }
        }
    }

    pub fn is_pod_running(&self, app: &str, namespace: &str) -> bool {
        self.is_pod_in_expected_state(app, namespace, POD_RUNNING)
    }

    pub fn nodes(&self) -> Result<Vec<Node>, K8sError> {
        self.list(&["get", "nodes", "-o", "json"])
    }

    /// Value of the hostname label of every node.
    pub fn node_hostnames(&self) -> Result<Vec<String>, K8sError> {
        Ok(self
            .nodes()?
            .iter()
            .filter_map(hostname_label)
            .map(str::to_string)
            .collect())
    }

    /// Prefixes the hostname label of every node, so daemons cannot rely on the node name
    /// matching its hostname.
    pub fn change_hostnames(&self) -> Result<(), K8sError> {
        for node in self.nodes()? {
            let (Some(name), Some(hostname)) = (node.metadata.name.as_deref(), hostname_label(&node))
            else {
                continue;
            };
            if hostname.starts_with(HOSTNAME_TEST_PREFIX) {
                continue;
            }
            self.label_hostname(name, &format!("{HOSTNAME_TEST_PREFIX}{hostname}"))?;
        }
        Ok(())
    }

    /// Reverts [Kubectl::change_hostnames].
    pub fn restore_hostnames(&self) -> Result<(), K8sError> {
        for node in self.nodes()? {
            let (Some(name), Some(hostname)) = (node.metadata.name.as_deref(), hostname_label(&node))
            else {
                continue;
            };
            if let Some(original) = hostname.strip_prefix(HOSTNAME_TEST_PREFIX) {
                self.label_hostname(name, original)?;
            }
        }
        Ok(())
    }

    fn label_hostname(&self, node: &str, hostname: &str) -> Result<(), K8sError> {
        info!("setting hostname label of node {node} to {hostname}");
        self.run([
            "label".to_string(),
            "nodes".to_string(),
            node.to_string(),
            format!("{HOSTNAME_LABEL_KEY}={hostname}"),
            "--overwrite".to_string(),
        ])
        .map(drop)
    }

    pub fn server_version(&self) -> Result<KubeVersion, K8sError> {
        let output = self.run(["version", "-o", "json"])?;
        let version: VersionOutput = serde_json::from_str(&output)?;
        KubeVersion::parse(&version.server_version.git_version)
    }

    /// Writes the logs of the pods of the `app` daemon to `<dir>/<prefix>_<pod>[_<container>].log`
    /// and returns the written paths. A pod whose logs cannot be read is skipped.
    pub fn collect_pod_logs(
        &self,
        app: &str,
        namespace: &str,
        dir: &Path,
        prefix: &str,
        container: Option<&str>,
    ) -> Result<Vec<PathBuf>, K8sError> {
        let selector = Labels::app(app).selector();
        fs::create_dir_all(dir)?;

        let mut written = Vec::new();
        for pod in self.pods(&selector, namespace)? {
            let Some(name) = pod.metadata.name.as_deref() else {
                continue;
            };
            let mut args = vec!["-n", namespace, "logs", name];
            if let Some(container) = container {
                args.extend(["-c", container]);
            }
            let content = match self.run(args) {
                Ok(content) => content,
                Err(err) => {
                    warn!("could not read logs of pod {name}: {err}");
                    continue;
                }
            };

            let file_name = match container {
                Some(container) => format!("{prefix}_{name}_{container}.log"),
                None => format!("{prefix}_{name}.log"),
            };
            let path = dir.join(file_name);
            fs::write(&path, content)?;
            written.push(path);
        }
        Ok(written)
    }
}

fn phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref().and_then(|status| status.phase.as_deref())
}

fn hostname_label(node: &Node) -> Option<&str> {
    node.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(HOSTNAME_LABEL_KEY))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;

    use super::*;
    use crate::command::test::failed;
    use crate::command::MockExecutor;

    const PODS: &str = r#"{
  "apiVersion": "v1",
  "kind": "List",
  "items": [
    {
      "apiVersion": "v1",
      "kind": "Pod",
      "metadata": {"name": "rook-ceph-osd-0-abc", "namespace": "rook-ceph"},
      "status": {"phase": "Running"}
    },
    {
      "apiVersion": "v1",
      "kind": "Pod",
      "metadata": {"name": "rook-ceph-osd-1-def", "namespace": "rook-ceph"},
      "status": {"phase": "Pending"}
    }
  ]
}"#;

    const RUNNING_POD: &str = r#"{
  "items": [
    {
      "apiVersion": "v1",
      "kind": "Pod",
      "metadata": {"name": "rook-ceph-tools-xyz", "namespace": "rook-ceph"},
      "status": {"phase": "Running"}
    }
  ]
}"#;

    const NODES: &str = r#"{
  "items": [
    {
      "apiVersion": "v1",
      "kind": "Node",
      "metadata": {"name": "node-a", "labels": {"kubernetes.io/hostname": "node-a"}}
    },
    {
      "apiVersion": "v1",
      "kind": "Node",
      "metadata": {
        "name": "node-b",
        "labels": {"kubernetes.io/hostname": "test-prefix-this-is-a-very-long-hostname-node-b"}
      }
    }
  ]
}"#;

    const CLUSTERS: &str = r#"{
  "items": [
    {
      "apiVersion": "ceph.rook.io/v1",
      "kind": "CephCluster",
      "metadata": {"name": "old-cluster", "namespace": "old-ns", "finalizers": ["cephcluster.ceph.rook.io"]}
    }
  ]
}"#;

    fn kubectl(executor: MockExecutor) -> Kubectl<MockExecutor> {
        Kubectl::new(
            Arc::new(executor),
            "kubectl",
            WaitPolicy::new(3, Duration::from_millis(1)),
        )
    }

    #[test]
    fn create_sends_manifest_on_stdin() {
        let mut executor = MockExecutor::new();
        executor
            .expect_run()
            .withf(|cmd| {
                cmd.program == "kubectl"
                    && cmd.has_args(&["create", "-f", "-"])
                    && cmd.stdin.as_deref() == Some("kind: Namespace")
            })
            .once()
            .returning(|_| Ok(String::new()));

        kubectl(executor).create("kind: Namespace").unwrap();
    }

    #[test]
    fn apply_follows_the_resource_action() {
        let mut executor = MockExecutor::new();
        executor.should_run(&["delete", "-f", "-"], "deleted");

        let resource = ManifestResource::create("kind: Namespace").to_delete();
        kubectl(executor).apply(&resource).unwrap();
    }

    #[test]
    fn conflicts_are_classified() {
        let mut executor = MockExecutor::new();
        executor.should_fail(
            &["create", "-f", "-"],
            r#"Error from server (AlreadyExists): customresourcedefinitions "cephclusters.ceph.rook.io" already exists"#,
        );

        let err = kubectl(executor).create("kind: CustomResourceDefinition").unwrap_err();
        assert!(err.is_already_exists());
    }

    #[test]
    fn finalizers_are_removed_with_a_merge_patch() {
        let mut executor = MockExecutor::new();
        executor.should_run(
            &[
                "patch",
                "crd",
                "cephclusters.ceph.rook.io",
                "--type=merge",
                "-p",
                r#"{"metadata":{"finalizers":[]}}"#,
            ],
            "patched",
        );

        kubectl(executor)
            .patch_remove_finalizers("crd", "cephclusters.ceph.rook.io")
            .unwrap();
    }

    #[test]
    fn purge_clears_finalizers_then_deletes_every_instance() {
        let mut executor = MockExecutor::new();
        executor.should_run(
            &["get", "cephclusters.ceph.rook.io", "--all-namespaces"],
            CLUSTERS,
        );
        executor.should_run(
            &["-n", "old-ns", "patch", "cephclusters.ceph.rook.io", "old-cluster"],
            "patched",
        );
        executor.should_run(
            &["-n", "old-ns", "delete", "cephclusters.ceph.rook.io", "old-cluster"],
            "deleted",
        );

        let purged = kubectl(executor)
            .purge_custom_resources("cephclusters.ceph.rook.io")
            .unwrap();
        assert_eq!(1, purged);
    }

    #[test]
    fn purge_of_unknown_resource_type_is_a_noop() {
        let mut executor = MockExecutor::new();
        executor.should_fail(
            &["get", "cephclusters.ceph.rook.io"],
            r#"error: the server doesn't have a resource type "cephclusters""#,
        );

        let purged = kubectl(executor)
            .purge_custom_resources("cephclusters.ceph.rook.io")
            .unwrap();
        assert_eq!(0, purged);
    }

    #[test]
    fn purge_skips_objects_removed_in_the_meantime() {
        let mut executor = MockExecutor::new();
        executor.should_run(&["get", "cephclusters.ceph.rook.io"], CLUSTERS);
        executor.should_fail(
            &["patch", "cephclusters.ceph.rook.io", "old-cluster"],
            r#"Error from server (NotFound): cephclusters.ceph.rook.io "old-cluster" not found"#,
        );

        let purged = kubectl(executor)
            .purge_custom_resources("cephclusters.ceph.rook.io")
            .unwrap();
        assert_eq!(1, purged);
    }

    #[test]
    fn existing_namespace_is_reused() {
        let mut executor = MockExecutor::new();
        executor.should_fail(
            &["create", "namespace", "rook-ceph"],
            r#"Error from server (AlreadyExists): namespaces "rook-ceph" already exists"#,
        );
        kubectl(executor).create_namespace("rook-ceph").unwrap();

        let mut executor = MockExecutor::new();
        executor.should_fail(&["create", "namespace", "rook-ceph"], "forbidden");
        assert_matches!(
            kubectl(executor).create_namespace("rook-ceph"),
            Err(K8sError::Command(_))
        );
    }

    #[test]
    fn pods_are_parsed() {
        let mut executor = MockExecutor::new();
        executor.should_run(
            &["-n", "rook-ceph", "get", "pods", "-l", "app=rook-ceph-osd"],
            PODS,
        );

        let pods = kubectl(executor)
            .pods("app=rook-ceph-osd", "rook-ceph")
            .unwrap();
        let phases: Vec<_> = pods.iter().map(phase).collect();
        assert_eq!(vec![Some("Running"), Some("Pending")], phases);
    }

    #[test]
    fn wait_for_pod_count_polls_until_enough_pods() {
        let mut executor = MockExecutor::new();
        let mut calls = 0;
        executor
            .expect_run()
            .withf(|cmd| cmd.has_args(&["get", "pods"]))
            .times(2)
            .returning(move |_| {
                calls += 1;
                if calls == 1 {
                    Ok(r#"{"items": []}"#.to_string())
                } else {
                    Ok(PODS.to_string())
                }
            });

        kubectl(executor)
            .wait_for_pod_count("app=rook-ceph-osd", "rook-ceph", 2)
            .unwrap();
    }

    #[test]
    fn wait_for_pod_count_times_out() {
        let mut executor = MockExecutor::new();
        executor
            .expect_run()
            .times(3)
            .returning(|_| Ok(r#"{"items": []}"#.to_string()));

        assert_matches!(
            kubectl(executor).wait_for_pod_count("app=rook-ceph-mon", "rook-ceph", 3),
            Err(K8sError::Timeout(_))
        );
    }

    #[test]
    fn labeled_pods_must_all_run() {
        let mut executor = MockExecutor::new();
        executor
            .expect_run()
            .times(3)
            .returning(|_| Ok(PODS.to_string()));

        assert_matches!(
            kubectl(executor).wait_for_labeled_pods_to_run("app=rook-ceph-osd", "rook-ceph"),
            Err(K8sError::Timeout(_))
        );
    }

    #[test]
    fn pod_running() {
        let mut executor = MockExecutor::new();
        executor.should_run(&["-l", "app=rook-ceph-tools"], RUNNING_POD);
        assert!(kubectl(executor).is_pod_running("rook-ceph-tools", "rook-ceph"));

        let mut executor = MockExecutor::new();
        executor
            .expect_run()
            .times(3)
            .returning(|cmd| Err(failed(cmd, "connection refused")));
        assert!(!kubectl(executor).is_pod_running("rook-ceph-tools", "rook-ceph"));
    }

    #[test]
    fn wait_for_deletion_ends_on_not_found() {
        let mut executor = MockExecutor::new();
        let mut calls = 0;
        executor
            .expect_run()
            .withf(|cmd| cmd.has_args(&["get", "cephcluster", "rook-ceph"]))
            .times(2)
            .returning(move |cmd| {
                calls += 1;
                if calls == 1 {
                    Ok("cephcluster.ceph.rook.io/rook-ceph".to_string())
                } else {
                    Err(failed(
                        cmd,
                        r#"Error from server (NotFound): cephclusters.ceph.rook.io "rook-ceph" not found"#,
                    ))
                }
            });

        kubectl(executor)
            .wait_for_resource_deletion(Some("rook-ceph"), "cephcluster", "rook-ceph")
            .unwrap();
    }

    #[test]
    fn delete_resource_and_wait_of_cluster_scoped_kind() {
        let mut executor = MockExecutor::new();
        executor.should_run(&["delete", "namespace", "rook-ceph", "--ignore-not-found"], "");
        executor.should_fail(
            &["get", "namespace", "rook-ceph"],
            r#"Error from server (NotFound): namespaces "rook-ceph" not found"#,
        );

        kubectl(executor)
            .delete_resource_and_wait(None, "namespace", "rook-ceph")
            .unwrap();
    }

    #[test]
    fn delete_resource_and_wait_of_unknown_kind() {
        let mut executor = MockExecutor::new();
        executor.should_fail(
            &["-n", "rook-ceph", "delete", "cephcluster", "rook-ceph"],
            r#"error: the server doesn't have a resource type "cephcluster""#,
        );

        kubectl(executor)
            .delete_resource_and_wait(Some("rook-ceph"), "cephcluster", "rook-ceph")
            .unwrap();
    }

    #[test]
    fn delete_resources_lists_all_names() {
        let mut executor = MockExecutor::new();
        executor.should_run(
            &["delete", "crd", "a.ceph.rook.io", "b.ceph.rook.io", "--ignore-not-found"],
            "",
        );
        kubectl(executor)
            .delete_resources("crd", &["a.ceph.rook.io", "b.ceph.rook.io"])
            .unwrap();

        // nothing to delete, nothing to run
        kubectl(MockExecutor::new())
            .delete_resources("crd", &[])
            .unwrap();
    }

    #[test]
    fn node_hostnames_come_from_labels() {
        let mut executor = MockExecutor::new();
        executor.should_run(&["get", "nodes"], NODES);

        assert_eq!(
            vec![
                "node-a".to_string(),
                format!("{HOSTNAME_TEST_PREFIX}node-b")
            ],
            kubectl(executor).node_hostnames().unwrap()
        );
    }

    #[test]
    fn change_hostnames_only_prefixes_unchanged_nodes() {
        let mut executor = MockExecutor::new();
        executor.should_run(&["get", "nodes"], NODES);
        executor
            .expect_run()
            .withf(|cmd| {
                cmd.has_args(&[
                    "label",
                    "nodes",
                    "node-a",
                    "kubernetes.io/hostname=test-prefix-this-is-a-very-long-hostname-node-a",
                    "--overwrite",
                ])
            })
            .once()
            .returning(|_| Ok("node/node-a labeled".to_string()));

        kubectl(executor).change_hostnames().unwrap();
    }

    #[test]
    fn restore_hostnames_strips_the_prefix() {
        let mut executor = MockExecutor::new();
        executor.should_run(&["get", "nodes"], NODES);
        executor.should_run(
            &["label", "nodes", "node-b", "kubernetes.io/hostname=node-b"],
            "node/node-b labeled",
        );

        kubectl(executor).restore_hostnames().unwrap();
    }

    #[test]
    fn server_version_is_parsed() {
        let mut executor = MockExecutor::new();
        executor.should_run(
            &["version", "-o", "json"],
            r#"{
  "clientVersion": {"major": "1", "minor": "28", "gitVersion": "v1.28.2", "gitCommit": "", "gitTreeState": "", "buildDate": "", "goVersion": "", "compiler": "", "platform": ""},
  "serverVersion": {"major": "1", "minor": "13", "gitVersion": "v1.13.4", "gitCommit": "", "gitTreeState": "", "buildDate": "", "goVersion": "", "compiler": "", "platform": ""}
}"#,
        );

        let version = kubectl(executor).server_version().unwrap();
        assert_eq!(KubeVersion::parse("v1.13.4").unwrap(), version);
        assert!(version.at_least("v1.13.0"));
    }

    #[test]
    fn collected_logs_are_written_per_pod() {
        let dir = tempfile::tempdir().unwrap();
        let mut executor = MockExecutor::new();
        executor.should_run(&["get", "pods", "-l", "app=rook-ceph-osd"], PODS);
        executor.should_run(&["logs", "rook-ceph-osd-0-abc"], "osd 0 up");
        executor.should_fail(&["logs", "rook-ceph-osd-1-def"], "container is pending");

        let written = kubectl(executor)
            .collect_pod_logs("rook-ceph-osd", "rook-ceph", dir.path(), "setup", None)
            .unwrap();

        let expected = dir.path().join("setup_rook-ceph-osd-0-abc.log");
        assert_eq!(vec![expected.clone()], written);
        assert_eq!("osd 0 up", fs::read_to_string(expected).unwrap());
    }
}
