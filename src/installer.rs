//! Installs and removes Rook and a Ceph cluster for end to end tests.

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::ceph::CephAdmin;
use crate::command::{Executor, ToolboxExecutor};
use crate::config::InstallerConfig;
use crate::helm::{HelmError, HelmHelper};
use crate::k8s::labels::Labels;
use crate::k8s::{K8sError, KubeVersion, Kubectl};
use crate::manifests::{
    CephManifests, CephVersionSpec, ClusterSettings, ManifestResource, CEPH_CLUSTER_CRD, ROOK_CRDS,
};
use crate::provision::{ClusterManager, FinalizerTarget, ProvisionError, Provisioner};

pub const HELM_CHART_NAME: &str = "local/rook-ceph";
pub const HELM_RELEASE_NAME: &str = "rook-ceph";
pub const OPERATOR_APP: &str = "rook-ceph-operator";
pub const TOOLBOX_APP: &str = "rook-ceph-tools";
pub const TEST_DIR_NAME: &str = "rook-test";

const MON_APP: &str = "rook-ceph-mon";
const OSD_APP: &str = "rook-ceph-osd";
const RBD_MIRROR_APP: &str = "rook-ceph-rbd-mirror";

/// Rook release whose daemons still rely on node name and hostname being the same.
const ROOK_V0_9: &str = "v0.9";
const HOSTNAME_CHANGE_MIN_K8S: &str = "v1.13.0";

const CONFIG_INIT_CONTAINER: &str = "config-init";
const SYSTEM_LOG_APPS: [&str; 3] = [OPERATOR_APP, "rook-ceph-agent", "rook-discover"];
const CLUSTER_LOG_APPS: [&str; 6] = [
    "rook-ceph-mgr",
    MON_APP,
    OSD_APP,
    "rook-ceph-osd-prepare",
    "rook-ceph-rgw",
    "rook-ceph-mds",
];
const CONFIG_INIT_LOG_APPS: [&str; 5] = [
    "rook-ceph-mgr",
    MON_APP,
    OSD_APP,
    "rook-ceph-rgw",
    "rook-ceph-mds",
];

/// Objects created by the operator in its namespace that are not part of its manifest.
const OPERATOR_NAMESPACED_LEFTOVERS: [(&str, &str); 5] = [
    ("rolebinding", "rook-ceph-system"),
    ("serviceaccount", "rook-ceph-system"),
    ("role", "rook-ceph-system"),
    ("configmap", "csi-rbd-config"),
    ("configmap", "csi-cephfs-config"),
];

/// Cluster scoped objects created by the operator that are not part of its manifest.
const OPERATOR_CLUSTER_LEFTOVERS: [(&str, &str); 14] = [
    ("clusterrolebinding", "rook-ceph-global"),
    ("clusterrole", "rook-ceph-cluster-mgmt"),
    ("clusterrole", "rook-ceph-mgr-cluster"),
    ("clusterrole", "rook-ceph-global"),
    ("clusterrolebinding", "rbd-csi-attacher-role"),
    ("clusterrole", "rbd-external-attacher-runner"),
    ("clusterrolebinding", "rbd-csi-nodeplugin"),
    ("clusterrole", "rbd-csi-nodeplugin"),
    ("clusterrolebinding", "rbd-csi-provisioner-role"),
    ("clusterrole", "rbd-external-provisioner-runner"),
    ("clusterrolebinding", "cephfs-csi-nodeplugin"),
    ("clusterrole", "cephfs-csi-nodeplugin"),
    ("clusterrolebinding", "cephfs-csi-provisioner-role"),
    ("clusterrole", "cephfs-external-provisioner-runner"),
];

#[derive(Error, Debug)]
pub enum InstallerError {
    #[error("cluster operation failed: `{0}`")]
    K8s(#[from] K8sError),

    #[error("could not create the rook CRDs: `{0}`")]
    Provision(#[from] ProvisionError),

    #[error("could not install the operator chart: `{0}`")]
    Helm(#[from] HelmError),

    #[error("could not create the test dir: `{0}`")]
    IOError(#[from] std::io::Error),

    #[error("rook toolbox in namespace {0} could not start")]
    ToolboxNotRunning(String),

    #[error("uninstall finished with failures: {}", .0.join("; "))]
    Uninstall(Vec<String>),
}

/// Namespace of the operator managing the cluster in `namespace`.
pub fn system_namespace(namespace: &str) -> String {
    format!("{namespace}-system")
}

/// Namespace the operator of the cluster in `namespace` is installed into. The chart goes to the
/// cluster namespace itself, the manifest to [system_namespace].
pub fn operator_namespace(helm: bool, namespace: &str) -> String {
    if helm {
        namespace.to_string()
    } else {
        system_namespace(namespace)
    }
}

/// Shape of the cluster created by [CephInstaller::create_cluster_with_options].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterOptions {
    pub store_type: String,
    pub use_all_devices: bool,
    pub mons: usize,
    pub allow_multiple_mons_per_node: bool,
    pub rbd_mirror_workers: usize,
    pub ceph_version: CephVersionSpec,
}

impl ClusterOptions {
    pub fn new(store_type: impl Into<String>) -> Self {
        Self {
            store_type: store_type.into(),
            use_all_devices: false,
            mons: 3,
            allow_multiple_mons_per_node: true,
            rbd_mirror_workers: 1,
            ceph_version: CephVersionSpec::luminous(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOptions {
    pub namespace: String,
    pub store_type: String,
    /// Install the operator from the local chart repository instead of its manifest.
    pub helm: bool,
    pub use_devices: bool,
    pub mons: usize,
    pub allow_multiple_mons_per_node: bool,
    pub rbd_mirror_workers: usize,
}

impl InstallOptions {
    pub fn new(namespace: impl Into<String>, store_type: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            store_type: store_type.into(),
            helm: false,
            use_devices: false,
            mons: 1,
            allow_multiple_mons_per_node: false,
            rbd_mirror_workers: 0,
        }
    }
}

/// View of the cluster used to create the CRDs: stale state is every CephCluster instance.
struct CrdCluster<'a, E> {
    kubectl: &'a Kubectl<E>,
}

impl<E: Executor> ClusterManager for CrdCluster<'_, E> {
    fn create(&self, manifest: &str) -> Result<(), K8sError> {
        self.kubectl.create(manifest)
    }

    fn delete(&self, manifest: &str) -> Result<(), K8sError> {
        self.kubectl.delete(manifest)
    }

    fn patch_remove_finalizers(&self, kind: &str, name: &str) -> Result<(), K8sError> {
        self.kubectl.patch_remove_finalizers(kind, name)
    }

    fn purge_stale(&self) -> Result<(), K8sError> {
        let purged = self.kubectl.purge_custom_resources(CEPH_CLUSTER_CRD)?;
        debug!("purged {purged} stale clusters");
        Ok(())
    }
}

/// Wraps installing and uninstalling Rook on a cluster.
pub struct CephInstaller<E, M> {
    kubectl: Kubectl<E>,
    helm: HelmHelper<E>,
    manifests: M,
    config: InstallerConfig,
    ceph_version: CephVersionSpec,
    k8s_version: Option<KubeVersion>,
    change_hostnames: bool,
}

impl<E: Executor, M: CephManifests> CephInstaller<E, M> {
    /// Builds the installer and reads the server version, which decides whether node hostnames
    /// are changed while Rook runs.
    pub fn new(executor: Arc<E>, manifests: M, config: InstallerConfig) -> Self {
        let kubectl = Kubectl::new(executor.clone(), config.kubectl.as_str(), config.pod_wait);
        let helm = HelmHelper::new(executor, config.helm.as_str());

        let k8s_version = kubectl
            .server_version()
            .inspect_err(|err| info!("failed to get the server version: {err}"))
            .ok();
        let change_hostnames = config.rook_version != ROOK_V0_9
            && k8s_version.is_some_and(|version| version.at_least(HOSTNAME_CHANGE_MIN_K8S));

        let ceph_version = CephVersionSpec::from(config.ceph_version);
        info!("Rook version: {}", config.rook_version);
        info!("Ceph version: {} ({})", ceph_version.image, ceph_version.name);

        Self {
            kubectl,
            helm,
            manifests,
            config,
            ceph_version,
            k8s_version,
            change_hostnames,
        }
    }

    pub fn kubectl(&self) -> &Kubectl<E> {
        &self.kubectl
    }

    pub fn k8s_version(&self) -> Option<KubeVersion> {
        self.k8s_version
    }

    /// Creates the Rook CRDs, clearing what a previous run may have left behind.
    pub fn create_ceph_crds(&self) -> Result<(), InstallerError> {
        info!("Creating Rook CRDs");
        let cluster = CrdCluster {
            kubectl: &self.kubectl,
        };
        let resource = ManifestResource::create(self.manifests.rook_crds());

        Provisioner::new(&cluster)
            .with_finalizer_target(FinalizerTarget::new("crd", CEPH_CLUSTER_CRD))
            .provision(&resource, &self.config.crd_retry)?;
        Ok(())
    }

    pub fn create_ceph_operator(&self, namespace: &str) -> Result<(), InstallerError> {
        info!("Starting Rook operator");
        self.create_anon_binding();
        self.create_ceph_crds()?;

        if self.change_hostnames {
            if let Err(err) = self.kubectl.change_hostnames() {
                warn!("could not change the node hostnames: {err}");
            }
        }

        self.kubectl.create(&self.manifests.rook_operator(namespace))?;
        info!("Rook operator started");
        Ok(())
    }

    /// Installs the operator from the chart of the local repository.
    pub fn create_operator_via_helm(&self, namespace: &str) -> Result<(), InstallerError> {
        self.create_anon_binding();
        let version = self.helm.local_chart_version(HELM_CHART_NAME)?;
        self.helm
            .install_chart(HELM_CHART_NAME, HELM_RELEASE_NAME, &version, namespace)?;
        Ok(())
    }

    fn create_anon_binding(&self) {
        if let Err(err) = self.kubectl.create_anon_system_cluster_binding() {
            warn!("could not create the anonymous cluster role binding: {err}");
        }
    }

    pub fn create_toolbox(&self, namespace: &str) -> Result<(), InstallerError> {
        info!("Starting Rook toolbox");
        self.kubectl.create(&self.manifests.rook_toolbox(namespace))?;

        if !self.kubectl.is_pod_running(TOOLBOX_APP, namespace) {
            return Err(InstallerError::ToolboxNotRunning(namespace.to_string()));
        }
        info!("Rook toolbox started");
        Ok(())
    }

    pub fn create_cluster(
        &self,
        namespace: &str,
        system_namespace: &str,
        store_type: &str,
    ) -> Result<(), InstallerError> {
        self.create_cluster_with_options(namespace, system_namespace, &ClusterOptions::new(store_type))
    }

    pub fn create_cluster_with_options(
        &self,
        namespace: &str,
        system_namespace: &str,
        options: &ClusterOptions,
    ) -> Result<(), InstallerError> {
        let data_dir = self.init_test_dir(namespace)?;
        info!(
            namespace,
            system_namespace,
            store_type = %options.store_type,
            data_dir = %data_dir.display(),
            use_all_devices = options.use_all_devices,
            mons = options.mons,
            "creating cluster"
        );

        self.kubectl.create_namespace(namespace)?;

        info!("Creating cluster roles");
        self.kubectl
            .create(&self.manifests.cluster_roles(namespace, system_namespace))?;

        let settings = ClusterSettings {
            namespace: namespace.to_string(),
            store_type: options.store_type.clone(),
            data_dir_host_path: data_dir.to_string_lossy().into_owned(),
            use_all_devices: options.use_all_devices,
            mons: options.mons,
            allow_multiple_mons_per_node: options.allow_multiple_mons_per_node,
            rbd_mirror_workers: options.rbd_mirror_workers,
            ceph_version: options.ceph_version.clone(),
        };
        info!("Starting Rook cluster");
        self.kubectl.create(&self.manifests.rook_cluster(&settings))?;

        self.kubectl
            .wait_for_pod_count(&Labels::app(MON_APP).selector(), namespace, options.mons)?;
        self.kubectl
            .wait_for_pod_count(&Labels::app(OSD_APP).selector(), namespace, 1)?;
        if options.rbd_mirror_workers > 0 {
            self.kubectl.wait_for_pod_count(
                &Labels::app(RBD_MIRROR_APP).selector(),
                namespace,
                options.rbd_mirror_workers,
            )?;
        }

        info!("Rook cluster started");
        self.kubectl
            .wait_for_labeled_pods_to_run(&Labels::app(OSD_APP).selector(), namespace)?;
        Ok(())
    }

    /// Root of every data dir handed to the clusters, removed from all nodes on uninstall.
    pub fn test_root(&self) -> PathBuf {
        self.config.base_test_dir.join(TEST_DIR_NAME)
    }

    /// Data dir of a new cluster in `namespace`.
    ///
    /// The dir is created when the nodes share this host's filesystem, otherwise only a unique
    /// name is composed.
    pub fn init_test_dir(&self, namespace: &str) -> Result<PathBuf, InstallerError> {
        let parent = self.test_root().join(namespace);

        if !self.config.create_base_test_dir {
            return Ok(parent.join(format!("test-{}", rand::random::<u32>())));
        }

        fs::create_dir_all(&parent)?;
        let dir = tempfile::Builder::new()
            .prefix("test-")
            .tempdir_in(&parent)?;
        Ok(dir.into_path())
    }

    pub fn node_hostnames(&self) -> Result<Vec<String>, InstallerError> {
        Ok(self.kubectl.node_hostnames()?)
    }

    /// Installs the operator, a cluster and its toolbox.
    ///
    /// Returns `false` if the operator does not reach the running state, its logs are collected
    /// in that case.
    pub fn install(&self, options: &InstallOptions) -> Result<bool, InstallerError> {
        if self.config.skip_install {
            info!("skipping install, rook is expected to be running already");
            return Ok(true);
        }

        match self.k8s_version {
            Some(version) => info!("Installing rook on k8s {version}"),
            None => info!("Installing rook on k8s of unknown version"),
        }

        let namespace = options.namespace.as_str();
        let operator_namespace = operator_namespace(options.helm, namespace);
        let operator = if options.helm {
            self.create_operator_via_helm(&operator_namespace)
        } else {
            self.create_ceph_operator(&operator_namespace)
        };
        operator.inspect_err(|err| error!("Rook operator not installed: {err}"))?;

        if !self.kubectl.is_pod_running(OPERATOR_APP, &operator_namespace) {
            error!("{OPERATOR_APP} is not running, abort");
            self.collect_logs(OPERATOR_APP, &operator_namespace, "test-setup", None);
            return Ok(false);
        }

        let use_devices = if self.config.force_use_devices {
            info!("Forcing the use of devices");
            true
        } else {
            options.use_devices
        };

        let cluster = ClusterOptions {
            store_type: options.store_type.clone(),
            use_all_devices: use_devices,
            mons: options.mons,
            allow_multiple_mons_per_node: options.allow_multiple_mons_per_node,
            rbd_mirror_workers: options.rbd_mirror_workers,
            ceph_version: self.ceph_version.clone(),
        };
        self.create_cluster_with_options(namespace, &operator_namespace, &cluster)
            .inspect_err(|err| error!("Rook cluster {namespace} not installed: {err}"))?;

        self.create_toolbox(namespace)
            .inspect_err(|err| error!("Rook toolbox in cluster {namespace} not installed: {err}"))?;

        info!("installed rook operator and cluster {namespace}");
        Ok(true)
    }

    pub fn uninstall(&self, helm: bool, namespace: &str) -> Result<(), InstallerError> {
        self.uninstall_from_namespaces(helm, &operator_namespace(helm, namespace), &[namespace])
    }

    /// Removes the clusters of `namespaces`, the operator in `system_namespace` and the data dirs
    /// from every node. `system_namespace` is where the operator was installed, see
    /// [operator_namespace].
    ///
    /// Every step runs even if a previous one failed, all failures are reported together.
    pub fn uninstall_from_namespaces(
        &self,
        helm: bool,
        system_namespace: &str,
        namespaces: &[&str],
    ) -> Result<(), InstallerError> {
        if self.config.skip_install {
            return Ok(());
        }

        info!("Uninstalling Rook");
        let mut failures = Vec::new();

        for namespace in namespaces.iter().copied() {
            let roles = self.manifests.cluster_roles(namespace, system_namespace);
            if let Err(err) = self.kubectl.delete(&roles) {
                debug!("deleting the cluster roles of {namespace} returned an error: {err}");
            }

            record(
                &mut failures,
                &format!("cannot remove cluster {namespace}"),
                self.kubectl
                    .delete_resource_and_wait(Some(namespace), "cephcluster", namespace),
            );
            record(
                &mut failures,
                &format!("cannot delete namespace {namespace}"),
                self.kubectl
                    .delete_resource_and_wait(None, "namespace", namespace),
            );
        }

        info!("removing the operator from namespace {system_namespace}");
        record(
            &mut failures,
            "cannot delete CRDs",
            self.kubectl.delete_resources("crd", &ROOK_CRDS),
        );

        let operator = if helm {
            self.helm
                .uninstall_chart(HELM_RELEASE_NAME, system_namespace)
                .map_err(InstallerError::from)
        } else {
            let operator = ManifestResource::delete(self.manifests.rook_operator(system_namespace));
            self.kubectl
                .apply(&operator)
                .map_err(InstallerError::from)
        };
        record(&mut failures, "cannot uninstall rook-operator", operator);

        self.delete_operator_leftovers(system_namespace);
        info!("done removing the operator from namespace {system_namespace}");

        let host_path = self.test_root();
        info!("removing host data dir {}", host_path.display());
        match self.kubectl.node_hostnames() {
            Ok(nodes) => {
                for node in nodes.iter() {
                    let result = self.cleanup_dir(node, &host_path);
                    info!(
                        "removing {} from node {node}: {result:?}",
                        host_path.display()
                    );
                }
            }
            Err(err) => record(
                &mut failures,
                "cannot get node names",
                Err::<(), _>(err),
            ),
        }

        if self.change_hostnames {
            record(
                &mut failures,
                "cannot restore node hostnames",
                self.kubectl.restore_hostnames(),
            );
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(InstallerError::Uninstall(failures))
        }
    }

    fn delete_operator_leftovers(&self, system_namespace: &str) {
        for (kind, name) in OPERATOR_NAMESPACED_LEFTOVERS {
            if let Err(err) = self.kubectl.delete_namespaced(system_namespace, kind, name) {
                debug!("could not delete {kind} {name}: {err}");
            }
        }
        for (kind, name) in OPERATOR_CLUSTER_LEFTOVERS {
            if let Err(err) = self.kubectl.delete_resources(kind, &[name]) {
                debug!("could not delete {kind} {name}: {err}");
            }
        }
    }

    /// Schedules a pod on `node` that removes `dir`.
    pub fn cleanup_dir(&self, node: &str, dir: &Path) -> Result<(), InstallerError> {
        let pod = self.manifests.cleanup_pod(node, &dir.to_string_lossy());
        Ok(self.kubectl.create(&pod)?)
    }

    /// Writes the logs of every Rook daemon into the logs dir and returns the written files.
    pub fn gather_all_logs(
        &self,
        namespace: &str,
        system_namespace: &str,
        test_name: &str,
    ) -> Vec<PathBuf> {
        info!("Gathering all logs from Rook cluster {namespace}");
        let mut written = Vec::new();
        for app in SYSTEM_LOG_APPS {
            written.extend(self.collect_logs(app, system_namespace, test_name, None));
        }
        for app in CLUSTER_LOG_APPS {
            written.extend(self.collect_logs(app, namespace, test_name, None));
        }
        for app in CONFIG_INIT_LOG_APPS {
            written.extend(self.collect_logs(
                app,
                namespace,
                test_name,
                Some(CONFIG_INIT_CONTAINER),
            ));
        }
        written
    }

    fn collect_logs(
        &self,
        app: &str,
        namespace: &str,
        test_name: &str,
        container: Option<&str>,
    ) -> Vec<PathBuf> {
        let prefix = format!("{}_{test_name}", self.config.host_type);
        self.kubectl
            .collect_pod_logs(app, namespace, &self.config.logs_dir, &prefix, container)
            .unwrap_or_else(|err| {
                warn!("could not gather logs of {app} in namespace {namespace}: {err}");
                Vec::new()
            })
    }

    /// Storage admin commands run in the toolbox of `namespace`.
    pub fn ceph_admin(&self, namespace: &str) -> CephAdmin<ToolboxExecutor<E>> {
        let toolbox =
            ToolboxExecutor::new(self.kubectl.executor(), self.kubectl.binary(), namespace);
        CephAdmin::new(Arc::new(toolbox))
    }
}

fn record<T, D: Display>(failures: &mut Vec<String>, context: &str, result: Result<T, D>) {
    if let Err(err) = result {
        error!("{context}: {err}");
        failures.push(format!("{context}: {err}"));
    }
}
