//! Declarative resources applied to the cluster while installing Rook.
//!
//! Manifests are plain YAML text handed to the cluster cli. They are rendered fresh on every call
//! and never cached.

use std::fmt::{self, Display};

use serde::Deserialize;

pub const CEPH_CLUSTER_CRD: &str = "cephclusters.ceph.rook.io";

/// Custom resource definitions created by the installer, removed on uninstall.
pub const ROOK_CRDS: [&str; 6] = [
    "cephclusters.ceph.rook.io",
    "cephblockpools.ceph.rook.io",
    "cephobjectstores.ceph.rook.io",
    "cephobjectstoreusers.ceph.rook.io",
    "cephfilesystems.ceph.rook.io",
    "volumes.rook.io",
];

pub const LUMINOUS_IMAGE: &str = "ceph/ceph:v12";
pub const MIMIC_IMAGE: &str = "ceph/ceph:v13";

const ROOK_IMAGE_REPOSITORY: &str = "rook/ceph";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestAction {
    Create,
    Delete,
}

/// Serialized description of one or more cluster objects and what to do with them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestResource {
    content: String,
    action: ManifestAction,
}

impl ManifestResource {
    pub fn create(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            action: ManifestAction::Create,
        }
    }

    pub fn delete(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            action: ManifestAction::Delete,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn action(&self) -> ManifestAction {
        self.action
    }

    /// Same objects, scheduled for removal.
    pub fn to_delete(&self) -> Self {
        Self::delete(self.content.clone())
    }
}

/// Ceph release to deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CephRelease {
    #[default]
    Luminous,
    Mimic,
}

impl Display for CephRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CephRelease::Luminous => write!(f, "luminous"),
            CephRelease::Mimic => write!(f, "mimic"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CephVersionSpec {
    pub image: String,
    pub name: CephRelease,
}

impl CephVersionSpec {
    pub fn luminous() -> Self {
        Self {
            image: LUMINOUS_IMAGE.to_string(),
            name: CephRelease::Luminous,
        }
    }

    pub fn mimic() -> Self {
        Self {
            image: MIMIC_IMAGE.to_string(),
            name: CephRelease::Mimic,
        }
    }
}

impl From<CephRelease> for CephVersionSpec {
    fn from(release: CephRelease) -> Self {
        match release {
            CephRelease::Luminous => Self::luminous(),
            CephRelease::Mimic => Self::mimic(),
        }
    }
}

/// Everything that shapes the CephCluster object of a test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSettings {
    pub namespace: String,
    pub store_type: String,
    pub data_dir_host_path: String,
    pub use_all_devices: bool,
    pub mons: usize,
    pub allow_multiple_mons_per_node: bool,
    pub rbd_mirror_workers: usize,
    pub ceph_version: CephVersionSpec,
}

#[cfg_attr(test, mockall::automock)]
pub trait CephManifests {
    fn rook_crds(&self) -> String;
    fn rook_operator(&self, namespace: &str) -> String;
    fn cluster_roles(&self, namespace: &str, system_namespace: &str) -> String;
    fn rook_cluster(&self, settings: &ClusterSettings) -> String;
    fn rook_toolbox(&self, namespace: &str) -> String;
    fn cleanup_pod(&self, node: &str, dir: &str) -> String;
}

/// Manifests of a given Rook release.
#[derive(Debug, Clone)]
pub struct RookManifests {
    rook_image: String,
}

impl RookManifests {
    pub fn new(rook_version: &str) -> Self {
        Self {
            rook_image: format!("{ROOK_IMAGE_REPOSITORY}:{rook_version}"),
        }
    }
}

fn crd(group: &str, kind: &str, plural: &str, singular: &str, short_names: &[&str]) -> String {
    let short_names = if short_names.is_empty() {
        String::new()
    } else {
        format!("\n    shortNames: [{}]", short_names.join(", "))
    };
    format!(
        r#"---
apiVersion: apiextensions.k8s.io/v1
kind: CustomResourceDefinition
metadata:
  name: {plural}.{group}
spec:
  group: {group}
  names:
    kind: {kind}
    listKind: {kind}List
    plural: {plural}
    singular: {singular}{short_names}
  scope: Namespaced
  versions:
    - name: v1
      served: true
      storage: true
      schema:
        openAPIV3Schema:
          type: object
          x-kubernetes-preserve-unknown-fields: true
"#
    )
}

impl CephManifests for RookManifests {
    fn rook_crds(&self) -> String {
        [
            crd("ceph.rook.io", "CephCluster", "cephclusters", "cephcluster", &[]),
            crd(
                "ceph.rook.io",
                "CephBlockPool",
                "cephblockpools",
                "cephblockpool",
                &[],
            ),
            crd(
                "ceph.rook.io",
                "CephObjectStore",
                "cephobjectstores",
                "cephobjectstore",
                &[],
            ),
            crd(
                "ceph.rook.io",
                "CephObjectStoreUser",
                "cephobjectstoreusers",
                "cephobjectuser",
                &["rcou", "objectuser"],
            ),
            crd(
                "ceph.rook.io",
                "CephFilesystem",
                "cephfilesystems",
                "cephfilesystem",
                &[],
            ),
            crd("rook.io", "Volume", "volumes", "volume", &["rv"]),
        ]
        .concat()
    }

    fn rook_operator(&self, namespace: &str) -> String {
        let image = &self.rook_image;
        format!(
            r#"---
apiVersion: v1
kind: Namespace
metadata:
  name: {namespace}
---
apiVersion: v1
kind: ServiceAccount
metadata:
  name: rook-ceph-system
  namespace: {namespace}
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRole
metadata:
  name: rook-ceph-global
rules:
  - apiGroups: ["", "apps", "extensions", "batch", "storage.k8s.io", "ceph.rook.io", "rook.io"]
    resources: ["*"]
    verbs: ["*"]
---
apiVersion: rbac.authorization.k8s.io/v1
kind: ClusterRoleBinding
metadata:
  name: rook-ceph-global
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: ClusterRole
  name: rook-ceph-global
subjects:
  - kind: ServiceAccount
    name: rook-ceph-system
    namespace: {namespace}
---
apiVersion: rbac.authorization.k8s.io/v1
kind: Role
metadata:
  name: rook-ceph-system
  namespace: {namespace}
rules:
  - apiGroups: [""]
    resources: ["pods", "configmaps", "services"]
    verbs: ["get", "list", "watch", "patch", "create", "update", "delete"]
---
apiVersion: rbac.authorization.k8s.io/v1
kind: RoleBinding
metadata:
  name: rook-ceph-system
  namespace: {namespace}
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: Role
  name: rook-ceph-system
subjects:
  - kind: ServiceAccount
    name: rook-ceph-system
    namespace: {namespace}
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: rook-ceph-operator
  namespace: {namespace}
  labels:
    operator: rook
    storage-backend: ceph
spec:
  replicas: 1
  selector:
    matchLabels:
      app: rook-ceph-operator
  template:
    metadata:
      labels:
        app: rook-ceph-operator
    spec:
      serviceAccountName: rook-ceph-system
      containers:
        - name: rook-ceph-operator
          image: {image}
          args: ["ceph", "operator"]
          env:
            - name: ROOK_LOG_LEVEL
              value: INFO
            - name: ROOK_ENABLE_FLEX_DRIVER
              value: "true"
            - name: NODE_NAME
              valueFrom:
                fieldRef:
                  fieldPath: spec.nodeName
            - name: POD_NAMESPACE
              valueFrom:
                fieldRef:
                  fieldPath: metadata.namespace
"#
        )
    }

    fn cluster_roles(&self, namespace: &str, system_namespace: &str) -> String {
        format!(
            r#"---
apiVersion: v1
kind: ServiceAccount
metadata:
  name: rook-ceph-osd
  namespace: {namespace}
---
apiVersion: v1
kind: ServiceAccount
metadata:
  name: rook-ceph-mgr
  namespace: {namespace}
---
apiVersion: rbac.authorization.k8s.io/v1
kind: Role
metadata:
  name: rook-ceph-osd
  namespace: {namespace}
rules:
  - apiGroups: [""]
    resources: ["configmaps"]
    verbs: ["get", "list", "watch", "create", "update", "delete"]
---
apiVersion: rbac.authorization.k8s.io/v1
kind: RoleBinding
metadata:
  name: rook-ceph-osd
  namespace: {namespace}
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: Role
  name: rook-ceph-osd
subjects:
  - kind: ServiceAccount
    name: rook-ceph-osd
    namespace: {namespace}
---
apiVersion: rbac.authorization.k8s.io/v1
kind: RoleBinding
metadata:
  name: rook-ceph-cluster-mgmt
  namespace: {namespace}
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: ClusterRole
  name: rook-ceph-cluster-mgmt
subjects:
  - kind: ServiceAccount
    name: rook-ceph-system
    namespace: {system_namespace}
---
apiVersion: rbac.authorization.k8s.io/v1
kind: RoleBinding
metadata:
  name: rook-ceph-mgr-system
  namespace: {system_namespace}
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: ClusterRole
  name: rook-ceph-mgr-system
subjects:
  - kind: ServiceAccount
    name: rook-ceph-mgr
    namespace: {namespace}
"#
        )
    }

    fn rook_cluster(&self, settings: &ClusterSettings) -> String {
        let ClusterSettings {
            namespace,
            store_type,
            data_dir_host_path,
            use_all_devices,
            mons,
            allow_multiple_mons_per_node,
            rbd_mirror_workers,
            ceph_version,
        } = settings;
        let (image, release) = (&ceph_version.image, ceph_version.name);
        format!(
            r#"---
apiVersion: ceph.rook.io/v1
kind: CephCluster
metadata:
  name: {namespace}
  namespace: {namespace}
spec:
  cephVersion:
    image: {image}
    name: {release}
    allowUnsupported: true
  dataDirHostPath: {data_dir_host_path}
  network:
    hostNetwork: false
  mon:
    count: {mons}
    allowMultiplePerNode: {allow_multiple_mons_per_node}
  dashboard:
    enabled: true
  rbdMirroring:
    workers: {rbd_mirror_workers}
  storage:
    useAllNodes: true
    useAllDevices: {use_all_devices}
    deviceFilter: ""
    config:
      storeType: "{store_type}"
      databaseSizeMB: "1024"
      journalSizeMB: "1024"
  mgr:
    modules:
      - name: pg_autoscaler
"#
        )
    }

    fn rook_toolbox(&self, namespace: &str) -> String {
        let image = &self.rook_image;
        format!(
            r#"---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: rook-ceph-tools
  namespace: {namespace}
  labels:
    app: rook-ceph-tools
spec:
  replicas: 1
  selector:
    matchLabels:
      app: rook-ceph-tools
  template:
    metadata:
      labels:
        app: rook-ceph-tools
    spec:
      dnsPolicy: ClusterFirstWithHostNet
      containers:
        - name: rook-ceph-tools
          image: {image}
          command: ["/tini"]
          args: ["-g", "--", "/usr/local/bin/toolbox.sh"]
          imagePullPolicy: IfNotPresent
          env:
            - name: ROOK_ADMIN_SECRET
              valueFrom:
                secretKeyRef:
                  name: rook-ceph-mon
                  key: admin-secret
          securityContext:
            privileged: true
          volumeMounts:
            - mountPath: /dev
              name: dev
            - mountPath: /sys/bus
              name: sysbus
            - mountPath: /lib/modules
              name: libmodules
            - name: mon-endpoint-volume
              mountPath: /etc/rook
      hostNetwork: true
      volumes:
        - name: dev
          hostPath:
            path: /dev
        - name: sysbus
          hostPath:
            path: /sys/bus
        - name: libmodules
          hostPath:
            path: /lib/modules
        - name: mon-endpoint-volume
          configMap:
            name: rook-ceph-mon-endpoints
            items:
              - key: data
                path: mon-endpoints
"#
        )
    }

    fn cleanup_pod(&self, node: &str, dir: &str) -> String {
        let image = &self.rook_image;
        format!(
            r#"---
apiVersion: batch/v1
kind: Job
metadata:
  generateName: rook-cleanup-
  labels:
    app: rook-cleanup
spec:
  template:
    spec:
      restartPolicy: Never
      nodeSelector:
        kubernetes.io/hostname: {node}
      containers:
        - name: rook-cleanup
          image: {image}
          securityContext:
            privileged: true
          command: ["rm", "-rf", "/scrub{dir}"]
          volumeMounts:
            - name: cleanup
              mountPath: /scrub{dir}
      volumes:
        - name: cleanup
          hostPath:
            path: {dir}
"#
        )
    }
}
