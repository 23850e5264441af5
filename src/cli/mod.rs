pub mod error;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};

use crate::command::ProcessExecutor;
use crate::config::InstallerConfig;
use crate::installer::{operator_namespace, system_namespace, CephInstaller, InstallOptions};
use crate::manifests::RookManifests;

pub use error::CliError;

const DEFAULT_NAMESPACE: &str = "rook-ceph";

/// Installs Rook and a Ceph cluster on a Kubernetes cluster for end to end tests.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)] // Read from `Cargo.toml`
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the YAML config file, defaults are used when not set
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level upperbound
    #[arg(long, global = true, default_value = "info")]
    pub log_level: Level,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install the operator, a cluster and its toolbox
    Install(InstallArgs),

    /// Remove clusters, the operator and their data
    Uninstall(UninstallArgs),

    /// Write the logs of every Rook daemon to the logs dir
    GatherLogs(GatherLogsArgs),

    /// Print the server version and the health of a cluster
    Status {
        /// Namespace of the cluster
        #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
        namespace: String,
    },
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Namespace of the cluster, the operator goes to `<namespace>-system` unless `--helm` is set
    #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Object store backend of the OSDs
    #[arg(long, default_value = "bluestore")]
    pub store_type: String,

    /// Install the operator from the local chart repository
    #[arg(long)]
    pub helm: bool,

    /// Use the devices of the nodes instead of directories
    #[arg(long)]
    pub use_devices: bool,

    #[arg(long, default_value_t = 1)]
    pub mons: usize,

    #[arg(long)]
    pub allow_multiple_mons_per_node: bool,

    #[arg(long, default_value_t = 0)]
    pub rbd_mirror_workers: usize,

    /// Attempts to create the CRDs when they are left over from a previous run
    #[arg(long, value_parser = parse_attempts)]
    pub crd_max_attempts: Option<usize>,

    /// Delay between CRD creation attempts
    #[arg(long, value_parser = parse_duration_arg)]
    pub crd_retry_delay: Option<Duration>,
}

#[derive(Args, Debug)]
pub struct UninstallArgs {
    /// Namespaces of the clusters to remove
    #[arg(short, long, num_args = 1.., default_values_t = [DEFAULT_NAMESPACE.to_string()])]
    pub namespaces: Vec<String>,

    /// Namespace of the operator. Defaults to `<first namespace>-system`, or to the first
    /// namespace with `--helm`
    #[arg(long)]
    pub system_namespace: Option<String>,

    /// The operator was installed from the local chart repository
    #[arg(long)]
    pub helm: bool,
}

#[derive(Args, Debug)]
pub struct GatherLogsArgs {
    #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Prefix of the written log files
    #[arg(long, default_value = "manual")]
    pub test_name: String,

    /// Overrides the logs dir of the config
    #[arg(long)]
    pub logs_dir: Option<PathBuf>,
}

// helper needed because the arguments from the duration_str's parse function and the one expected by the clap
// `value_parser` argument have incompatible lifetimes.
fn parse_duration_arg(arg: &str) -> Result<Duration, String> {
    duration_str::parse(arg).map_err(|err| err.to_string())
}

fn parse_attempts(arg: &str) -> Result<usize, String> {
    match arg.parse::<usize>() {
        Ok(0) => Err("at least one attempt is needed".to_string()),
        Ok(attempts) => Ok(attempts),
        Err(err) => Err(err.to_string()),
    }
}

type Installer = CephInstaller<ProcessExecutor, RookManifests>;

fn installer(config: InstallerConfig) -> Installer {
    let manifests = RookManifests::new(&config.rook_version);
    CephInstaller::new(Arc::new(ProcessExecutor), manifests, config)
}

/// Runs the parsed command.
pub fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = InstallerConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Install(args) => {
            if let Some(attempts) = args.crd_max_attempts {
                config.crd_retry.max_attempts = attempts;
            }
            if let Some(delay) = args.crd_retry_delay {
                config.crd_retry.delay = delay;
            }
            install(installer(config), args)
        }
        Command::Uninstall(args) => uninstall(installer(config), args),
        Command::GatherLogs(args) => {
            if let Some(logs_dir) = args.logs_dir.clone() {
                config.logs_dir = logs_dir;
            }
            let installer = installer(config);
            let written = installer.gather_all_logs(
                &args.namespace,
                &system_namespace(&args.namespace),
                &args.test_name,
            );
            info!("wrote {} log files", written.len());
            Ok(())
        }
        Command::Status { namespace } => status(installer(config), &namespace),
    }
}

fn install(installer: Installer, args: InstallArgs) -> Result<(), CliError> {
    let options = InstallOptions {
        namespace: args.namespace,
        store_type: args.store_type,
        helm: args.helm,
        use_devices: args.use_devices,
        mons: args.mons,
        allow_multiple_mons_per_node: args.allow_multiple_mons_per_node,
        rbd_mirror_workers: args.rbd_mirror_workers,
    };

    if installer.install(&options)? {
        Ok(())
    } else {
        Err(CliError::Command(
            "the rook operator is not running, its logs were gathered".to_string(),
        ))
    }
}

fn uninstall(installer: Installer, args: UninstallArgs) -> Result<(), CliError> {
    let Some(first) = args.namespaces.first() else {
        return Err(CliError::Precondition(
            "at least one namespace is needed".to_string(),
        ));
    };
    let system_ns = args
        .system_namespace
        .clone()
        .unwrap_or_else(|| operator_namespace(args.helm, first));
    let namespaces: Vec<&str> = args.namespaces.iter().map(String::as_str).collect();

    Ok(installer.uninstall_from_namespaces(args.helm, &system_ns, &namespaces)?)
}

fn status(installer: Installer, namespace: &str) -> Result<(), CliError> {
    let Some(version) = installer.k8s_version() else {
        return Err(CliError::Precondition(
            "the cluster cannot be reached".to_string(),
        ));
    };
    println!("kubernetes: {version}");

    let health = installer
        .ceph_admin(namespace)
        .health()
        .map_err(|err| CliError::Command(err.to_string()))?;
    println!("ceph ({namespace}): {health}");
    Ok(())
}
