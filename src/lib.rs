pub mod ceph;
pub mod cli;
pub mod command;
pub mod config;
pub mod helm;
pub mod installer;
pub mod k8s;
pub mod logging;
pub mod manifests;
pub mod provision;
pub mod utils;
