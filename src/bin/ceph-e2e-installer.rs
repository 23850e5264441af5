use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use ceph_e2e_installer::cli::{self, Cli, CliError};
use ceph_e2e_installer::logging::Logging;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = Logging::try_init(cli.log_level) {
        eprintln!("Failed to initialize logging: {err}");
        return CliError::from(err).into();
    }

    match cli::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            err.into()
        }
    }
}
