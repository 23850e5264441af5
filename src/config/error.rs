use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: `{source}`")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{0}`")]
    InvalidYamlConfiguration(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
