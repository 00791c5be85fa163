// error.rs — API-boundary failures
//
// Problems inside a mod are diagnostics; these are the failures that stop
// a load before decoding starts (unreadable directories, bad config files).

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("failed to parse {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing configuration file: {}", .0.display())]
    MissingConfig(PathBuf),

    #[error("invalid variable assignment '{0}': expected NAME=VALUE")]
    InvalidAssignment(String),
}

impl LoadError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LoadError::Io {
            path: path.into(),
            source,
        }
    }
}
