use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error(
        "Unable to find `{argument}` for integration tests (searched: {})",
        display_paths(.searched)
    )]
    DefinitionNotFound {
        argument: String,
        searched: Vec<PathBuf>,
    },

    #[error(
        "There are already existing containers: {}. Remove them with 'docker compose down' \
         before starting this scope, or enable use_running_containers to adopt them",
        .0.join(", ")
    )]
    ContainersAlreadyExist(Vec<String>),

    #[error("docker compose didn't launch any containers for '{0}'")]
    NoContainersLaunched(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Service '{0}' has no containers")]
    ContainerDoesNotExist(String),

    #[error("Container for service '{service}' is not running after {timeout:?} (last state: {state})")]
    ContainerNotRunning {
        service: String,
        state: String,
        timeout: Duration,
    },

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse grouping of errors by who has to act on them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The definition files could not be located
    Definition,
    /// Containers already exist for a scope that expected to start them
    Conflict,
    /// The engine failed to build or start the environment
    BringUp,
    /// A service never reached a usable runtime state
    Readiness,
    Config,
    Io,
}

impl ComposeError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ComposeError::DefinitionNotFound { .. } => ErrorCategory::Definition,
            ComposeError::ContainersAlreadyExist(_) => ErrorCategory::Conflict,
            ComposeError::NoContainersLaunched(_) | ComposeError::Engine(_) => {
                ErrorCategory::BringUp
            }
            ComposeError::ContainerDoesNotExist(_) | ComposeError::ContainerNotRunning { .. } => {
                ErrorCategory::Readiness
            }
            ComposeError::ConfigError(_) => ErrorCategory::Config,
            ComposeError::Io(_) => ErrorCategory::Io,
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, ComposeError>;
