/// Container engine abstraction - the seam between lifecycle logic and the real runtime
use crate::config::Options;
use crate::engine::ContainerHandle;
use crate::errors::Result;
use crate::identity::EnvironmentKey;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Operations the lifecycle manager needs from a container engine
///
/// One engine instance is bound to one resolved project. Implementations
/// block for the duration of each call; none of these are expected to be
/// cancellable mid-flight.
pub trait ContainerEngine: Send + Sync {
    /// Project name the engine scopes its containers to
    fn project_name(&self) -> &str;

    /// Service names declared by the environment definition
    fn services(&self) -> Result<Vec<String>>;

    /// Build (or pull) the images of the project
    fn build(&self) -> Result<()>;

    /// Start every service detached and return the containers now running
    fn up(&self) -> Result<Vec<ContainerHandle>>;

    /// Stop and remove the project's containers
    fn down(&self, remove_volumes: bool) -> Result<()>;

    /// List containers, optionally for a single service and including stopped ones
    fn containers(
        &self,
        service: Option<&str>,
        include_stopped: bool,
    ) -> Result<Vec<ContainerHandle>>;

    /// Raw log output of a container, limited to entries after `since`
    fn logs(&self, container: &ContainerHandle, since: Option<DateTime<Utc>>) -> Result<Vec<u8>>;
}

/// Opens an engine for a resolved environment key
pub trait EngineFactory: Send + Sync {
    fn open(&self, key: &EnvironmentKey, options: &Options) -> Result<Arc<dyn ContainerEngine>>;
}
