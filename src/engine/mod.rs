pub mod compose;
pub mod inspect;
pub mod traits;

pub use traits::{ContainerEngine, EngineFactory};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Runtime state of a container as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeState {
    Created,
    Running,
    Restarting,
    Paused,
    Exited,
    Dead,
}

impl RuntimeState {
    /// Parse a docker `State.Status` value
    pub fn parse_state(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "created" => Some(RuntimeState::Created),
            "running" => Some(RuntimeState::Running),
            "restarting" => Some(RuntimeState::Restarting),
            "paused" => Some(RuntimeState::Paused),
            "exited" => Some(RuntimeState::Exited),
            "dead" => Some(RuntimeState::Dead),
            // Docker reports "removing" briefly before the container disappears
            "removing" => Some(RuntimeState::Dead),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeState::Created => "created",
            RuntimeState::Running => "running",
            RuntimeState::Restarting => "restarting",
            RuntimeState::Paused => "paused",
            RuntimeState::Exited => "exited",
            RuntimeState::Dead => "dead",
        }
    }
}

impl std::str::FromStr for RuntimeState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse_state(s).ok_or_else(|| format!("Invalid container state: {}", s))
    }
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One host-side binding of a published container port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: String,
}

impl PortBinding {
    pub fn new(host_ip: impl Into<String>, host_port: impl Into<String>) -> Self {
        Self {
            host_ip: host_ip.into(),
            host_port: host_port.into(),
        }
    }
}

/// Read-only snapshot of one container, fetched fresh from the engine
///
/// Snapshots go stale as soon as they are returned. Re-query by service
/// name instead of holding one across a readiness wait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerHandle {
    /// Container name, unique within the environment
    pub name: String,
    /// Compose service the container belongs to
    pub service: String,
    pub state: RuntimeState,
    pub exit_code: Option<i64>,
    /// `"<port>/<protocol>"` to host bindings; an empty list means declared but unpublished
    pub published_ports: BTreeMap<String, Vec<PortBinding>>,
    pub environment: BTreeMap<String, String>,
}

impl ContainerHandle {
    pub fn new(name: impl Into<String>, service: impl Into<String>, state: RuntimeState) -> Self {
        Self {
            name: name.into(),
            service: service.into(),
            state,
            exit_code: None,
            published_ports: BTreeMap::new(),
            environment: BTreeMap::new(),
        }
    }

    /// Builder-style helper to add a published port binding
    pub fn with_port(mut self, container_port: &str, host_ip: &str, host_port: &str) -> Self {
        self.published_ports
            .entry(container_port.to_string())
            .or_default()
            .push(PortBinding::new(host_ip, host_port));
        self
    }

    /// Builder-style helper to declare a port without publishing it
    pub fn with_unpublished_port(mut self, container_port: &str) -> Self {
        self.published_ports
            .entry(container_port.to_string())
            .or_default();
        self
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.environment.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_exit_code(mut self, code: i64) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn is_running(&self) -> bool {
        self.state == RuntimeState::Running
    }

    /// Short state description in the style of `docker compose ps`
    pub fn human_readable_state(&self) -> String {
        match self.state {
            RuntimeState::Running => "Up".to_string(),
            RuntimeState::Restarting => "Restarting".to_string(),
            RuntimeState::Paused => "Paused".to_string(),
            RuntimeState::Created => "Created".to_string(),
            RuntimeState::Dead => "Dead".to_string(),
            RuntimeState::Exited => match self.exit_code {
                Some(code) => format!("Exit {}", code),
                None => "Exit".to_string(),
            },
        }
    }
}
