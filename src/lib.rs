// Library interface for compose-fixture
// Scoped docker compose environments for integration tests

pub mod cli;
pub mod clock;
pub mod config;
pub mod engine;
pub mod errors;
pub mod harness;
pub mod identity;
pub mod lifecycle;
pub mod logs;
pub mod network;
pub mod readiness;
pub mod registry;
pub mod scope;

pub use config::Options;
pub use engine::{ContainerEngine, ContainerHandle, EngineFactory, RuntimeState};
pub use errors::{ComposeError, ErrorCategory, Result};
pub use harness::Harness;
pub use identity::EnvironmentKey;
pub use lifecycle::{Environment, Ownership, Release};
pub use network::{ContainerWithEndpoints, NetworkEndpoint};
pub use registry::EnvironmentRegistry;
pub use scope::{ContainerGetter, Scope, ScopeBinder, ScopeSession};
