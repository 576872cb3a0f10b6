/// Scope binding: setup/teardown pairs that share environments across test scopes
///
/// A [`ScopeBinder`] turns the run's options into [`ScopeSession`]s. Setup
/// resolves the environment key, fetches or creates the environment through
/// the registry (building it once per run), and acquires it for the scope.
/// Teardown flushes container logs and releases the environment, which stops
/// it only when this run started it and no other scope still holds it.
///
/// A session tears itself down exactly once: explicitly through
/// [`ScopeSession::teardown`], or from `Drop` when a test panics first.
use crate::clock::{Clock, SystemClock};
use crate::config::Options;
use crate::engine::{ContainerEngine, ContainerHandle, EngineFactory};
use crate::errors::{ComposeError, Result};
use crate::identity::{self, EnvironmentKey};
use crate::lifecycle::{AcquirePolicy, Environment, Ownership, Release};
use crate::logs::LogSink;
use crate::network::ContainerWithEndpoints;
use crate::readiness::ReadinessWaiter;
use crate::registry::EnvironmentRegistry;
use chrono::{DateTime, Utc};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Test-harness lifetime a session is bound to, narrowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    Test,
    Class,
    Module,
    Run,
}

impl Scope {
    pub const ALL: [Scope; 4] = [Scope::Test, Scope::Class, Scope::Module, Scope::Run];

    /// Parse a scope name; pytest-style `function` and `session` are accepted
    pub fn parse_scope(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "test" | "function" => Some(Scope::Test),
            "class" => Some(Scope::Class),
            "module" => Some(Scope::Module),
            "run" | "session" => Some(Scope::Run),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Test => "test",
            Scope::Class => "class",
            Scope::Module => "module",
            Scope::Run => "run",
        }
    }
}

impl std::str::FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse_scope(s).ok_or_else(|| format!("Invalid scope: {}", s))
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Produces scope sessions for one run's options
#[derive(Clone)]
pub struct ScopeBinder {
    registry: Arc<EnvironmentRegistry>,
    factory: Arc<dyn EngineFactory>,
    options: Arc<Options>,
    cwd: PathBuf,
    wait_timeout: Duration,
    clock: Arc<dyn Clock>,
    waiter: ReadinessWaiter,
    logs: LogSink,
}

impl ScopeBinder {
    /// Create a binder; `cwd` is the first base directory searched for definitions
    pub fn new(
        registry: Arc<EnvironmentRegistry>,
        factory: Arc<dyn EngineFactory>,
        options: Options,
        cwd: PathBuf,
    ) -> Result<Self> {
        let wait_timeout = options.wait_timeout()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let waiter = ReadinessWaiter::with_clock(options.poll_interval(), Arc::clone(&clock));
        let logs = LogSink::stdout(options.verbose);

        Ok(Self {
            registry,
            factory,
            options: Arc::new(options),
            cwd,
            wait_timeout,
            clock,
            waiter,
            logs,
        })
    }

    /// Replace the clock used for readiness polling and log windows
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.waiter = ReadinessWaiter::with_clock(self.options.poll_interval(), Arc::clone(&clock));
        self.clock = clock;
        self
    }

    pub fn with_log_sink(mut self, logs: LogSink) -> Self {
        self.logs = logs;
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn registry(&self) -> &Arc<EnvironmentRegistry> {
        &self.registry
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn resolve_key(&self) -> Result<EnvironmentKey> {
        identity::resolve(
            &self.options.compose_files,
            &self.options.base_candidates(&self.cwd),
        )
    }

    /// The run's environment for the configured definitions, built at most once
    pub fn environment(&self) -> Result<Arc<Environment>> {
        let key = self.resolve_key()?;
        self.registry.get_or_create(&key, || {
            let engine = self.factory.open(&key, &self.options)?;
            let environment = Environment::new(key.clone(), engine);
            environment.build(self.options.no_build)?;
            Ok(environment)
        })
    }

    /// Engine for the configured definitions, outside any registry entry
    ///
    /// Nothing is built or started; used for read-only inspection.
    pub fn engine(&self) -> Result<Arc<dyn ContainerEngine>> {
        let key = self.resolve_key()?;
        self.factory.open(&key, &self.options)
    }

    /// Getter over [`ScopeBinder::engine`] for waiting without acquiring
    pub fn detached_getter(&self) -> Result<ContainerGetter> {
        Ok(self.getter(self.engine()?))
    }

    pub fn for_scope(&self, scope: Scope) -> ScopeFixture<'_> {
        ScopeFixture {
            binder: self,
            scope,
        }
    }

    fn getter(&self, engine: Arc<dyn ContainerEngine>) -> ContainerGetter {
        ContainerGetter::new(engine, self.waiter.clone(), self.wait_timeout)
    }
}

/// Setup/teardown pair for one scope
pub struct ScopeFixture<'a> {
    binder: &'a ScopeBinder,
    scope: Scope,
}

impl ScopeFixture<'_> {
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Acquire the environment for this scope
    ///
    /// On error nothing was acquired and there is nothing to tear down.
    pub fn setup(&self) -> Result<ScopeSession> {
        let binder = self.binder;
        let environment = binder.environment()?;
        let started_at = binder.clock.utc_now();

        let acquisition = environment.acquire(AcquirePolicy {
            adopt_running: binder.options.use_running_containers,
            build_requested: environment.is_built(),
        })?;

        info!(
            scope = %self.scope,
            key = %environment.key(),
            ownership = ?acquisition.ownership,
            reused = acquisition.reused,
            containers = acquisition.containers.len(),
            "scope acquired environment"
        );

        let getter = binder.getter(Arc::clone(environment.engine()));
        Ok(ScopeSession {
            scope: self.scope,
            environment,
            started_at,
            containers: acquisition.containers,
            ownership: acquisition.ownership,
            getter,
            logs: binder.logs.clone(),
            remove_volumes: binder.options.remove_volumes,
            finished: AtomicBool::new(false),
        })
    }

    /// Run `body` inside a session, tearing down on every exit path
    ///
    /// A body error or panic takes precedence over a teardown error, which
    /// is then only logged.
    pub fn run<F, R, E>(&self, body: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&ContainerGetter) -> std::result::Result<R, E>,
        E: From<ComposeError>,
    {
        let session = self.setup()?;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(session.getter())));
        let teardown = session.teardown();

        match outcome {
            Ok(Ok(value)) => {
                teardown?;
                Ok(value)
            }
            Ok(Err(body_error)) => {
                if let Err(e) = teardown {
                    error!(scope = %self.scope, error = %e, "teardown failed after test failure");
                }
                Err(body_error)
            }
            Err(payload) => {
                if let Err(e) = teardown {
                    error!(scope = %self.scope, error = %e, "teardown failed after test panic");
                }
                panic::resume_unwind(payload)
            }
        }
    }
}

/// One scope's hold on an environment
pub struct ScopeSession {
    scope: Scope,
    environment: Arc<Environment>,
    started_at: DateTime<Utc>,
    containers: Vec<ContainerHandle>,
    ownership: Ownership,
    getter: ContainerGetter,
    logs: LogSink,
    remove_volumes: bool,
    finished: AtomicBool,
}

impl ScopeSession {
    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.environment
    }

    /// When setup began; teardown only prints logs after this point
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Containers captured at acquisition; used to choose which logs to flush
    pub fn containers(&self) -> &[ContainerHandle] {
        &self.containers
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn is_adopted(&self) -> bool {
        self.ownership == Ownership::Adopted
    }

    pub fn getter(&self) -> &ContainerGetter {
        &self.getter
    }

    /// Flush logs and release the environment; later calls are no-ops
    pub fn teardown(&self) -> Result<Release> {
        if self.finished.swap(true, Ordering::SeqCst) {
            return Ok(Release::Idle);
        }

        let engine = self.environment.engine();
        let flushed = self
            .logs
            .flush(engine.as_ref(), &self.containers, self.started_at);
        let released = self.environment.release(self.remove_volumes);

        match (flushed, released) {
            (Ok(()), Ok(release)) => {
                info!(scope = %self.scope, key = %self.environment.key(), ?release, "scope released environment");
                Ok(release)
            }
            (Err(log_error), Ok(_)) => Err(log_error),
            (flushed, Err(release_error)) => {
                if let Err(log_error) = flushed {
                    warn!(scope = %self.scope, error = %log_error, "log capture also failed");
                }
                Err(release_error)
            }
        }
    }
}

impl Drop for ScopeSession {
    fn drop(&mut self) {
        if self.finished.load(Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.teardown() {
            error!(scope = %self.scope, key = %self.environment.key(), error = %e, "teardown failed");
        }
    }
}

impl fmt::Debug for ScopeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeSession")
            .field("scope", &self.scope)
            .field("key", &self.environment.key().as_str())
            .field("ownership", &self.ownership)
            .field("started_at", &self.started_at)
            .field("containers", &self.containers.len())
            .finish()
    }
}

/// Lookup object handed to test bodies
#[derive(Clone)]
pub struct ContainerGetter {
    engine: Arc<dyn ContainerEngine>,
    waiter: ReadinessWaiter,
    timeout: Duration,
}

impl ContainerGetter {
    pub fn new(engine: Arc<dyn ContainerEngine>, waiter: ReadinessWaiter, timeout: Duration) -> Self {
        Self {
            engine,
            waiter,
            timeout,
        }
    }

    /// Wait up to the default timeout for `service` to run, then resolve its endpoints
    pub fn get(&self, service: &str) -> Result<ContainerWithEndpoints> {
        self.get_with_timeout(service, self.timeout)
    }

    pub fn get_with_timeout(&self, service: &str, timeout: Duration) -> Result<ContainerWithEndpoints> {
        let container = self.waiter.wait_running(self.engine.as_ref(), service, timeout)?;
        Ok(ContainerWithEndpoints::new(container))
    }

    /// Current container of `service` without waiting; stopped containers count
    ///
    /// No endpoints are attached: a container that is not running yet may
    /// report port data it is not serving.
    pub fn get_unchecked(&self, service: &str) -> Result<ContainerHandle> {
        if let Some(running) = self.engine.containers(Some(service), false)?.into_iter().next() {
            return Ok(running);
        }

        let stopped = self
            .engine
            .containers(Some(service), true)?
            .into_iter()
            .next()
            .ok_or_else(|| ComposeError::ContainerDoesNotExist(service.to_string()))?;

        warn!(
            service,
            state = %stopped.human_readable_state(),
            "service only has a stopped container"
        );
        Ok(stopped)
    }

    /// Every container of the environment, including stopped ones
    pub fn containers(&self) -> Result<Vec<ContainerHandle>> {
        self.engine.containers(None, true)
    }

    pub fn default_timeout(&self) -> Duration {
        self.timeout
    }

    pub fn engine(&self) -> &Arc<dyn ContainerEngine> {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scope_aliases() {
        assert_eq!("function".parse::<Scope>(), Ok(Scope::Test));
        assert_eq!("Session".parse::<Scope>(), Ok(Scope::Run));
        assert_eq!("module".parse::<Scope>(), Ok(Scope::Module));
        assert!("package".parse::<Scope>().is_err());
    }

    #[test]
    fn test_scopes_order_narrowest_first() {
        let mut scopes = vec![Scope::Run, Scope::Test, Scope::Module, Scope::Class];
        scopes.sort();
        assert_eq!(scopes, Scope::ALL.to_vec());
    }
}
