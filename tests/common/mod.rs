/// Common test utilities for compose-fixture integration tests
use chrono::{DateTime, Utc};
use compose_fixture::clock::Clock;
use compose_fixture::errors::{ComposeError, Result};
use compose_fixture::{
    ContainerEngine, ContainerHandle, EngineFactory, EnvironmentKey, Options, RuntimeState,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// In-memory stand-in for a compose project
///
/// `up` starts the configured template containers; `down` removes them.
/// Containers that already run before the test begins are set with
/// [`FakeEngine::preexisting`].
#[allow(dead_code)]
pub struct FakeEngine {
    project: String,
    template: Vec<ContainerHandle>,
    live: Mutex<Vec<ContainerHandle>>,
    /// Queries per service that still report the container as starting
    starting_polls: Mutex<HashMap<String, usize>>,
    logs: Mutex<HashMap<String, Vec<u8>>>,
    pub builds: AtomicUsize,
    pub ups: AtomicUsize,
    pub downs: AtomicUsize,
    pub volume_downs: AtomicUsize,
    pub log_fetches: AtomicUsize,
    fail_down: AtomicBool,
    fail_logs: AtomicBool,
}

#[allow(dead_code)]
impl FakeEngine {
    pub fn new(project: &str, template: Vec<ContainerHandle>) -> Self {
        Self {
            project: project.to_string(),
            template,
            live: Mutex::new(Vec::new()),
            starting_polls: Mutex::new(HashMap::new()),
            logs: Mutex::new(HashMap::new()),
            builds: AtomicUsize::new(0),
            ups: AtomicUsize::new(0),
            downs: AtomicUsize::new(0),
            volume_downs: AtomicUsize::new(0),
            log_fetches: AtomicUsize::new(0),
            fail_down: AtomicBool::new(false),
            fail_logs: AtomicBool::new(false),
        }
    }

    /// Engine with a single running `api` container publishing `80/tcp`
    pub fn with_api(project: &str) -> Self {
        Self::new(project, vec![api_container(project)])
    }

    pub fn preexisting(self, containers: Vec<ContainerHandle>) -> Self {
        *self.live.lock().unwrap() = containers;
        self
    }

    /// Report `service` as created for the next `polls` queries
    pub fn starting_for(self, service: &str, polls: usize) -> Self {
        self.starting_polls
            .lock()
            .unwrap()
            .insert(service.to_string(), polls);
        self
    }

    pub fn with_logs(self, container: &str, logs: &str) -> Self {
        self.logs
            .lock()
            .unwrap()
            .insert(container.to_string(), logs.as_bytes().to_vec());
        self
    }

    /// `down` is counted, then fails
    pub fn failing_down(self) -> Self {
        self.fail_down.store(true, Ordering::SeqCst);
        self
    }

    /// `logs` is counted, then fails
    pub fn failing_logs(self) -> Self {
        self.fail_logs.store(true, Ordering::SeqCst);
        self
    }

    /// Remove every container, as an out-of-band `docker compose down` would
    pub fn clear(&self) {
        self.live.lock().unwrap().clear();
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> Vec<ContainerHandle> {
        self.live.lock().unwrap().clone()
    }
}

impl ContainerEngine for FakeEngine {
    fn project_name(&self) -> &str {
        &self.project
    }

    fn services(&self) -> Result<Vec<String>> {
        let mut services: Vec<String> = self.template.iter().map(|c| c.service.clone()).collect();
        services.sort();
        services.dedup();
        Ok(services)
    }

    fn build(&self) -> Result<()> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn up(&self) -> Result<Vec<ContainerHandle>> {
        self.ups.fetch_add(1, Ordering::SeqCst);
        let mut live = self.live.lock().unwrap();
        *live = self.template.clone();
        Ok(live.clone())
    }

    fn down(&self, remove_volumes: bool) -> Result<()> {
        self.downs.fetch_add(1, Ordering::SeqCst);
        if remove_volumes {
            self.volume_downs.fetch_add(1, Ordering::SeqCst);
        }
        if self.fail_down.load(Ordering::SeqCst) {
            return Err(ComposeError::Engine("docker compose down failed".to_string()));
        }
        self.live.lock().unwrap().clear();
        Ok(())
    }

    fn containers(
        &self,
        service: Option<&str>,
        include_stopped: bool,
    ) -> Result<Vec<ContainerHandle>> {
        let mut starting = self.starting_polls.lock().unwrap();
        let live = self.live.lock().unwrap();

        let mut result = Vec::new();
        for container in live.iter() {
            if service.is_some_and(|s| s != container.service) {
                continue;
            }

            let mut snapshot = container.clone();
            if service.is_some() {
                if let Some(remaining) = starting.get_mut(&container.service) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        snapshot.state = RuntimeState::Created;
                    }
                }
            }

            if include_stopped || snapshot.is_running() {
                result.push(snapshot);
            }
        }
        Ok(result)
    }

    fn logs(&self, container: &ContainerHandle, _since: Option<DateTime<Utc>>) -> Result<Vec<u8>> {
        self.log_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_logs.load(Ordering::SeqCst) {
            return Err(ComposeError::Engine(format!("no logs for {}", container.name)));
        }
        Ok(self
            .logs
            .lock()
            .unwrap()
            .get(&container.name)
            .cloned()
            .unwrap_or_default())
    }
}

/// Factory handing out one shared [`FakeEngine`] and counting opens
#[allow(dead_code)]
pub struct FakeFactory {
    pub engine: Arc<FakeEngine>,
    pub opens: AtomicUsize,
    pub keys: Mutex<Vec<EnvironmentKey>>,
    pub fail_open: bool,
}

#[allow(dead_code)]
impl FakeFactory {
    pub fn new(engine: FakeEngine) -> Arc<Self> {
        Arc::new(Self {
            engine: Arc::new(engine),
            opens: AtomicUsize::new(0),
            keys: Mutex::new(Vec::new()),
            fail_open: false,
        })
    }

    pub fn failing(engine: FakeEngine) -> Arc<Self> {
        Arc::new(Self {
            engine: Arc::new(engine),
            opens: AtomicUsize::new(0),
            keys: Mutex::new(Vec::new()),
            fail_open: true,
        })
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl EngineFactory for FakeFactory {
    fn open(&self, key: &EnvironmentKey, _options: &Options) -> Result<Arc<dyn ContainerEngine>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.keys.lock().unwrap().push(key.clone());
        if self.fail_open {
            return Err(ComposeError::Engine("engine unavailable".to_string()));
        }
        let engine: Arc<dyn ContainerEngine> = self.engine.clone();
        Ok(engine)
    }
}

/// Clock that advances only when slept on
#[allow(dead_code)]
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

#[allow(dead_code)]
impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        })
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock().unwrap()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        *self.offset.lock().unwrap() += duration;
    }
}

/// One-shot `job` container that has already exited
#[allow(dead_code)]
pub fn exited_job(project: &str) -> ContainerHandle {
    ContainerHandle::new(format!("{}-job-1", project), "job", RuntimeState::Exited).with_exit_code(0)
}

#[allow(dead_code)]
pub fn api_container(project: &str) -> ContainerHandle {
    ContainerHandle::new(format!("{}-api-1", project), "api", RuntimeState::Running)
        .with_port("80/tcp", "", "32000")
        .with_env("APP_MODE", "test")
}

/// A temporary project tree holding compose definition files
#[allow(dead_code)]
pub struct TestProject {
    pub temp_dir: TempDir,
    pub root: PathBuf,
}

#[allow(dead_code)]
impl TestProject {
    /// Project with a `docker-compose.yml` at its root
    pub fn new() -> Self {
        let project = Self::empty();
        project.write_definition("docker-compose.yml");
        project
    }

    pub fn empty() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().join("proj");
        fs::create_dir(&root).expect("Failed to create project directory");
        TestProject { temp_dir, root }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Write a minimal definition at `relative`, creating parent directories
    pub fn write_definition(&self, relative: &str) -> PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create definition directory");
        }
        fs::write(
            &path,
            "services:\n  api:\n    image: nginx\n    ports:\n      - \"80\"\n",
        )
        .expect("Failed to write definition");
        path
    }

    pub fn write_file(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        fs::write(&path, content).expect("Failed to write file");
        path
    }
}

/// Options that never touch the user's config and poll quickly
#[allow(dead_code)]
pub fn test_options() -> Options {
    Options {
        poll_interval_ms: 10,
        wait_timeout: "1s".to_string(),
        ..Options::default()
    }
}
