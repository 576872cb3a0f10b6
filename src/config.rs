use crate::errors::{ComposeError, Result};
use crate::readiness::DEFAULT_POLL_INTERVAL;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Project-level config file, looked up from the working directory upwards
pub const PROJECT_CONFIG_FILE: &str = ".compose-fixture.yml";

/// Prefix of the environment variables that override config files
pub const ENV_PREFIX: &str = "COMPOSE_FIXTURE_";

/// Resolved options for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Options {
    /// Definition files or directories; entries may hold comma-separated paths
    pub compose_files: Vec<String>,
    /// Explicit base directory, disabling the base directory search
    pub project_dir: Option<PathBuf>,
    pub project_name: Option<String>,
    /// Skip building images before bring-up
    pub no_build: bool,
    /// Adopt containers that are already running instead of failing
    pub use_running_containers: bool,
    /// Remove named volumes when tearing an environment down
    pub remove_volumes: bool,
    /// Print container logs on teardown
    pub verbose: bool,
    /// Default readiness timeout, e.g. "15s" or "1m"
    pub wait_timeout: String,
    pub poll_interval_ms: u64,
    /// Directory holding the project config file, if one was found
    #[serde(skip)]
    pub config_root: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            compose_files: vec![".".to_string()],
            project_dir: None,
            project_name: None,
            no_build: false,
            use_running_containers: false,
            remove_volumes: false,
            verbose: false,
            wait_timeout: "15s".to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            config_root: None,
        }
    }
}

/// One config file's worth of settings; unset keys fall through to lower layers
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    #[serde(default, deserialize_with = "deserialize_file_list")]
    pub compose_files: Option<Vec<String>>,
    pub project_dir: Option<PathBuf>,
    pub project_name: Option<String>,
    pub no_build: Option<bool>,
    pub use_running_containers: Option<bool>,
    pub remove_volumes: Option<bool>,
    pub verbose: Option<bool>,
    pub wait_timeout: Option<String>,
    pub poll_interval_ms: Option<u64>,
}

/// Accept either a list of files or a single comma-separated string
fn deserialize_file_list<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FileList {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<FileList>::deserialize(deserializer)? {
        None => None,
        Some(FileList::One(s)) => Some(vec![s]),
        Some(FileList::Many(v)) => Some(v),
    })
}

impl ConfigLayer {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yml::from_str(&content).map_err(|e| {
            ComposeError::ConfigError(format!("Failed to parse {}: {}", path.display(), e))
        })
    }
}

impl Options {
    /// Load options for a run started in `start_dir`
    ///
    /// Precedence, lowest first: defaults, the user config file, the
    /// nearest `.compose-fixture.yml`, then `COMPOSE_FIXTURE_*` variables.
    pub fn load(start_dir: &Path) -> Result<Self> {
        let user = user_config_path().filter(|p| p.is_file());
        let project = find_project_config(start_dir);

        let mut options = Self::load_from_paths(user.as_deref(), project.as_deref())?;
        options.apply_env(std::env::vars())?;
        Ok(options)
    }

    /// Layer the given config files over the defaults, without touching the environment
    pub fn load_from_paths(user: Option<&Path>, project: Option<&Path>) -> Result<Self> {
        let mut options = Options::default();

        if let Some(path) = user {
            options.merge(ConfigLayer::load(path)?);
        }
        if let Some(path) = project {
            options.merge(ConfigLayer::load(path)?);
            options.config_root = path.parent().map(Path::to_path_buf);
        }

        Ok(options)
    }

    pub fn merge(&mut self, layer: ConfigLayer) {
        if let Some(files) = layer.compose_files {
            self.compose_files = files;
        }
        if layer.project_dir.is_some() {
            self.project_dir = layer.project_dir;
        }
        if layer.project_name.is_some() {
            self.project_name = layer.project_name;
        }
        if let Some(v) = layer.no_build {
            self.no_build = v;
        }
        if let Some(v) = layer.use_running_containers {
            self.use_running_containers = v;
        }
        if let Some(v) = layer.remove_volumes {
            self.remove_volumes = v;
        }
        if let Some(v) = layer.verbose {
            self.verbose = v;
        }
        if let Some(v) = layer.wait_timeout {
            self.wait_timeout = v;
        }
        if let Some(v) = layer.poll_interval_ms {
            self.poll_interval_ms = v;
        }
    }

    /// Apply `COMPOSE_FIXTURE_*` overrides from an environment snapshot
    pub fn apply_env<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(setting) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };

            match setting {
                "FILES" => self.compose_files = vec![value],
                "PROJECT_DIR" => self.project_dir = Some(PathBuf::from(value)),
                "PROJECT_NAME" => self.project_name = Some(value),
                "NO_BUILD" => self.no_build = parse_bool(&name, &value)?,
                "USE_RUNNING" => self.use_running_containers = parse_bool(&name, &value)?,
                "REMOVE_VOLUMES" => self.remove_volumes = parse_bool(&name, &value)?,
                "VERBOSE" => self.verbose = parse_bool(&name, &value)?,
                "WAIT_TIMEOUT" => self.wait_timeout = value,
                _ => {}
            }
        }
        Ok(())
    }

    pub fn wait_timeout(&self) -> Result<Duration> {
        parse_timeout(&self.wait_timeout)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Base directories the identity resolver searches, in order
    ///
    /// An explicit project directory is the only candidate. Otherwise the
    /// working directory comes first, then the config file's directory.
    pub fn base_candidates(&self, cwd: &Path) -> Vec<PathBuf> {
        if let Some(dir) = &self.project_dir {
            let dir = if dir.is_absolute() {
                dir.clone()
            } else {
                cwd.join(dir)
            };
            return vec![dir];
        }

        let mut bases = vec![cwd.to_path_buf()];
        if let Some(root) = &self.config_root {
            if root != cwd {
                bases.push(root.clone());
            }
        }
        bases
    }
}

/// `<config dir>/compose-fixture/config.yml`, e.g. `~/.config/compose-fixture/config.yml`
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("compose-fixture").join("config.yml"))
}

/// Nearest `.compose-fixture.yml` in `start_dir` or any of its parents
pub fn find_project_config(start_dir: &Path) -> Option<PathBuf> {
    let mut current = Some(start_dir);

    while let Some(dir) = current {
        let candidate = dir.join(PROJECT_CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        current = dir.parent();
    }

    None
}

/// Parse timeout string (e.g., "30s", "1m", "500ms") into a duration
pub fn parse_timeout(timeout_str: &str) -> Result<Duration> {
    let timeout_str = timeout_str.trim();
    let invalid = || ComposeError::ConfigError(format!("Invalid timeout value: {}", timeout_str));

    if let Some(num_str) = timeout_str.strip_suffix("ms") {
        num_str.parse::<u64>().map(Duration::from_millis).map_err(|_| invalid())
    } else if let Some(num_str) = timeout_str.strip_suffix('s') {
        num_str.parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    } else if let Some(num_str) = timeout_str.strip_suffix('m') {
        let minutes = num_str.parse::<u64>().map_err(|_| invalid())?;
        minutes.checked_mul(60).map(Duration::from_secs).ok_or_else(invalid)
    } else {
        // Default to seconds if no unit specified
        timeout_str.parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ComposeError::ConfigError(format!(
            "{} must be a boolean, got '{}'",
            name, other
        ))),
    }
}
