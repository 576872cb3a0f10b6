// Docker compose CLI engine
// Runs `docker compose` / `docker-compose` for one resolved environment definition

use crate::config::Options;
use crate::engine::inspect::parse_inspect;
use crate::engine::{ContainerEngine, ContainerHandle, EngineFactory};
use crate::errors::{ComposeError, Result};
use crate::identity::EnvironmentKey;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Arc;
use tracing::debug;

/// Docker Compose command variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockerComposeVariant {
    /// Legacy docker-compose (with hyphen)
    Hyphenated,
    /// Modern docker compose (no hyphen, subcommand of docker)
    Subcommand,
}

impl DockerComposeVariant {
    /// Detect which docker-compose variant is available
    pub fn detect() -> Self {
        // Try modern "docker compose" first
        let modern = Command::new("docker")
            .arg("compose")
            .arg("version")
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false);

        if modern {
            DockerComposeVariant::Subcommand
        } else {
            DockerComposeVariant::Hyphenated
        }
    }
}

/// Container engine backed by the docker compose command line
pub struct ComposeCli {
    project_dir: PathBuf,
    files: Vec<String>,
    project_name: String,
    variant: DockerComposeVariant,
}

impl ComposeCli {
    /// Create an engine for `key`, detecting the compose variant
    pub fn new(key: &EnvironmentKey, project_name: Option<&str>) -> Self {
        Self::with_variant(key, project_name, DockerComposeVariant::detect())
    }

    pub fn with_variant(
        key: &EnvironmentKey,
        project_name: Option<&str>,
        variant: DockerComposeVariant,
    ) -> Self {
        let project_name = match project_name {
            Some(name) => sanitize_project_name(name),
            None => default_project_name(key.base_dir()),
        };

        Self {
            project_dir: key.base_dir().to_path_buf(),
            files: key.file_args(),
            project_name,
            variant,
        }
    }

    /// Get the compose program and full argument list for a subcommand
    fn compose_command(&self, subcommand: &[String]) -> (String, Vec<String>) {
        let mut args = vec!["-p".to_string(), self.project_name.clone()];
        for file in &self.files {
            args.push("-f".to_string());
            args.push(file.clone());
        }
        args.extend_from_slice(subcommand);

        match self.variant {
            DockerComposeVariant::Subcommand => {
                let mut compose_args = vec!["compose".to_string()];
                compose_args.extend(args);
                ("docker".to_string(), compose_args)
            }
            DockerComposeVariant::Hyphenated => ("docker-compose".to_string(), args),
        }
    }

    fn compose(&self, subcommand: &[&str]) -> Result<Output> {
        let subcommand: Vec<String> = subcommand.iter().map(|s| s.to_string()).collect();
        let (program, args) = self.compose_command(&subcommand);
        execute_command_safe(&program, &args, &self.project_dir)
    }

    /// Build `ps` arguments for listing container ids
    fn ps_args<'a>(service: Option<&'a str>, include_stopped: bool) -> Vec<&'a str> {
        let mut args = vec!["ps", "-q"];
        if include_stopped {
            args.push("-a");
        }
        if let Some(service) = service {
            args.push(service);
        }
        args
    }
}

impl ContainerEngine for ComposeCli {
    fn project_name(&self) -> &str {
        &self.project_name
    }

    fn services(&self) -> Result<Vec<String>> {
        let output = self.compose(&["config", "--services"])?;
        Ok(non_empty_lines(&output.stdout))
    }

    fn build(&self) -> Result<()> {
        self.compose(&["build"])?;
        Ok(())
    }

    fn up(&self) -> Result<Vec<ContainerHandle>> {
        self.compose(&["up", "-d"])?;
        // One-shot services may already have exited; they still count as launched
        self.containers(None, true)
    }

    fn down(&self, remove_volumes: bool) -> Result<()> {
        if remove_volumes {
            self.compose(&["down", "-v"])?;
        } else {
            self.compose(&["down"])?;
        }
        Ok(())
    }

    fn containers(
        &self,
        service: Option<&str>,
        include_stopped: bool,
    ) -> Result<Vec<ContainerHandle>> {
        let output = self.compose(&Self::ps_args(service, include_stopped))?;
        let ids = non_empty_lines(&output.stdout);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut args = vec!["inspect".to_string()];
        args.extend(ids);
        let output = execute_command_safe("docker", &args, &self.project_dir)?;
        parse_inspect(&String::from_utf8_lossy(&output.stdout))
    }

    fn logs(&self, container: &ContainerHandle, since: Option<DateTime<Utc>>) -> Result<Vec<u8>> {
        let args = logs_args(&container.name, since);
        let output = execute_command_safe("docker", &args, &self.project_dir)?;

        // docker logs replays the container's stderr on our stderr
        let mut logs = output.stdout;
        logs.extend_from_slice(&output.stderr);
        Ok(logs)
    }
}

/// Opens [`ComposeCli`] engines, detecting the compose variant once
pub struct ComposeCliFactory {
    variant: DockerComposeVariant,
}

impl ComposeCliFactory {
    pub fn new() -> Self {
        Self {
            variant: DockerComposeVariant::detect(),
        }
    }
}

impl Default for ComposeCliFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineFactory for ComposeCliFactory {
    fn open(&self, key: &EnvironmentKey, options: &Options) -> Result<Arc<dyn ContainerEngine>> {
        Ok(Arc::new(ComposeCli::with_variant(
            key,
            options.project_name.as_deref(),
            self.variant,
        )))
    }
}

/// Compose's default project name: the base directory's name
pub fn default_project_name(base_dir: &Path) -> String {
    let dir_name = base_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("default");
    sanitize_project_name(dir_name)
}

/// Docker project names must be lowercase alphanumeric with hyphens only
pub fn sanitize_project_name(name: &str) -> String {
    // - Lowercase only
    // - Alphanumeric and hyphens
    // - Cannot start/end with hyphen
    let sanitized = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>();

    let joined = sanitized
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if joined.is_empty() {
        "default".to_string()
    } else {
        joined
    }
}

fn logs_args(container_name: &str, since: Option<DateTime<Utc>>) -> Vec<String> {
    let mut args = vec!["logs".to_string()];
    if let Some(since) = since {
        args.push("--since".to_string());
        args.push(since.to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    args.push(container_name.to_string());
    args
}

fn non_empty_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Execute a command without a shell, failing on a non-zero exit status
fn execute_command_safe(program: &str, args: &[String], dir: &Path) -> Result<Output> {
    debug!(program, args = ?args, dir = %dir.display(), "running engine command");

    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| ComposeError::Engine(format!("Failed to run {}: {}", program, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ComposeError::Engine(format!(
            "`{} {}` failed: {}",
            program,
            args.join(" "),
            stderr.trim()
        )));
    }

    Ok(output)
}
