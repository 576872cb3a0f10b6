pub mod config_cmd;
pub mod ps;
pub mod run;
pub mod wait;

use crate::config::Options;
use crate::engine::compose::ComposeCliFactory;
use crate::errors::Result;
use crate::registry::EnvironmentRegistry;
use crate::scope::ScopeBinder;
use clap::Args;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

/// Flags shared by every subcommand; they override config files and environment
#[derive(Args, Debug, Default, Clone)]
pub struct OptionArgs {
    /// Path to docker-compose.yml file, or directory containing same (repeatable)
    #[arg(long = "docker-compose", value_name = "PATH", global = true)]
    pub compose_files: Vec<String>,

    /// Base directory the definition paths are relative to
    #[arg(long, value_name = "DIR", global = true)]
    pub project_dir: Option<PathBuf>,

    /// Compose project name (defaults to the base directory's name)
    #[arg(long, global = true)]
    pub project_name: Option<String>,

    /// Do not build images before starting containers
    #[arg(long = "docker-compose-no-build", global = true)]
    pub no_build: bool,

    /// Use a running set of containers instead of calling 'docker compose up'
    #[arg(long, global = true)]
    pub use_running_containers: bool,

    /// Remove container volumes after teardown
    #[arg(long = "docker-compose-remove-volumes", global = true)]
    pub remove_volumes: bool,

    /// Print container logs on teardown and enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Default readiness timeout (e.g. 15s, 1m)
    #[arg(long, value_name = "DURATION", global = true)]
    pub wait_timeout: Option<String>,
}

impl OptionArgs {
    /// Apply command-line overrides on top of loaded options
    pub fn apply(&self, options: &mut Options) {
        if !self.compose_files.is_empty() {
            options.compose_files = self.compose_files.clone();
        }
        if self.project_dir.is_some() {
            options.project_dir = self.project_dir.clone();
        }
        if self.project_name.is_some() {
            options.project_name = self.project_name.clone();
        }
        // Flags can only switch behaviour on; config files switch it off
        options.no_build |= self.no_build;
        options.use_running_containers |= self.use_running_containers;
        options.remove_volumes |= self.remove_volumes;
        options.verbose |= self.verbose;
        if let Some(timeout) = &self.wait_timeout {
            options.wait_timeout = timeout.clone();
        }
    }

    /// Load layered options for the current directory and apply these flags
    pub fn resolve(&self) -> Result<(Options, PathBuf)> {
        let cwd = env::current_dir()?;
        let mut options = Options::load(&cwd)?;
        self.apply(&mut options);
        Ok((options, cwd))
    }
}

/// Binder over the docker compose CLI for a one-shot command
pub fn compose_binder(options: Options, cwd: PathBuf) -> Result<ScopeBinder> {
    ScopeBinder::new(
        Arc::new(EnvironmentRegistry::new()),
        Arc::new(ComposeCliFactory::new()),
        options,
        cwd,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_loaded_options() {
        let mut options = Options::default();
        options.wait_timeout = "30s".to_string();

        let args = OptionArgs {
            compose_files: vec!["my_network".to_string(), "extra.yml".to_string()],
            no_build: true,
            wait_timeout: Some("5s".to_string()),
            ..OptionArgs::default()
        };
        args.apply(&mut options);

        assert_eq!(options.compose_files, vec!["my_network", "extra.yml"]);
        assert!(options.no_build);
        assert!(!options.use_running_containers);
        assert_eq!(options.wait_timeout, "5s");
    }

    #[test]
    fn test_absent_flags_keep_config_values() {
        let mut options = Options {
            use_running_containers: true,
            compose_files: vec!["from-config.yml".to_string()],
            ..Options::default()
        };

        OptionArgs::default().apply(&mut options);

        assert!(options.use_running_containers);
        assert_eq!(options.compose_files, vec!["from-config.yml"]);
    }
}
