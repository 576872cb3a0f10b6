// Config hierarchy tests: user file, project file, environment and flags
mod common;

use common::{test_options, FakeEngine, FakeFactory, TestProject};
use compose_fixture::cli::OptionArgs;
use compose_fixture::config::{find_project_config, PROJECT_CONFIG_FILE};
use compose_fixture::{EnvironmentRegistry, Options, ScopeBinder};
use serial_test::serial;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Write a config file
fn write_config(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    fs::write(path, content).expect("Failed to write config file");
}

#[test]
fn test_project_config_overrides_user_config() {
    let temp_dir = TempDir::new().unwrap();
    let user = temp_dir.path().join("user").join("config.yml");
    let project = temp_dir.path().join("repo").join(PROJECT_CONFIG_FILE);

    write_config(
        &user,
        r#"
verbose: true
wait_timeout: 2m
no_build: true
"#,
    );
    write_config(
        &project,
        r#"
wait_timeout: 30s
compose_files: services/docker-compose.yml
"#,
    );

    let options = Options::load_from_paths(Some(&user), Some(&project)).unwrap();

    // Primitives override
    assert_eq!(options.wait_timeout().unwrap(), Duration::from_secs(30));
    // Unset keys fall through to the user layer
    assert!(options.verbose);
    assert!(options.no_build);
    assert_eq!(options.compose_files, vec!["services/docker-compose.yml"]);
    assert_eq!(
        options.config_root.as_deref(),
        Some(temp_dir.path().join("repo").as_path())
    );
}

#[test]
fn test_empty_config_files() {
    let temp_dir = TempDir::new().unwrap();
    let user = temp_dir.path().join("config.yml");
    let project = temp_dir.path().join(PROJECT_CONFIG_FILE);
    write_config(&user, "");
    write_config(&project, "{}\n");

    let options = Options::load_from_paths(Some(&user), Some(&project)).unwrap();
    let defaults = Options::default();

    assert_eq!(options.compose_files, defaults.compose_files);
    assert_eq!(options.wait_timeout, defaults.wait_timeout);
}

#[test]
fn test_no_config_files() {
    let options = Options::load_from_paths(None, None).unwrap();
    assert_eq!(options, Options::default());
}

#[test]
fn test_invalid_yaml_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let project = temp_dir.path().join(PROJECT_CONFIG_FILE);
    write_config(&project, "compose_files: [unterminated\n");

    let err = Options::load_from_paths(None, Some(&project)).unwrap_err();
    assert!(err.to_string().contains(PROJECT_CONFIG_FILE));
}

#[test]
#[serial]
fn test_env_vars_override_files() {
    let temp_dir = TempDir::new().unwrap();
    let project = temp_dir.path().join(PROJECT_CONFIG_FILE);
    write_config(&project, "use_running_containers: true\nwait_timeout: 30s\n");

    env::set_var("COMPOSE_FIXTURE_USE_RUNNING", "false");
    env::set_var("COMPOSE_FIXTURE_REMOVE_VOLUMES", "on");
    env::set_var("COMPOSE_FIXTURE_PROJECT_NAME", "itest");

    let mut options = Options::load_from_paths(None, Some(&project)).unwrap();
    let applied = options.apply_env(env::vars());

    env::remove_var("COMPOSE_FIXTURE_USE_RUNNING");
    env::remove_var("COMPOSE_FIXTURE_REMOVE_VOLUMES");
    env::remove_var("COMPOSE_FIXTURE_PROJECT_NAME");

    applied.unwrap();
    assert!(!options.use_running_containers);
    assert!(options.remove_volumes);
    assert_eq!(options.project_name.as_deref(), Some("itest"));
    assert_eq!(options.wait_timeout().unwrap(), Duration::from_secs(30));
}

#[test]
#[serial]
fn test_flags_override_env_vars() {
    env::set_var("COMPOSE_FIXTURE_WAIT_TIMEOUT", "45s");

    let mut options = Options::default();
    let applied = options.apply_env(env::vars());
    env::remove_var("COMPOSE_FIXTURE_WAIT_TIMEOUT");
    applied.unwrap();

    OptionArgs {
        wait_timeout: Some("5s".to_string()),
        use_running_containers: true,
        ..OptionArgs::default()
    }
    .apply(&mut options);

    assert_eq!(options.wait_timeout().unwrap(), Duration::from_secs(5));
    assert!(options.use_running_containers);
}

#[test]
fn test_config_directory_is_a_base_candidate() {
    let project = TestProject::new();
    project.write_file(PROJECT_CONFIG_FILE, "no_build: true\n");
    let cwd = project.path().join("tests").join("unit");
    fs::create_dir_all(&cwd).unwrap();

    let config_path = find_project_config(&cwd).unwrap();
    let options = Options {
        poll_interval_ms: test_options().poll_interval_ms,
        ..Options::load_from_paths(None, Some(&config_path)).unwrap()
    };

    let binder = ScopeBinder::new(
        Arc::new(EnvironmentRegistry::new()),
        FakeFactory::new(FakeEngine::with_api("proj")),
        options,
        cwd,
    )
    .unwrap();

    let key = binder.resolve_key().unwrap();
    assert_eq!(key.base_dir(), project.path());
    assert_eq!(key.file_args(), vec!["docker-compose.yml"]);
}

#[test]
fn test_explicit_project_dir_disables_search() {
    let project = TestProject::new();
    let fixtures = project.path().join("fixtures");
    fs::create_dir_all(&fixtures).unwrap();

    let options = Options {
        project_dir: Some(fixtures),
        config_root: Some(project.path().to_path_buf()),
        ..test_options()
    };

    let binder = ScopeBinder::new(
        Arc::new(EnvironmentRegistry::new()),
        FakeFactory::new(FakeEngine::with_api("proj")),
        options,
        project.path().to_path_buf(),
    )
    .unwrap();

    assert!(binder.resolve_key().is_err());
}
