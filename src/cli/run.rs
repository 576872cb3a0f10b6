// Run command: execute a program against a run-scoped environment
use crate::errors::{ComposeError, Result};
use crate::network::NetworkEndpoint;
use crate::scope::{Scope, ScopeBinder, ScopeSession};
use colored::Colorize;
use std::collections::BTreeSet;
use std::process::Command;
use tracing::{debug, warn};

/// Prefix of every variable exported to the child process
pub const ENV_EXPORT_PREFIX: &str = "CFX_";

/// Bring the environment up, run `command` with endpoint variables, tear down
///
/// Returns the child's exit code. A teardown failure only fails the
/// invocation when the child itself succeeded.
pub fn run(binder: &ScopeBinder, command: &[String]) -> Result<i32> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| ComposeError::ConfigError("No command given to run".to_string()))?;

    let session = binder.for_scope(Scope::Run).setup()?;
    let outcome = run_in_session(&session, program, args);
    let teardown = session.teardown();

    match outcome {
        Ok(code) => match teardown {
            Ok(_) => Ok(code),
            Err(e) if code == 0 => Err(e),
            Err(e) => {
                warn!(error = %e, "teardown failed after command failure");
                Ok(code)
            }
        },
        Err(e) => {
            if let Err(teardown_error) = teardown {
                warn!(error = %teardown_error, "teardown failed after command error");
            }
            Err(e)
        }
    }
}

fn run_in_session(session: &ScopeSession, program: &str, args: &[String]) -> Result<i32> {
    let services: BTreeSet<&str> = session
        .containers()
        .iter()
        .map(|c| c.service.as_str())
        .collect();

    let mut exports = Vec::new();
    for service in services {
        let ready = session.getter().get(service)?;
        println!(
            "{} {} ready ({})",
            "✓".bright_green(),
            service.bright_cyan(),
            ready.name()
        );
        exports.extend(endpoint_env_vars(service, &ready.endpoints));
    }

    for (key, value) in &exports {
        debug!(key = key.as_str(), value = value.as_str(), "exporting endpoint");
    }

    let status = Command::new(program).args(args).envs(exports).status()?;
    match status.code() {
        Some(code) => Ok(code),
        None => {
            warn!(program, "command terminated by signal");
            Ok(1)
        }
    }
}

/// `CFX_<SERVICE>_<PORT>_<PROTO>_HOST` / `_PORT` pairs for a service's endpoints
///
/// Only the first binding of each container port is exported.
pub fn endpoint_env_vars(service: &str, endpoints: &[NetworkEndpoint]) -> Vec<(String, String)> {
    let mut seen = BTreeSet::new();
    let mut vars = Vec::new();

    for endpoint in endpoints {
        if !seen.insert(endpoint.container_port.as_str()) {
            continue;
        }
        let (port, proto) = endpoint
            .container_port
            .split_once('/')
            .unwrap_or((endpoint.container_port.as_str(), "tcp"));
        let prefix = format!(
            "{}{}_{}_{}",
            ENV_EXPORT_PREFIX,
            env_segment(service),
            env_segment(port),
            env_segment(proto)
        );
        vars.push((format!("{}_HOST", prefix), endpoint.hostname.clone()));
        vars.push((format!("{}_PORT", prefix), endpoint.host_port.clone()));
    }

    vars
}

fn env_segment(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(container_port: &str, hostname: &str, host_port: &str) -> NetworkEndpoint {
        NetworkEndpoint {
            container_port: container_port.to_string(),
            hostname: hostname.to_string(),
            host_port: host_port.to_string(),
        }
    }

    #[test]
    fn test_endpoint_env_vars_names() {
        let vars = endpoint_env_vars(
            "my-api",
            &[
                endpoint("80/tcp", "localhost", "32000"),
                endpoint("53/udp", "127.0.0.1", "5353"),
            ],
        );

        assert_eq!(
            vars,
            vec![
                ("CFX_MY_API_80_TCP_HOST".to_string(), "localhost".to_string()),
                ("CFX_MY_API_80_TCP_PORT".to_string(), "32000".to_string()),
                ("CFX_MY_API_53_UDP_HOST".to_string(), "127.0.0.1".to_string()),
                ("CFX_MY_API_53_UDP_PORT".to_string(), "5353".to_string()),
            ]
        );
    }

    #[test]
    fn test_endpoint_env_vars_first_binding_wins() {
        let vars = endpoint_env_vars(
            "db",
            &[
                endpoint("5984/tcp", "0.0.0.0", "32872"),
                endpoint("5984/tcp", "::", "32873"),
            ],
        );

        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].1, "0.0.0.0");
        assert_eq!(vars[1].1, "32872");
    }

    #[test]
    fn test_run_rejects_empty_command() {
        use crate::config::Options;
        use crate::engine::{ContainerEngine, EngineFactory};
        use crate::identity::EnvironmentKey;
        use crate::registry::EnvironmentRegistry;
        use std::sync::Arc;

        struct NeverOpened;
        impl EngineFactory for NeverOpened {
            fn open(&self, _: &EnvironmentKey, _: &Options) -> Result<Arc<dyn ContainerEngine>> {
                panic!("engine must not be opened without a command");
            }
        }

        let binder = ScopeBinder::new(
            Arc::new(EnvironmentRegistry::new()),
            Arc::new(NeverOpened),
            Options::default(),
            std::env::temp_dir(),
        )
        .unwrap();

        let err = run(&binder, &[]).unwrap_err();
        assert!(matches!(err, ComposeError::ConfigError(_)));
    }
}
