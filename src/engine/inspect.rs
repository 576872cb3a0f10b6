// Parsing of `docker inspect` output into container handles
use crate::engine::{ContainerHandle, PortBinding, RuntimeState};
use crate::errors::{ComposeError, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// Label docker compose puts on every container it creates
pub const SERVICE_LABEL: &str = "com.docker.compose.service";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Inspected {
    name: String,
    state: InspectedState,
    #[serde(default)]
    config: InspectedConfig,
    #[serde(default)]
    network_settings: InspectedNetwork,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedState {
    status: String,
    #[serde(default)]
    restarting: bool,
    #[serde(default)]
    exit_code: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedConfig {
    #[serde(default)]
    env: Option<Vec<String>>,
    #[serde(default)]
    labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedNetwork {
    // {"5984/tcp": [{"HostIp": "0.0.0.0", "HostPort": "32872"}], "4369/tcp": null}
    #[serde(default)]
    ports: Option<BTreeMap<String, Option<Vec<InspectedBinding>>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedBinding {
    #[serde(default)]
    host_ip: String,
    #[serde(default)]
    host_port: String,
}

/// Parse the JSON array printed by `docker inspect <id>...`
pub fn parse_inspect(json: &str) -> Result<Vec<ContainerHandle>> {
    let inspected: Vec<Inspected> = serde_json::from_str(json)
        .map_err(|e| ComposeError::Engine(format!("Failed to parse docker inspect output: {}", e)))?;

    inspected.into_iter().map(into_handle).collect()
}

fn into_handle(inspected: Inspected) -> Result<ContainerHandle> {
    let name = inspected.name.trim_start_matches('/').to_string();

    // Docker keeps Status at "running" between restart attempts
    let state = if inspected.state.restarting {
        RuntimeState::Restarting
    } else {
        RuntimeState::parse_state(&inspected.state.status).ok_or_else(|| {
            ComposeError::Engine(format!(
                "Container '{}' reported unknown state '{}'",
                name, inspected.state.status
            ))
        })?
    };

    let service = inspected
        .config
        .labels
        .as_ref()
        .and_then(|labels| labels.get(SERVICE_LABEL))
        .cloned()
        .unwrap_or_default();

    let published_ports = inspected
        .network_settings
        .ports
        .unwrap_or_default()
        .into_iter()
        .map(|(port, bindings)| {
            let bindings = bindings
                .unwrap_or_default()
                .into_iter()
                .map(|b| PortBinding::new(b.host_ip, b.host_port))
                .collect();
            (port, bindings)
        })
        .collect();

    let environment = inspected
        .config
        .env
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| {
            entry
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect();

    Ok(ContainerHandle {
        name,
        service,
        state,
        exit_code: inspected.state.exit_code,
        published_ports,
        environment,
    })
}
