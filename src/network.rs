// Network endpoint resolution for published container ports
use crate::engine::ContainerHandle;
use serde::Serialize;

/// Hostname used when the engine binds to all interfaces without reporting an IP
pub const DEFAULT_HOSTNAME: &str = "localhost";

/// How to reach one published container port from the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkEndpoint {
    /// Port and protocol inside the container, e.g. `"5000/tcp"`
    pub container_port: String,
    pub hostname: String,
    pub host_port: String,
}

impl NetworkEndpoint {
    /// `hostname:port` form suitable for building URLs
    pub fn address(&self) -> String {
        format!("{}:{}", self.hostname, self.host_port)
    }

    pub fn host_port_number(&self) -> Option<u16> {
        self.host_port.parse().ok()
    }
}

/// Every host binding of every published port on `container`
///
/// Declared-but-unpublished ports produce nothing. Order follows the
/// engine's port table; select by container port, not by position.
pub fn resolve_endpoints(container: &ContainerHandle) -> Vec<NetworkEndpoint> {
    container
        .published_ports
        .iter()
        .flat_map(|(container_port, bindings)| {
            bindings.iter().map(move |binding| NetworkEndpoint {
                container_port: container_port.clone(),
                hostname: if binding.host_ip.is_empty() {
                    DEFAULT_HOSTNAME.to_string()
                } else {
                    binding.host_ip.clone()
                },
                host_port: binding.host_port.clone(),
            })
        })
        .collect()
}

/// First endpoint for `container_port`; a bare `"80"` matches `"80/tcp"`
pub fn endpoint_for<'a>(
    endpoints: &'a [NetworkEndpoint],
    container_port: &str,
) -> Option<&'a NetworkEndpoint> {
    let wanted = if container_port.contains('/') {
        container_port.to_string()
    } else {
        format!("{}/tcp", container_port)
    };
    endpoints.iter().find(|e| e.container_port == wanted)
}

/// A container snapshot taken once it was running, with its endpoints
#[derive(Debug, Clone)]
pub struct ContainerWithEndpoints {
    pub container: ContainerHandle,
    pub endpoints: Vec<NetworkEndpoint>,
}

impl ContainerWithEndpoints {
    pub fn new(container: ContainerHandle) -> Self {
        let endpoints = resolve_endpoints(&container);
        Self {
            container,
            endpoints,
        }
    }

    pub fn endpoint(&self, container_port: &str) -> Option<&NetworkEndpoint> {
        endpoint_for(&self.endpoints, container_port)
    }

    pub fn name(&self) -> &str {
        &self.container.name
    }

    pub fn env(&self, key: &str) -> Option<&str> {
        self.container.environment.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RuntimeState;

    fn api() -> ContainerHandle {
        ContainerHandle::new("proj-api-1", "api", RuntimeState::Running)
    }

    #[test]
    fn test_empty_host_ip_defaults_to_localhost() {
        let container = api().with_port("80/tcp", "", "32000");
        assert_eq!(
            resolve_endpoints(&container),
            vec![NetworkEndpoint {
                container_port: "80/tcp".to_string(),
                hostname: "localhost".to_string(),
                host_port: "32000".to_string(),
            }]
        );
    }

    #[test]
    fn test_unpublished_port_is_skipped() {
        let container = api().with_unpublished_port("80/tcp");
        assert!(resolve_endpoints(&container).is_empty());
    }

    #[test]
    fn test_one_endpoint_per_binding() {
        let container = api()
            .with_port("5984/tcp", "0.0.0.0", "32872")
            .with_port("5984/tcp", "::", "32872")
            .with_unpublished_port("4369/tcp")
            .with_port("53/udp", "127.0.0.1", "5353");

        let endpoints = resolve_endpoints(&container);
        assert_eq!(endpoints.len(), 3);
        assert_eq!(endpoints.iter().filter(|e| e.container_port == "5984/tcp").count(), 2);
        assert!(endpoints.iter().all(|e| e.container_port != "4369/tcp"));
    }

    #[test]
    fn test_endpoint_lookup_by_port() {
        let ready = ContainerWithEndpoints::new(
            api()
                .with_port("53/udp", "127.0.0.1", "5353")
                .with_port("80/tcp", "", "32000"),
        );

        let http = ready.endpoint("80").unwrap();
        assert_eq!(http.address(), "localhost:32000");
        assert_eq!(http.host_port_number(), Some(32000));
        assert_eq!(ready.endpoint("53/udp").unwrap().hostname, "127.0.0.1");
        assert!(ready.endpoint("53").is_none());
    }
}
