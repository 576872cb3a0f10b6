// Ps command: list the resolved project's containers
use crate::engine::ContainerHandle;
use crate::errors::Result;
use crate::network::resolve_endpoints;
use crate::scope::ScopeBinder;
use colored::Colorize;

/// Show every container of the resolved project with state and endpoints
pub fn ps(binder: &ScopeBinder) -> Result<()> {
    let engine = binder.engine()?;
    let mut containers = engine.containers(None, true)?;

    if containers.is_empty() {
        println!(
            "{} No containers for project '{}'",
            "⚠".bright_yellow(),
            engine.project_name()
        );
        return Ok(());
    }

    containers.sort_by(|a, b| a.name.cmp(&b.name));

    println!("{:<30} {:<15} {:<12} PORTS", "NAME", "SERVICE", "STATE");
    println!("{}", "-".repeat(70));
    for container in &containers {
        let state = container.human_readable_state();
        let state = if container.is_running() {
            format!("{:<12}", state).bright_green()
        } else {
            format!("{:<12}", state).bright_yellow()
        };
        println!(
            "{:<30} {:<15} {} {}",
            container.name,
            container.service,
            state,
            format_ports(container)
        );
    }

    Ok(())
}

/// `container_port -> host:port` pairs, comma separated
fn format_ports(container: &ContainerHandle) -> String {
    resolve_endpoints(container)
        .iter()
        .map(|e| format!("{} -> {}", e.container_port, e.address()))
        .collect::<Vec<_>>()
        .join(", ")
}
