// Wait command: block until a service's container is running
use crate::config::parse_timeout;
use crate::errors::Result;
use crate::scope::ScopeBinder;
use colored::Colorize;

/// Wait for `service` and print its endpoints
///
/// Nothing is started; the environment must already be up.
pub fn wait(binder: &ScopeBinder, service: &str, timeout: Option<&str>) -> Result<()> {
    let getter = binder.detached_getter()?;
    let timeout = match timeout {
        Some(raw) => parse_timeout(raw)?,
        None => getter.default_timeout(),
    };

    let ready = getter.get_with_timeout(service, timeout)?;
    println!(
        "{} {} is running ({})",
        "✓".bright_green(),
        service.bright_cyan(),
        ready.name()
    );

    if ready.endpoints.is_empty() {
        println!("  (no published ports)");
    }
    for endpoint in &ready.endpoints {
        println!("  {} -> {}", endpoint.container_port, endpoint.address());
    }

    Ok(())
}
