// Config command: show resolved options and the environment they select
use crate::config::{find_project_config, user_config_path};
use crate::errors::{ComposeError, Result};
use crate::scope::ScopeBinder;
use colored::Colorize;

/// Print the merged options, the files they came from, and the environment key
pub fn show(binder: &ScopeBinder) -> Result<()> {
    println!("{}", "Resolved Options".bright_cyan().bold());
    println!("{}", "=".repeat(70));

    println!("\n{}:", "Config files (lowest priority first)".bright_cyan());
    let user = user_config_path().filter(|p| p.is_file());
    let project = find_project_config(binder.cwd());
    if user.is_none() && project.is_none() {
        println!("  (none, using defaults)");
    }
    for path in user.iter().chain(project.iter()) {
        println!("  • {}", path.display());
    }

    let yaml = serde_yml::to_string(binder.options())
        .map_err(|e| ComposeError::ConfigError(format!("Failed to serialize options: {}", e)))?;
    println!("\n{}", yaml.trim_end());

    println!("\n{}:", "Environment".bright_cyan());
    match binder.resolve_key() {
        Ok(key) => {
            println!("  {} {}", "✓".bright_green(), key);
            for file in key.files() {
                println!("    -f {}", file.display());
            }
        }
        Err(e) => println!("  {} {}", "⚠".bright_yellow(), e),
    }

    Ok(())
}
