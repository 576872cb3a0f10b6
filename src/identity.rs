/// Identity resolution for environment definitions
///
/// Turns the raw `--docker-compose` style arguments plus a base directory
/// search order into one canonical [`EnvironmentKey`]. Two requests that
/// resolve to the same base directory and the same ordered file list always
/// produce equal keys, so the registry can share one environment between them.
///
/// File order is significant: later compose files override earlier ones.
use crate::errors::{ComposeError, Result};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};

/// File name appended when an argument names a directory
pub const DEFAULT_DEFINITION_FILE: &str = "docker-compose.yml";

/// Canonical identity of one environment definition set
#[derive(Debug, Clone)]
pub struct EnvironmentKey {
    base_dir: PathBuf,
    files: Vec<PathBuf>,
    canonical: String,
}

impl EnvironmentKey {
    /// Build a key from a base directory and base-relative files
    pub fn new(base_dir: PathBuf, files: Vec<PathBuf>) -> Self {
        let base_dir = normalize(&base_dir);
        let files: Vec<PathBuf> = files.iter().map(|f| normalize(f)).collect();
        let canonical = format!(
            "{}#{}",
            base_dir.display(),
            files
                .iter()
                .map(|f| f.display().to_string())
                .collect::<Vec<_>>()
                .join(",")
        );

        Self {
            base_dir,
            files,
            canonical,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Directory the definition files are relative to
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Files as command-line arguments, in definition order
    pub fn file_args(&self) -> Vec<String> {
        self.files
            .iter()
            .map(|f| f.to_string_lossy().to_string())
            .collect()
    }
}

impl PartialEq for EnvironmentKey {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for EnvironmentKey {}

impl Hash for EnvironmentKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Display for EnvironmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

/// Split raw arguments on commas, dropping empty entries
///
/// An empty argument list means the current directory.
pub fn split_arguments(raw: &[String]) -> Vec<String> {
    let args: Vec<String> = raw
        .iter()
        .flat_map(|arg| arg.split(','))
        .map(str::trim)
        .filter(|arg| !arg.is_empty())
        .map(str::to_string)
        .collect();

    if args.is_empty() {
        vec![".".to_string()]
    } else {
        args
    }
}

/// Resolve definition arguments against candidate base directories
///
/// The first base under which every argument resolves to an existing file
/// wins. If none does, the last candidate is used and the first argument that
/// does not resolve under it is reported.
pub fn resolve(raw: &[String], bases: &[PathBuf]) -> Result<EnvironmentKey> {
    let fallback = bases.last().ok_or_else(|| {
        ComposeError::ConfigError("No base directories to search for definitions".to_string())
    })?;
    let args = split_arguments(raw);

    for base in bases {
        if let Some(files) = resolve_all(&args, base) {
            return Ok(EnvironmentKey::new(base.clone(), files));
        }
    }

    let argument = args
        .iter()
        .find(|arg| resolve_under(arg, fallback).is_none())
        .cloned()
        .unwrap_or_else(|| args.join(","));

    Err(ComposeError::DefinitionNotFound {
        argument,
        searched: bases.to_vec(),
    })
}

fn resolve_all(args: &[String], base: &Path) -> Option<Vec<PathBuf>> {
    args.iter().map(|arg| resolve_under(arg, base)).collect()
}

/// Resolve one argument under `base`, returning the base-relative file
fn resolve_under(arg: &str, base: &Path) -> Option<PathBuf> {
    let raw = Path::new(arg);
    let mut candidate = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        base.join(raw)
    };

    if candidate.is_dir() {
        candidate.push(DEFAULT_DEFINITION_FILE);
    }
    if !candidate.is_file() {
        return None;
    }

    let candidate = normalize(&candidate);
    let base = normalize(base);
    match candidate.strip_prefix(&base) {
        Ok(relative) => Some(relative.to_path_buf()),
        // Absolute files outside the base keep their absolute path
        Err(_) => Some(candidate),
    }
}

/// Lexically normalize a path: drop `.`, fold `..` into its parent
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = match normalized.components().next_back() {
                    Some(Component::Normal(_)) => normalized.pop(),
                    _ => false,
                };
                if !popped && !normalized.has_root() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }

    if normalized.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        normalized
    }
}
