//! Safety Module
//!
//! Checks run before anything is written: refuse protected system directories
//! as output targets, and refuse an output tree that lives inside its own input.

use std::path::{Path, PathBuf};

const DANGEROUS_DIRS: &[&str] = &[
    "/",
    "/System",
    "/usr",
    "/bin",
    "/sbin",
    "/etc",
    "/var",
    "/private",
    "/Library",
    "/Applications",
    "/Users",
    "/home",
    "/root",
    "/boot",
    "/dev",
    "/proc",
    "/sys",
];

pub fn check_dangerous_directory(path: &Path) -> Result<(), String> {
    let canonical = resolve(path);
    let path_str = canonical.to_string_lossy();

    if DANGEROUS_DIRS.iter().any(|dangerous| path_str == *dangerous) {
        return Err(format!(
            "Target directory '{}' is a protected system directory; choose a subdirectory",
            path_str
        ));
    }

    Ok(())
}

/// Rejects `output` equal to or nested inside `input`.
pub fn check_not_nested(input: &Path, output: &Path) -> Result<(), String> {
    let input = resolve(input);
    let output = resolve(output);

    if output.starts_with(&input) {
        return Err(format!(
            "Output '{}' lies inside input '{}'; converted files would be scanned as sources",
            output.display(),
            input.display()
        ));
    }

    Ok(())
}

/// Canonicalizes the longest existing ancestor and re-appends the rest,
/// so paths that do not exist yet still compare correctly. Relative paths
/// are anchored at the working directory first.
fn resolve(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut existing = absolute.clone();
    let mut tail = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            let mut resolved = canonical;
            for part in tail.iter().rev() {
                resolved.push(part);
            }
            return resolved;
        }
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                tail.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => return absolute,
        }
    }
}
