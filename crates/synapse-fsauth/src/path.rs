//! Path containment checks for the allow-list security model.
//!
//! A candidate path is resolved the same way regardless of whether it
//! already exists: `..` and `.` segments are collapsed lexically, then
//! symlinks are resolved for however much of the path actually exists on
//! disk. The result is compared against the canonical allow-list roots.

use std::io;
use std::path::{Component, Path, PathBuf};

/// Collapse `.` and `..` components without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut stack: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match stack.last() {
                Some(Component::Normal(_)) => {
                    stack.pop();
                }
                _ => stack.push(component),
            },
            other => stack.push(other),
        }
    }
    stack.iter().collect()
}

/// Resolve `path` the way `Path.resolve(strict=False)` does: symlinks and
/// `..` segments are resolved against whatever prefix of the path exists,
/// without requiring the full path to exist.
pub fn resolve_weak(path: &Path) -> io::Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let normalized = normalize_lexically(&absolute);

    let mut existing = normalized.clone();
    let mut suffix: Vec<std::ffi::OsString> = Vec::new();
    loop {
        if existing.exists() {
            break;
        }
        let Some(Component::Normal(name)) = existing.components().next_back() else {
            break;
        };
        suffix.push(name.to_os_string());
        existing.pop();
    }

    let mut resolved = existing.canonicalize()?;
    for component in suffix.into_iter().rev() {
        resolved.push(component);
    }
    Ok(resolved)
}

/// Canonicalize an allow-list root at startup: create it if missing, then
/// resolve it fully so later containment checks compare like with like.
pub fn canonicalize_root(root: &Path) -> io::Result<PathBuf> {
    std::fs::create_dir_all(root)?;
    root.canonicalize()
}

/// True iff `candidate` resolves to a location inside (or equal to) one
/// of `roots`. Any resolution failure is treated as disallowed.
pub fn is_path_allowed(candidate: &Path, roots: &[PathBuf]) -> bool {
    match resolve_weak(candidate) {
        Ok(resolved) => roots.iter().any(|root| resolved.starts_with(root)),
        Err(_) => false,
    }
}
