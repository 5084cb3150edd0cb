//! Path Containment
//!
//! Validates that every proposed path resolves strictly inside the
//! configured source root. Traversal components, absolute paths, and
//! symlinks pointing out of the root all invalidate a proposal before it
//! is persisted.

use std::path::{Component, Path, PathBuf};

use crate::error::{EngineError, Result};

/// Normalize `relative` against `source_root` and confirm containment.
///
/// Returns the absolute target path on success. The check is two-layered:
/// a lexical component walk (no `..` may escape, no absolute or prefix
/// components), then symlink resolution of the deepest existing ancestor
/// so a link inside the tree cannot smuggle a write outside it.
pub fn contain(source_root: &Path, relative: &str) -> Result<PathBuf> {
    let invalid = |reason: &str| EngineError::InvalidPath {
        path: relative.to_string(),
        reason: reason.to_string(),
    };

    if relative.is_empty() {
        return Err(invalid("empty path"));
    }

    let rel = Path::new(relative);
    if rel.is_absolute() {
        return Err(invalid("absolute paths are not allowed"));
    }

    // Lexical normalization: walk components, never escaping the root.
    let mut normalized = PathBuf::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(invalid("path traverses above the source root"));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("absolute paths are not allowed"));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(invalid("path resolves to the source root itself"));
    }

    let root = source_root
        .canonicalize()
        .map_err(|e| invalid(&format!("source root unavailable: {e}")))?;
    let target = root.join(&normalized);

    // Symlink check: canonicalize the deepest existing ancestor and make
    // sure it is still inside the root.
    let mut probe = target.clone();
    let resolved = loop {
        match probe.canonicalize() {
            Ok(p) => break p,
            Err(_) => match probe.parent() {
                Some(parent) => probe = parent.to_path_buf(),
                None => return Err(invalid("path has no resolvable ancestor")),
            },
        }
    };

    if !resolved.starts_with(&root) {
        return Err(invalid("path resolves outside the source root"));
    }

    Ok(target)
}
