//! Confinement of instruction-derived paths to the configured root.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

/// Turn a free-text directory into a relative path under the root.
///
/// Leading separators and `.` segments are dropped; `..`, drive prefixes and
/// NUL bytes are refused outright rather than silently rewritten.
pub fn sanitize_relative(raw: &str) -> Result<PathBuf> {
    if raw.contains('\0') {
        bail!("path escapes root: contains a NUL byte");
    }
    let normalized = raw.trim().replace('\\', "/");
    let mut chars = normalized.chars();
    if let (Some(first), Some(':')) = (chars.next(), chars.next())
        && first.is_ascii_alphabetic()
    {
        bail!("path escapes root: drive-qualified path `{}`", raw);
    }

    let mut out = PathBuf::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => continue,
            ".." => bail!("path escapes root: `{}` contains `..`", raw),
            s => out.push(s),
        }
    }
    Ok(out)
}

/// A filename must be exactly one plain path component.
pub fn sanitize_filename(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() || name == "." || name == ".." {
        bail!("invalid filename `{}`", raw);
    }
    if name.contains(['/', '\\', '\0']) {
        bail!("path escapes root: filename `{}` contains a separator", raw);
    }
    Ok(name.to_string())
}

/// Canonical form of the deepest existing ancestor of `path`.
fn deepest_existing(path: &Path) -> Result<PathBuf> {
    let mut candidate = path;
    loop {
        if candidate.exists() {
            return candidate
                .canonicalize()
                .with_context(|| format!("failed to resolve {}", candidate.display()));
        }
        candidate = match candidate.parent() {
            Some(parent) => parent,
            None => bail!("no existing ancestor for {}", path.display()),
        };
    }
}

/// Fails when `target` (or, if it does not exist yet, its deepest existing
/// ancestor) resolves outside `root`. Catches symlinked escapes.
pub fn ensure_within(root: &Path, target: &Path) -> Result<()> {
    let root = root
        .canonicalize()
        .with_context(|| format!("root directory {} is not accessible", root.display()))?;
    let resolved = deepest_existing(target)?;
    if !resolved.starts_with(&root) {
        bail!(
            "path escapes root: {} resolves outside {}",
            target.display(),
            root.display()
        );
    }
    Ok(())
}

/// Whether `path` is already taken. A symlink is refused whether or not its
/// target exists, since writing through it can land outside the root.
pub fn existing_entry(path: &Path) -> Result<bool> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            bail!("path escapes root: {} is a symlink", path.display())
        }
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("failed to inspect {}", path.display())),
    }
}
