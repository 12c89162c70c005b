//! Path confinement for the sandbox root.
//!
//! Every path an operation touches is a [`ValidatedPath`], and the only way to
//! obtain one is [`PathGuard::validate`]. Candidates are canonicalized
//! (symlinks and `..` resolved) before being compared segment-wise against the
//! canonical root, so string-prefix tricks like `/data-evil` or
//! `/data/../etc/passwd` never pass.

use crate::errors::{AppError, AppResult};
use path_clean::PathClean;
use serde::Serialize;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Whether the target of a path argument must already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathIntent {
    Existing,
    /// Target may be absent; its parent directory must exist.
    Create,
}

/// A path proven to resolve inside the sandbox root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPath(PathBuf);

impl ValidatedPath {
    pub fn as_path(&self) -> &Path { &self.0 }

    pub fn file_stem(&self) -> Option<&str> { self.0.file_stem().and_then(|s| s.to_str()) }

    pub fn extension(&self) -> Option<&str> { self.0.extension().and_then(|s| s.to_str()) }

    /// Sibling path with the extension replaced. Still needs validation before use.
    pub fn with_extension(&self, ext: &str) -> PathBuf { self.0.with_extension(ext) }

    /// Sibling path with a different file name. Still needs validation before use.
    pub fn with_file_name(&self, name: &str) -> PathBuf { self.0.with_file_name(name) }
}

impl fmt::Display for ValidatedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.display().fmt(f) }
}

#[derive(Debug, Clone)]
pub struct PathGuard {
    /// Root as configured, lexically cleaned.
    configured: PathBuf,
    /// Root with every symlink resolved.
    canonical: PathBuf,
}

impl PathGuard {
    pub fn new(root: &Path) -> anyhow::Result<Self> {
        if !root.is_absolute() {
            anyhow::bail!("sandbox root must be absolute: {}", root.display());
        }
        let canonical = dunce::canonicalize(root)?;
        if !canonical.is_dir() {
            anyhow::bail!("sandbox root is not a directory: {}", root.display());
        }
        Ok(Self { configured: root.clean(), canonical })
    }

    pub fn root(&self) -> &Path { &self.canonical }

    pub fn validate(&self, candidate: &str, intent: PathIntent) -> AppResult<ValidatedPath> {
        if candidate.is_empty() || candidate.contains('\0') {
            return Err(AppError::AccessDenied);
        }
        self.validate_path(Path::new(candidate), intent)
    }

    /// Validates a path derived from an already validated one, e.g. an output sibling.
    pub fn validate_derived(&self, derived: PathBuf) -> AppResult<ValidatedPath> {
        self.validate_path(&derived, PathIntent::Create)
    }

    fn validate_path(&self, candidate: &Path, intent: PathIntent) -> AppResult<ValidatedPath> {
        let joined = if candidate.is_absolute() { candidate.to_path_buf() } else { self.configured.join(candidate) };

        // decides denial for targets that don't exist at all, before touching the filesystem
        let lexical = joined.clean();
        if !lexical.starts_with(&self.configured) && !lexical.starts_with(&self.canonical) {
            tracing::debug!("path rejected by lexical check");
            return Err(AppError::AccessDenied);
        }

        match dunce::canonicalize(&joined) {
            Ok(resolved) => self.contain(resolved),
            Err(e) if is_missing(&e) => match intent {
                PathIntent::Existing => Err(self.classify_missing(&joined)),
                PathIntent::Create => self.validate_new(&joined),
            },
            Err(e) => {
                tracing::debug!(error = %e, "canonicalize failed");
                Err(AppError::AccessDenied)
            }
        }
    }

    fn validate_new(&self, joined: &Path) -> AppResult<ValidatedPath> {
        let name = match joined.components().next_back() {
            Some(Component::Normal(name)) => name.to_owned(),
            _ => return Err(AppError::AccessDenied),
        };
        // a dangling symlink would let the write land wherever it points
        if std::fs::symlink_metadata(joined).is_ok() {
            return Err(AppError::AccessDenied);
        }
        let parent = joined.parent().ok_or(AppError::AccessDenied)?;
        let parent = match dunce::canonicalize(parent) {
            Ok(p) => p,
            Err(e) if is_missing(&e) => return Err(self.classify_missing(parent)),
            Err(_) => return Err(AppError::AccessDenied),
        };
        if !parent.starts_with(&self.canonical) {
            return Err(AppError::AccessDenied);
        }
        if !parent.is_dir() {
            return Err(AppError::NotFound);
        }
        self.contain(parent.join(name))
    }

    /// Decides between `NotFound` and `AccessDenied` for a path that does not resolve,
    /// based only on where its deepest resolvable ancestor lives.
    fn classify_missing(&self, path: &Path) -> AppError {
        for ancestor in path.ancestors() {
            match dunce::canonicalize(ancestor) {
                Ok(resolved) if resolved.starts_with(&self.canonical) => return AppError::NotFound,
                Ok(_) => return AppError::AccessDenied,
                // present but unresolvable: a dangling symlink, wherever it points
                Err(_) if std::fs::symlink_metadata(ancestor).is_ok() => return AppError::AccessDenied,
                Err(_) => continue,
            }
        }
        AppError::AccessDenied
    }

    fn contain(&self, resolved: PathBuf) -> AppResult<ValidatedPath> {
        if resolved.starts_with(&self.canonical) {
            Ok(ValidatedPath(resolved))
        } else {
            Err(AppError::AccessDenied)
        }
    }
}

/// Errors meaning "no such entry", including a regular file used as a directory.
fn is_missing(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}
