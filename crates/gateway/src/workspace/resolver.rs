//! Path confinement for workspace requests.
//!
//! Caller-supplied paths are normalised lexically against the workspace root,
//! so a path that climbs above the root is rejected before the filesystem is
//! ever touched. Containment is decided on path components, never on string
//! prefixes: `/data/ws-evil` is not inside `/data/ws`.
//!
//! Lexical checks cannot see symlinks, so [`PathResolver::confine`] repeats
//! the containment check on the canonical form of whatever part of the path
//! already exists.

use std::ffi::OsStr;
use std::io;
use std::path::{Component, Path, PathBuf};

use tokio::fs;

use crate::error::{GatewayError, Result};

/// Resolves relative request paths inside a single workspace root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Create a resolver for the given root directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a request path against the root.
    ///
    /// Empty paths, `.` and `//` resolve to the root itself. A leading `/` is
    /// treated as relative to the root.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        self.normalize(Path::new(relative).components())
            .ok_or_else(|| GatewayError::Forbidden(format!("{relative:?} escapes the workspace root")))
    }

    /// Resolve `name` relative to `dir`, which must already lie inside the root.
    ///
    /// Used for uploaded file names: `..` may climb out of `dir` but never out
    /// of the root.
    pub fn resolve_child(&self, dir: &Path, name: &str) -> Result<PathBuf> {
        let base = dir.strip_prefix(&self.root).map_err(|_| {
            GatewayError::Forbidden(format!("{} is outside the workspace root", dir.display()))
        })?;

        self.normalize(base.components().chain(Path::new(name).components()))
            .ok_or_else(|| {
                GatewayError::Forbidden(format!(
                    "{name:?} under {} escapes the workspace root",
                    dir.display()
                ))
            })
    }

    /// Check that `path` does not reach outside the root through a symlink.
    ///
    /// The deepest existing ancestor of `path` is canonicalised and compared
    /// with the canonical root. Paths that do not exist yet are fine as long
    /// as the part that does exist stays inside.
    pub async fn confine(&self, path: &Path) -> Result<()> {
        let root = match fs::canonicalize(&self.root).await {
            Ok(root) => root,
            // Root not created yet: nothing below it can be a symlink.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(GatewayError::io("canonicalize", &self.root, e)),
        };

        let mut probe = path;
        loop {
            match fs::canonicalize(probe).await {
                Ok(real) if real.starts_with(&root) => return Ok(()),
                Ok(real) => {
                    return Err(GatewayError::Forbidden(format!(
                        "{} resolves to {} outside the workspace root",
                        path.display(),
                        real.display()
                    )))
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => match probe.parent() {
                    Some(parent) if probe != self.root.as_path() => probe = parent,
                    _ => return Ok(()),
                },
                Err(e) => return Err(GatewayError::io("canonicalize", probe, e)),
            }
        }
    }

    /// Lexically normalise components onto the root.
    ///
    /// Returns `None` when a `..` would pop above the root.
    fn normalize<'a>(&self, components: impl Iterator<Item = Component<'a>>) -> Option<PathBuf> {
        let mut segments: Vec<&OsStr> = Vec::new();

        for component in components {
            match component {
                Component::Normal(segment) => segments.push(segment),
                Component::ParentDir => {
                    segments.pop()?;
                }
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            }
        }

        let mut resolved = self.root.clone();
        resolved.extend(segments);

        resolved.starts_with(&self.root).then_some(resolved)
    }
}
