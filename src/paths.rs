use std::path::{Component, Path, PathBuf};

use crate::error::{KbError, Result};

/// Maps caller-supplied relative paths onto the knowledge-base root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

/// A path inside the knowledge base, both as an absolute location and in its
/// normalized relative form.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPath {
    pub absolute: PathBuf,
    pub relative: String,
}

impl PathResolver {
    /// `root` should already be canonical.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, path_str: &str) -> Result<ResolvedPath> {
        let invalid = |reason| KbError::InvalidPath {
            path: path_str.to_string(),
            reason,
        };

        let mut parts: Vec<&str> = Vec::new();
        for component in Path::new(path_str).components() {
            match component {
                Component::Normal(part) => {
                    parts.push(part.to_str().ok_or_else(|| invalid("not valid UTF-8"))?)
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    if parts.pop().is_none() {
                        return Err(invalid("escapes the knowledge base root"));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(invalid("must be relative to the knowledge base root"))
                }
            }
        }
        if parts.is_empty() {
            return Err(invalid("path is empty"));
        }

        let relative = parts.join("/");
        let absolute = parts.iter().fold(self.root.clone(), |acc, p| acc.join(p));

        // Symlinks may still point elsewhere; check the deepest existing ancestor.
        let existing = absolute
            .ancestors()
            .find(|p| p.symlink_metadata().is_ok())
            .unwrap_or(self.root.as_path());
        let canonical = existing.canonicalize()?;
        if !canonical.starts_with(&self.root) {
            return Err(invalid("resolves outside the knowledge base root"));
        }

        Ok(ResolvedPath { absolute, relative })
    }

    /// Relative `/`-separated form of a path found while walking the root.
    pub fn relative_of(&self, absolute: &Path) -> Option<String> {
        let rel = absolute.strip_prefix(&self.root).ok()?;
        let parts: Option<Vec<&str>> = rel.components().map(|c| c.as_os_str().to_str()).collect();
        Some(parts?.join("/"))
    }
}
