use globset::{Glob, GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use serde::Serialize;
use serde_yaml::Mapping;
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use crate::config::KnowledgeBaseConfig;
use crate::error::{KbError, Result};
use crate::frontmatter::Document;
use crate::paths::PathResolver;
use crate::search::{self, SearchHit};

pub const DEFAULT_PATTERN: &str = "*.md";

/// A document as returned by [`FileManager::read`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    pub path: String,
    pub metadata: Mapping,
    pub content: String,
}

/// File operations on a knowledge-base directory.
#[derive(Debug)]
pub struct FileManager {
    paths: PathResolver,
    system_directory: String,
    ignore: GlobSet,
    skip_unreadable: bool,
}

impl FileManager {
    /// Opens the knowledge base, creating the root and its system directory
    /// if they are missing.
    pub fn new(config: &KnowledgeBaseConfig) -> Result<Self> {
        fs::create_dir_all(&config.root_directory)?;
        let root = config.root_directory.canonicalize()?;
        fs::create_dir_all(root.join(&config.system_directory))?;

        let ignore = build_ignore_set(&config.ignore_patterns())?;
        info!(
            root = %root.display(),
            system = %config.system_directory,
            "Opened knowledge base"
        );

        Ok(Self {
            paths: PathResolver::new(root),
            system_directory: config.system_directory.clone(),
            ignore,
            skip_unreadable: config.skip_unreadable,
        })
    }

    pub fn root(&self) -> &Path {
        self.paths.root()
    }

    pub fn system_directory(&self) -> &str {
        &self.system_directory
    }

    pub fn create(&self, path: &str, content: &str, metadata: Option<Mapping>) -> Result<String> {
        let document = Document::new(content, metadata.unwrap_or_default());
        self.write_document(path, &document)
    }

    /// Writes `document` at `path`, replacing whatever is there.
    pub fn write_document(&self, path: &str, document: &Document) -> Result<String> {
        let resolved = self.paths.resolve(path)?;
        if let Some(parent) = resolved.absolute.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&resolved.absolute, document.render()?)?;
        debug!(path = %resolved.relative, "Wrote document");
        Ok(resolved.relative)
    }

    pub fn read(&self, path: &str) -> Result<FileRecord> {
        let resolved = self.paths.resolve(path)?;
        if !resolved.absolute.exists() {
            return Err(KbError::NotFound(resolved.relative));
        }
        let text = fs::read_to_string(&resolved.absolute)?;
        let document = Document::parse(&text, &resolved.relative)?;
        Ok(FileRecord {
            path: resolved.relative,
            metadata: document.metadata,
            content: document.content,
        })
    }

    pub fn update(
        &self,
        path: &str,
        content: Option<String>,
        metadata: Option<Mapping>,
    ) -> Result<String> {
        let resolved = self.paths.resolve(path)?;
        if !resolved.absolute.exists() {
            return Err(KbError::NotFound(resolved.relative));
        }
        let text = fs::read_to_string(&resolved.absolute)?;
        let mut document = Document::parse(&text, &resolved.relative)?;

        if let Some(content) = content {
            document.content = content;
        }
        if let Some(metadata) = metadata {
            document.merge_metadata(metadata);
        }

        fs::write(&resolved.absolute, document.render()?)?;
        debug!(path = %resolved.relative, "Updated document");
        Ok(resolved.relative)
    }

    /// Returns whether a file was removed. A missing file is not an error.
    pub fn delete(&self, path: &str) -> Result<bool> {
        let resolved = self.paths.resolve(path)?;
        if resolved.absolute.is_dir() {
            return Err(KbError::InvalidPath {
                path: resolved.relative,
                reason: "is a directory",
            });
        }
        match fs::remove_file(&resolved.absolute) {
            Ok(()) => {
                debug!(path = %resolved.relative, "Deleted document");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Sorted relative paths of files matching `pattern`. Patterns without a
    /// `/` match file names at any depth; patterns with one match the
    /// relative path.
    pub fn list(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = FileMatcher::new(pattern)?;
        let mut files = Vec::new();
        for (entry, relative) in self.walk_files()? {
            if matcher.is_match(&entry, &relative) {
                files.push(relative);
            }
        }
        files.sort();
        files.dedup();
        Ok(files)
    }

    /// Case-insensitive substring search over every markdown file, in
    /// traversal order.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let matcher = FileMatcher::new(DEFAULT_PATTERN)?;
        let mut hits = Vec::new();
        for (entry, relative) in self.walk_files()? {
            if !matcher.is_match(&entry, &relative) {
                continue;
            }
            let content = match fs::read(entry.path()).map(String::from_utf8) {
                Ok(Ok(content)) => content,
                Ok(Err(e)) => {
                    let error = std::io::Error::new(std::io::ErrorKind::InvalidData, e);
                    self.unreadable(&relative, error)?;
                    continue;
                }
                Err(e) => {
                    self.unreadable(&relative, e)?;
                    continue;
                }
            };
            if let Some(preview) = document_preview(&relative, &content, query) {
                hits.push(SearchHit {
                    path: relative,
                    preview,
                });
            }
        }
        Ok(hits)
    }

    /// Walks the root in name order, skipping ignored paths. Yields each
    /// entry (root excluded) with its relative path.
    pub fn walk(&self) -> Result<Vec<(DirEntry, String)>> {
        let walker = WalkDir::new(self.root())
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.is_ignored_entry(e));

        let mut entries = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .and_then(|p| self.paths.relative_of(p))
                        .unwrap_or_default();
                    self.unreadable(&path, e)?;
                    continue;
                }
            };
            if let Some(relative) = self.paths.relative_of(entry.path()) {
                entries.push((entry, relative));
            }
        }
        Ok(entries)
    }

    fn walk_files(&self) -> Result<Vec<(DirEntry, String)>> {
        Ok(self
            .walk()?
            .into_iter()
            .filter(|(entry, _)| entry.file_type().is_file())
            .collect())
    }

    pub fn is_ignored(&self, relative: &str) -> bool {
        self.ignore.is_match(relative)
    }

    fn is_ignored_entry(&self, entry: &DirEntry) -> bool {
        self.paths
            .relative_of(entry.path())
            .is_some_and(|rel| !rel.is_empty() && self.is_ignored(&rel))
    }

    fn unreadable<E>(&self, path: &str, error: E) -> Result<()>
    where
        E: Into<KbError> + std::fmt::Display,
    {
        if self.skip_unreadable {
            debug!(path, %error, "Skipping unreadable entry");
            Ok(())
        } else {
            Err(error.into())
        }
    }
}

/// Containment is decided on the raw text, frontmatter included. The preview
/// is cut from the body when the body holds a match, otherwise from the raw text.
fn document_preview(relative: &str, content: &str, query: &str) -> Option<String> {
    let raw = search::match_preview(content, query)?;
    let body = Document::parse(content, relative)
        .ok()
        .and_then(|doc| search::match_preview(&doc.content, query));
    Some(body.unwrap_or(raw))
}

/// Gitignore-flavoured globs: a pattern without `/` applies at any depth,
/// and every pattern also covers everything below a matching directory.
fn build_ignore_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let trimmed = pattern.trim_end_matches('/');
        let trimmed = trimmed.strip_suffix("/**").unwrap_or(trimmed);
        if trimmed.is_empty() {
            continue;
        }
        let base = if trimmed.contains('/') {
            trimmed.trim_start_matches('/').to_string()
        } else {
            format!("**/{trimmed}")
        };
        builder.add(literal_glob(&base)?);
        builder.add(literal_glob(&format!("{base}/**"))?);
    }
    Ok(builder.build()?)
}

fn literal_glob(pattern: &str) -> Result<Glob> {
    Ok(GlobBuilder::new(pattern).literal_separator(true).build()?)
}

struct FileMatcher {
    matcher: GlobMatcher,
    by_path: bool,
}

impl FileMatcher {
    fn new(pattern: &str) -> Result<Self> {
        let by_path = pattern.contains('/');
        let pattern = if by_path && !pattern.starts_with("**/") {
            format!("**/{}", pattern.trim_start_matches('/'))
        } else {
            pattern.to_string()
        };
        Ok(Self {
            matcher: literal_glob(&pattern)?.compile_matcher(),
            by_path,
        })
    }

    fn is_match(&self, entry: &DirEntry, relative: &str) -> bool {
        if self.by_path {
            self.matcher.is_match(relative)
        } else {
            self.matcher.is_match(entry.file_name())
        }
    }
}
