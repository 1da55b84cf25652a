use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::TemplatesConfig;
use crate::error::{KbError, Result};
use crate::files::FileManager;
use crate::frontmatter::Document;

pub const TEMPLATE_SUFFIX: &str = ".template.md";

/// Replaces every `{{name}}` placeholder with its value from `vars`.
/// Unknown placeholders and unterminated braces are left as they are.
pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };

        let name = after[..close].trim();
        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &after[close + 2..];
    }

    out.push_str(rest);
    out
}

/// Sorted names of the `*.template.md` files directly inside `dir`.
/// A missing directory has no templates.
pub fn list_templates(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry
            .file_name()
            .to_str()
            .and_then(|n| n.strip_suffix(TEMPLATE_SUFFIX))
        {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Templates stored inside the knowledge base.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
    date_format: String,
    time_format: String,
}

impl TemplateStore {
    pub fn new(fm: &FileManager, config: &TemplatesConfig) -> Self {
        Self {
            dir: fm.root().join(config.template_directory(fm.system_directory())),
            date_format: config.date_format.clone(),
            time_format: config.time_format.clone(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn names(&self) -> Result<Vec<String>> {
        list_templates(&self.dir)
    }

    pub fn load(&self, name: &str) -> Result<String> {
        let file = format!("{name}{TEMPLATE_SUFFIX}");
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
            return Err(KbError::InvalidPath {
                path: file,
                reason: "template names cannot contain path separators",
            });
        }
        let path = self.dir.join(&file);
        if !path.is_file() {
            return Err(KbError::NotFound(file));
        }
        Ok(fs::read_to_string(path)?)
    }

    /// Built-in variables for a file created at `now`. Caller variables win.
    pub fn variables(
        &self,
        title: &str,
        extra: HashMap<String, String>,
        now: DateTime<Local>,
    ) -> HashMap<String, String> {
        let mut vars = HashMap::from([
            ("date".to_string(), now.format(&self.date_format).to_string()),
            ("time".to_string(), now.format(&self.time_format).to_string()),
            ("datetime".to_string(), now.to_rfc3339()),
            ("title".to_string(), title.to_string()),
        ]);
        vars.extend(extra);
        vars
    }

    /// Renders template `name` and writes the result to `path`. Frontmatter in
    /// the template becomes the new file's metadata.
    pub fn instantiate(
        &self,
        fm: &FileManager,
        name: &str,
        path: &str,
        title: &str,
        extra: HashMap<String, String>,
    ) -> Result<String> {
        let source = self.load(name)?;
        let vars = self.variables(title, extra, Local::now());
        let rendered = render(&source, &vars);
        let document = Document::parse(&rendered, path)?;
        let created = fm.write_document(path, &document)?;
        debug!(template = name, path = %created, "Created file from template");
        Ok(created)
    }
}
