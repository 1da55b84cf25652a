use serde_yaml::{Mapping, Value};
use std::fmt::Write;
use std::path::Path;
use tracing::info;

use crate::error::Result;
use crate::files::FileManager;
use crate::frontmatter::Document;
use crate::template;

pub const GUIDE_FILE: &str = "llm-guide.md";
pub const GUIDE_TITLE: &str = "LLM Usage Guide";

const HEADING: &str = "# LLM Usage Guide for Knowledge Management System

## Overview
";

const STRUCTURE: &str = "
## Directory Structure
Current structure:
";

const OPERATIONS: &str = "
## File Operations
Use these MCP tools to manage files:

- `create_file`: Create new markdown files
- `read_file`: Read existing files with metadata
- `update_file`: Update content and frontmatter
- `delete_file`: Remove files
- `list_files`: List all markdown files
- `search_content`: Search across all content
- `list_templates`: List available templates
- `create_from_template`: Create a file from a template
- `regenerate_guide`: Refresh this guide

## Best Practices
1. Use descriptive file names
2. Include relevant metadata in frontmatter
3. Organize files in a logical structure
4. Use consistent naming conventions
5. Link related files using markdown links

## Templates
";

/// Relative path of the guide inside the knowledge base.
pub fn guide_path(fm: &FileManager) -> String {
    format!("{}/{}", fm.system_directory(), GUIDE_FILE)
}

/// Builds the guide text from the live directory tree and template directory.
pub fn generate(fm: &FileManager, template_dir: &Path) -> Result<String> {
    let mut guide = String::from(HEADING);
    let _ = writeln!(
        guide,
        "This knowledge base uses a flexible directory structure with only one requirement: a `{}/` directory for configuration and templates.",
        fm.system_directory()
    );
    guide.push_str(STRUCTURE);

    let root_name = fm
        .root()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let _ = writeln!(guide, "- {root_name}/");

    for (entry, _) in fm.walk()? {
        let indent = "  ".repeat(entry.depth());
        let name = entry.file_name().to_string_lossy();
        if entry.file_type().is_dir() {
            let _ = writeln!(guide, "{indent}- {name}/");
        } else if name.ends_with(".md") {
            let _ = writeln!(guide, "{indent}- {name}");
        }
    }

    guide.push_str(OPERATIONS);
    let templates = template::list_templates(template_dir)?;
    if templates.is_empty() {
        guide.push_str("No templates available yet.\n");
    }
    for name in templates {
        let _ = writeln!(guide, "- {name}");
    }

    Ok(guide)
}

/// Regenerates the guide and writes it into the system directory.
pub fn regenerate(fm: &FileManager, template_dir: &Path) -> Result<String> {
    let content = generate(fm, template_dir)?;

    let mut metadata = Mapping::new();
    metadata.insert(Value::from("type"), Value::from("system"));
    metadata.insert(Value::from("title"), Value::from(GUIDE_TITLE));
    metadata.insert(
        Value::from("generated"),
        Value::from(chrono::Local::now().to_rfc3339()),
    );

    let path = fm.write_document(&guide_path(fm), &Document::new(content, metadata))?;
    info!(path = %path, "Regenerated guide");
    Ok(path)
}
