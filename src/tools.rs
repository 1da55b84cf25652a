use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    schemars, ErrorData,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use tracing::warn;
use url::Url;

use crate::error::KbError;
use crate::files::{FileManager, DEFAULT_PATTERN};
use crate::frontmatter::{self, Document};
use crate::guide;
use crate::template::TemplateStore;

pub const GUIDE_SCHEME: &str = "llm-guide";

pub type JsonObject = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateFileInput {
    #[schemars(description = "Relative path for the new file")]
    pub path: String,
    #[schemars(description = "File content")]
    pub content: String,
    #[schemars(description = "Optional frontmatter metadata")]
    pub metadata: Option<JsonObject>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct PathInput {
    #[schemars(description = "Relative path to the file")]
    pub path: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct UpdateFileInput {
    #[schemars(description = "Relative path to the file")]
    pub path: String,
    #[schemars(description = "New content (optional)")]
    pub content: Option<String>,
    #[schemars(description = "Metadata to merge into the existing frontmatter (optional)")]
    pub metadata: Option<JsonObject>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListFilesInput {
    #[schemars(description = "File pattern (default: *.md)")]
    pub pattern: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchInput {
    #[schemars(description = "Search query")]
    pub query: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateFromTemplateInput {
    #[schemars(description = "Template name, without the .template.md suffix")]
    pub template: String,
    #[schemars(description = "Relative path for the new file")]
    pub path: String,
    #[schemars(description = "Title of the new file, also used for the title placeholder")]
    pub title: String,
    #[schemars(description = "Extra placeholder values keyed by variable name (optional)")]
    pub variables: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone)]
pub struct KnowledgeServer {
    pub tool_router: ToolRouter<Self>,
    files: Arc<FileManager>,
    templates: Arc<TemplateStore>,
}

#[rmcp::tool_router]
impl KnowledgeServer {
    pub fn new(files: Arc<FileManager>, templates: Arc<TemplateStore>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            files,
            templates,
        }
    }

    #[rmcp::tool(
        description = "Create a new markdown file",
        annotations(destructive_hint = true)
    )]
    fn create_file(&self, Parameters(input): Parameters<CreateFileInput>) -> String {
        respond("create_file", self.create_file_impl(input))
    }

    #[rmcp::tool(description = "Read a markdown file", annotations(read_only_hint = true))]
    fn read_file(&self, Parameters(PathInput { path }): Parameters<PathInput>) -> String {
        respond("read_file", self.read_file_impl(&path))
    }

    #[rmcp::tool(
        description = "Update an existing markdown file",
        annotations(destructive_hint = true, idempotent_hint = true)
    )]
    fn update_file(&self, Parameters(input): Parameters<UpdateFileInput>) -> String {
        respond("update_file", self.update_file_impl(input))
    }

    #[rmcp::tool(
        description = "Delete a markdown file",
        annotations(destructive_hint = true)
    )]
    fn delete_file(&self, Parameters(PathInput { path }): Parameters<PathInput>) -> String {
        respond("delete_file", self.delete_file_impl(&path))
    }

    #[rmcp::tool(description = "List all markdown files", annotations(read_only_hint = true))]
    fn list_files(&self, Parameters(input): Parameters<ListFilesInput>) -> String {
        respond("list_files", self.list_files_impl(input.pattern.as_deref()))
    }

    #[rmcp::tool(
        description = "Search for text across all files",
        annotations(read_only_hint = true)
    )]
    fn search_content(&self, Parameters(SearchInput { query }): Parameters<SearchInput>) -> String {
        respond("search_content", self.search_content_impl(&query))
    }

    #[rmcp::tool(
        description = "List the templates available in the system templates directory",
        annotations(read_only_hint = true)
    )]
    fn list_templates(&self) -> String {
        respond("list_templates", self.list_templates_impl())
    }

    #[rmcp::tool(
        description = "Create a markdown file from a template, filling in the title, date, time and any extra placeholders",
        annotations(destructive_hint = true)
    )]
    fn create_from_template(&self, Parameters(input): Parameters<CreateFromTemplateInput>) -> String {
        respond("create_from_template", self.create_from_template_impl(input))
    }

    #[rmcp::tool(
        description = "Regenerate the LLM usage guide from the current directory structure",
        annotations(idempotent_hint = true)
    )]
    fn regenerate_guide(&self) -> String {
        respond("regenerate_guide", self.regenerate_guide_impl())
    }
}

fn respond(tool: &str, result: anyhow::Result<String>) -> String {
    match result {
        Ok(output) => output,
        Err(e) => {
            warn!(tool, error = %e, "Tool call failed");
            format!("Error: {}", e)
        }
    }
}

impl KnowledgeServer {
    pub fn files(&self) -> &FileManager {
        &self.files
    }

    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    pub fn guide_uri(&self) -> String {
        format!("{}://{}", GUIDE_SCHEME, guide::guide_path(&self.files))
    }

    /// The stored guide, frontmatter included.
    pub fn read_guide_resource(&self, uri: &str) -> Result<String, ErrorData> {
        let parsed = Url::parse(uri).map_err(|e| {
            ErrorData::invalid_params(format!("Invalid resource URI {}: {}", uri, e), None)
        })?;
        if parsed.scheme() != GUIDE_SCHEME {
            return Err(ErrorData::invalid_params(
                format!("Invalid URI scheme. Expected '{}://', got: {}", GUIDE_SCHEME, uri),
                None,
            ));
        }
        if uri != self.guide_uri() {
            return Err(ErrorData::resource_not_found(
                format!("Unknown resource URI: {}", uri),
                None,
            ));
        }

        let record = self
            .files
            .read(&guide::guide_path(&self.files))
            .map_err(|e| match e {
                KbError::NotFound(_) => {
                    ErrorData::resource_not_found(format!("Resource not found: {}", uri), None)
                }
                other => ErrorData::internal_error(
                    format!("Error reading resource {}: {}", uri, other),
                    None,
                ),
            })?;
        Document::new(record.content, record.metadata)
            .render()
            .map_err(|e| ErrorData::internal_error(e.to_string(), None))
    }

    fn create_file_impl(&self, input: CreateFileInput) -> anyhow::Result<String> {
        let metadata = input.metadata.map(frontmatter::mapping_from_json).transpose()?;
        let path = self.files.create(&input.path, &input.content, metadata)?;
        Ok(format!("Created file: {}", path))
    }

    fn read_file_impl(&self, path: &str) -> anyhow::Result<String> {
        let record = self.files.read(path)?;
        let mut output = format!("# {}\n\n", record.path);
        if !record.metadata.is_empty() {
            // Render the metadata alone as a frontmatter block.
            let block = Document::new("", record.metadata).render()?;
            output.push_str(&block);
        }
        output.push_str(&record.content);
        Ok(output)
    }

    fn update_file_impl(&self, input: UpdateFileInput) -> anyhow::Result<String> {
        let metadata = input.metadata.map(frontmatter::mapping_from_json).transpose()?;
        let path = self.files.update(&input.path, input.content, metadata)?;
        Ok(format!("Updated file: {}", path))
    }

    fn delete_file_impl(&self, path: &str) -> anyhow::Result<String> {
        if self.files.delete(path)? {
            Ok(format!("Deleted file: {}", path))
        } else {
            Ok(format!("File not found: {}", path))
        }
    }

    fn list_files_impl(&self, pattern: Option<&str>) -> anyhow::Result<String> {
        let files = self.files.list(pattern.unwrap_or(DEFAULT_PATTERN))?;
        let mut output = format!("Found {} files:", files.len());
        for file in &files {
            output.push('\n');
            output.push_str(file);
        }
        Ok(output)
    }

    fn search_content_impl(&self, query: &str) -> anyhow::Result<String> {
        let hits = self.files.search(query)?;
        if hits.is_empty() {
            return Ok("No matches found".to_string());
        }
        let mut output = format!("Found {} matches:\n\n", hits.len());
        for hit in &hits {
            writeln!(output, "**{}**\n{}\n", hit.path, hit.preview)?;
        }
        Ok(output)
    }

    fn list_templates_impl(&self) -> anyhow::Result<String> {
        let names = self.templates.names()?;
        let mut output = format!("Found {} templates:", names.len());
        for name in &names {
            output.push_str("\n- ");
            output.push_str(name);
        }
        Ok(output)
    }

    fn create_from_template_impl(&self, input: CreateFromTemplateInput) -> anyhow::Result<String> {
        let path = self.templates.instantiate(
            &self.files,
            &input.template,
            &input.path,
            &input.title,
            input.variables.unwrap_or_default(),
        )?;
        Ok(format!("Created file: {}", path))
    }

    fn regenerate_guide_impl(&self) -> anyhow::Result<String> {
        let path = guide::regenerate(&self.files, self.templates.dir())?;
        Ok(format!("Regenerated guide: {}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KnowledgeBaseConfig, TemplatesConfig};
    use tempfile::TempDir;

    fn server() -> (TempDir, KnowledgeServer) {
        let dir = TempDir::new().unwrap();
        let files = FileManager::new(&KnowledgeBaseConfig {
            root_directory: dir.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();
        let templates = TemplateStore::new(&files, &TemplatesConfig::default());
        (dir, KnowledgeServer::new(Arc::new(files), Arc::new(templates)))
    }

    fn json(value: serde_json::Value) -> JsonObject {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_note_scenario() {
        let (_dir, s) = server();

        assert_eq!(s.list_files(Parameters(ListFilesInput { pattern: None })), "Found 0 files:");

        let created = s.create_file(Parameters(CreateFileInput {
            path: "notes/a.md".into(),
            content: "Hello world".into(),
            metadata: Some(json(serde_json::json!({"type": "note"}))),
        }));
        assert_eq!(created, "Created file: notes/a.md");

        let read = s.read_file(Parameters(PathInput { path: "notes/a.md".into() }));
        assert_eq!(read, "# notes/a.md\n\n---\ntype: note\n---\n\nHello world");

        let found = s.search_content(Parameters(SearchInput { query: "world".into() }));
        assert_eq!(found, "Found 1 matches:\n\n**notes/a.md**\nHello world\n\n");

        let listed = s.list_files(Parameters(ListFilesInput { pattern: None }));
        assert_eq!(listed, "Found 1 files:\nnotes/a.md");

        let deleted = s.delete_file(Parameters(PathInput { path: "notes/missing.md".into() }));
        assert_eq!(deleted, "File not found: notes/missing.md");
    }

    #[test]
    fn test_update_and_errors() {
        let (_dir, s) = server();
        let missing = s.update_file(Parameters(UpdateFileInput {
            path: "nope.md".into(),
            content: None,
            metadata: None,
        }));
        assert_eq!(missing, "Error: File not found: nope.md");

        s.create_file(Parameters(CreateFileInput {
            path: "a.md".into(),
            content: "old".into(),
            metadata: None,
        }));
        let updated = s.update_file(Parameters(UpdateFileInput {
            path: "a.md".into(),
            content: Some("new".into()),
            metadata: Some(json(serde_json::json!({"tags": ["x", "y"]}))),
        }));
        assert_eq!(updated, "Updated file: a.md");

        let record = s.files().read("a.md").unwrap();
        assert_eq!(record.content, "new");
        assert!(record.metadata.contains_key("tags"));

        let escaped = s.read_file(Parameters(PathInput { path: "../x.md".into() }));
        assert!(escaped.starts_with("Error: Invalid path ../x.md"));
        assert_eq!(
            s.search_content(Parameters(SearchInput { query: "zzz".into() })),
            "No matches found"
        );
    }

    #[test]
    fn test_templates_and_guide() {
        let (_dir, s) = server();
        assert_eq!(s.list_templates(), "Found 0 templates:");

        std::fs::create_dir_all(s.templates().dir()).unwrap();
        std::fs::write(
            s.templates().dir().join("daily.template.md"),
            "# {{title}} ({{date}})\n",
        )
        .unwrap();
        assert_eq!(s.list_templates(), "Found 1 templates:\n- daily");

        let created = s.create_from_template(Parameters(CreateFromTemplateInput {
            template: "daily".into(),
            path: "journal/today.md".into(),
            title: "Today".into(),
            variables: None,
        }));
        assert_eq!(created, "Created file: journal/today.md");
        let record = s.files().read("journal/today.md").unwrap();
        assert!(record.content.starts_with("# Today ("));

        assert_eq!(s.regenerate_guide(), "Regenerated guide: system/llm-guide.md");
        let guide = s.files().read("system/llm-guide.md").unwrap();
        assert!(guide.content.contains("- today.md"));
        assert!(guide.content.contains("- daily"));
    }

    #[test]
    fn test_guide_resource() {
        let (_dir, s) = server();
        assert_eq!(s.guide_uri(), "llm-guide://system/llm-guide.md");

        let missing = s.read_guide_resource(&s.guide_uri()).unwrap_err();
        assert!(missing.message.contains("Resource not found"));

        s.regenerate_guide();
        let text = s.read_guide_resource(&s.guide_uri()).unwrap();
        assert!(text.starts_with("---\n"));
        assert!(text.contains("type: system"));
        assert!(text.contains("# LLM Usage Guide"));

        let unknown = s.read_guide_resource("llm-guide://system/other.md").unwrap_err();
        assert!(unknown.message.contains("Unknown resource URI"));
        let scheme = s.read_guide_resource("file:///etc/hosts").unwrap_err();
        assert!(scheme.message.contains("Invalid URI scheme"));
    }
}
