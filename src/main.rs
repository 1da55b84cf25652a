mod config;
mod error;
mod files;
mod frontmatter;
mod guide;
mod paths;
mod search;
mod template;
mod tools;

use anyhow::{Context, Result};
use clap::Parser;
use rmcp::{
    model::*, service::RequestContext, tool_handler, transport::stdio, ErrorData, RoleServer,
    ServerHandler, ServiceExt,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, Overrides};
use crate::files::FileManager;
use crate::template::TemplateStore;
use crate::tools::KnowledgeServer;

/// Markdown knowledge base served over MCP (stdio).
#[derive(Parser, Debug)]
#[command(name = "mdkb-mcp", version)]
struct Args {
    /// Path to a YAML or TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Knowledge base directory; overrides the config file and KNOWLEDGE_BASE_ROOT.
    #[arg(long)]
    knowledge_base: Option<String>,

    /// Default log filter (e.g. "debug"); RUST_LOG takes precedence.
    #[arg(long)]
    log_level: Option<String>,
}

#[tool_handler]
impl ServerHandler for KnowledgeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("Markdown knowledge base - create, read, update, delete, list and search markdown files with YAML frontmatter. Read the llm-guide resource for the current layout.".into()),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            ..Default::default()
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, ErrorData> {
        let mut resource = RawResource::new(self.guide_uri(), guide::GUIDE_TITLE);
        resource.description = Some(
            "Guide for LLMs on using this knowledge base: file operations, directory structure and templates"
                .into(),
        );
        resource.mime_type = Some("text/markdown".into());
        Ok(ListResourcesResult::with_all_items(vec![resource.no_annotation()]))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        let text = self.read_guide_resource(&request.uri)?;
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(text, request.uri)],
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let cli = Overrides {
        root_directory: args.knowledge_base,
        system_directory: None,
        log_level: args.log_level,
    };
    let config = Config::load(args.config, Overrides::from_env().merge(cli))?;

    // stdout carries JSON-RPC, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.server.log_level))
                .context("Invalid log level")?,
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let files = FileManager::new(&config.knowledge_base).with_context(|| {
        format!(
            "Failed to open knowledge base at {}",
            config.knowledge_base.root_directory.display()
        )
    })?;
    let templates = TemplateStore::new(&files, &config.templates);
    guide::regenerate(&files, templates.dir()).context("Failed to write the LLM guide")?;

    info!(root = %files.root().display(), "Starting markdown knowledge base MCP server");

    let service = KnowledgeServer::new(Arc::new(files), Arc::new(templates))
        .serve(stdio())
        .await
        .inspect_err(|e| tracing::error!("serving error: {:?}", e))?;
    service.waiting().await?;
    Ok(())
}
