use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub knowledge_base: KnowledgeBaseConfig,

    #[serde(default)]
    pub templates: TemplatesConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeBaseConfig {
    /// Directory holding the knowledge base (created if missing)
    #[serde(default = "default_root_directory")]
    pub root_directory: PathBuf,

    /// Name of the mandatory system subdirectory
    #[serde(default = "default_system_directory")]
    pub system_directory: String,

    /// Globs, relative to the root, excluded from listing and search.
    /// Unset means `<system_directory>/.index/**`.
    #[serde(default)]
    pub ignore_patterns: Option<Vec<String>>,

    /// Skip files that cannot be read during scans instead of failing
    #[serde(default = "default_true")]
    pub skip_unreadable: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TemplatesConfig {
    /// Relative to the root; unset means `<system_directory>/templates`
    #[serde(default)]
    pub template_directory: Option<String>,

    #[serde(default = "default_date_format")]
    pub date_format: String,

    #[serde(default = "default_time_format")]
    pub time_format: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Default tracing filter; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_root_directory() -> PathBuf {
    PathBuf::from("./knowledge-base")
}

fn default_system_directory() -> String {
    "system".to_string()
}

fn default_true() -> bool {
    true
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_time_format() -> String {
    "%H:%M".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl KnowledgeBaseConfig {
    pub fn ignore_patterns(&self) -> Vec<String> {
        match &self.ignore_patterns {
            Some(patterns) => patterns.clone(),
            None => vec![format!("{}/.index/**", self.system_directory)],
        }
    }
}

impl TemplatesConfig {
    pub fn template_directory(&self, system_directory: &str) -> String {
        match &self.template_directory {
            Some(dir) => dir.clone(),
            None => format!("{}/templates", system_directory),
        }
    }
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            root_directory: default_root_directory(),
            system_directory: default_system_directory(),
            ignore_patterns: None,
            skip_unreadable: true,
        }
    }
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            template_directory: None,
            date_format: default_date_format(),
            time_format: default_time_format(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Values that take precedence over the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub root_directory: Option<String>,
    pub system_directory: Option<String>,
    pub log_level: Option<String>,
}

impl Overrides {
    /// Reads `KNOWLEDGE_BASE_ROOT` and `KB_SYSTEM_DIR`.
    pub fn from_env() -> Self {
        Self {
            root_directory: std::env::var("KNOWLEDGE_BASE_ROOT").ok(),
            system_directory: std::env::var("KB_SYSTEM_DIR").ok(),
            log_level: None,
        }
    }

    /// Fields set in `other` win.
    pub fn merge(self, other: Overrides) -> Self {
        Self {
            root_directory: other.root_directory.or(self.root_directory),
            system_directory: other.system_directory.or(self.system_directory),
            log_level: other.log_level.or(self.log_level),
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional file (YAML or TOML, by
    /// extension) and the given overrides, in that order.
    pub fn load(explicit_file: Option<PathBuf>, overrides: Overrides) -> Result<Self> {
        let mut builder = ::config::Config::builder()
            .set_default("knowledge_base.root_directory", "./knowledge-base")?;

        if let Some(path) = explicit_file {
            builder = builder.add_source(::config::File::from(path));
        }

        // Env vars are unprefixed and fixed-name, so they arrive through `overrides`
        // rather than `config::Environment`.
        builder = builder
            .set_override_option("knowledge_base.root_directory", overrides.root_directory)?
            .set_override_option("knowledge_base.system_directory", overrides.system_directory)?
            .set_override_option("server.log_level", overrides.log_level)?;

        let config = builder
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() -> Result<()> {
        let config = Config::load(None, Overrides::default())?;
        assert_eq!(config.knowledge_base.root_directory, PathBuf::from("./knowledge-base"));
        assert_eq!(config.knowledge_base.system_directory, "system");
        assert_eq!(config.knowledge_base.ignore_patterns(), vec!["system/.index/**"]);
        assert!(config.knowledge_base.skip_unreadable);
        assert_eq!(config.templates.template_directory("system"), "system/templates");
        assert_eq!(config.templates.date_format, "%Y-%m-%d");
        assert_eq!(config.server.log_level, "info");
        Ok(())
    }

    #[test]
    fn test_yaml_file_and_overrides() -> Result<()> {
        let mut file = NamedTempFile::with_suffix(".yaml")?;
        writeln!(
            file,
            "knowledge_base:\n  root_directory: /srv/kb\n  skip_unreadable: false\n  ignore_patterns: []\ntemplates:\n  time_format: \"%H:%M:%S\"\n"
        )?;

        let config = Config::load(Some(file.path().to_path_buf()), Overrides::default())?;
        assert_eq!(config.knowledge_base.root_directory, PathBuf::from("/srv/kb"));
        assert!(!config.knowledge_base.skip_unreadable);
        assert!(config.knowledge_base.ignore_patterns().is_empty());
        assert_eq!(config.templates.time_format, "%H:%M:%S");
        assert_eq!(config.templates.date_format, "%Y-%m-%d");

        let overrides = Overrides {
            root_directory: Some("/tmp/other".into()),
            system_directory: Some("meta".into()),
            log_level: Some("debug".into()),
        };
        let config = Config::load(Some(file.path().to_path_buf()), overrides)?;
        assert_eq!(config.knowledge_base.root_directory, PathBuf::from("/tmp/other"));
        assert_eq!(config.knowledge_base.system_directory, "meta");
        assert_eq!(config.server.log_level, "debug");
        assert!(config.knowledge_base.ignore_patterns().is_empty());
        Ok(())
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = Config::load(Some(PathBuf::from("/nonexistent/mdkb.yaml")), Overrides::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_override_merge() {
        let env = Overrides {
            root_directory: Some("env".into()),
            system_directory: Some("sys".into()),
            log_level: None,
        };
        let cli = Overrides {
            root_directory: Some("cli".into()),
            ..Default::default()
        };
        let merged = env.merge(cli);
        assert_eq!(merged.root_directory.as_deref(), Some("cli"));
        assert_eq!(merged.system_directory.as_deref(), Some("sys"));
    }

    #[test]
    fn test_derived_paths_follow_system_directory() -> Result<()> {
        let config = Config::load(
            None,
            Overrides {
                system_directory: Some("meta".into()),
                ..Default::default()
            },
        )?;
        assert_eq!(config.knowledge_base.ignore_patterns(), vec!["meta/.index/**"]);
        assert_eq!(config.templates.template_directory("meta"), "meta/templates");

        let explicit = TemplatesConfig {
            template_directory: Some("tpl".into()),
            ..Default::default()
        };
        assert_eq!(explicit.template_directory("meta"), "tpl");
        Ok(())
    }

    #[test]
    fn test_env_overrides() -> Result<()> {
        // Only this test touches these variables.
        std::env::set_var("KNOWLEDGE_BASE_ROOT", "/tmp/mdkb-env-root");
        std::env::set_var("KB_SYSTEM_DIR", "mdkb-env-system");
        let overrides = Overrides::from_env();
        std::env::remove_var("KNOWLEDGE_BASE_ROOT");
        std::env::remove_var("KB_SYSTEM_DIR");

        let config = Config::load(None, overrides)?;
        assert_eq!(
            config.knowledge_base.root_directory,
            PathBuf::from("/tmp/mdkb-env-root")
        );
        assert_eq!(config.knowledge_base.system_directory, "mdkb-env-system");

        let cli = Overrides {
            root_directory: Some("/tmp/mdkb-cli-root".into()),
            ..Default::default()
        };
        let config = Config::load(
            None,
            Overrides {
                root_directory: Some("/tmp/mdkb-env-root".into()),
                system_directory: None,
                log_level: None,
            }
            .merge(cli),
        )?;
        assert_eq!(
            config.knowledge_base.root_directory,
            PathBuf::from("/tmp/mdkb-cli-root")
        );
        Ok(())
    }
}
