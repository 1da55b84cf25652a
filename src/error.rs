use thiserror::Error;

#[derive(Debug, Error)]
pub enum KbError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("Malformed frontmatter in {path}: {source}")]
    Frontmatter {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Frontmatter in {0} is not a key-value mapping")]
    FrontmatterNotMapping(String),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Walk(#[from] walkdir::Error),
}

pub type Result<T> = std::result::Result<T, KbError>;
