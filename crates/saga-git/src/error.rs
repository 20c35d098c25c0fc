use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git not available: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("`git {command}` failed: {stderr}")]
    Failed { command: String, stderr: String },

    #[error("unexpected git output: {0}")]
    Parse(String),

    #[error("unknown revision: {0}")]
    NotFound(String),
}
