//! Error taxonomy for the pipeline.
//!
//! `Git`/`Chunking`/`Synthesis`/`Configuration` are fatal: a caller that sees
//! one of these must assume the repository's refs were left untouched.
//! Parse failures are deliberately not a variant here -- they never escape
//! a component boundary as an `Err`; the AST and labelling stages catch them
//! internally and demote the offending chunk to a `None` signature instead.

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("git command failed: {command}\n{stderr}")]
    Git { command: String, stderr: String },

    #[error("chunking invariant violated: {0}")]
    Chunking(String),

    #[error("synthesis failed for group {group_id}: {cause}")]
    Synthesis {
        group_id: String,
        #[source]
        cause: anyhow::Error,
    },

    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
