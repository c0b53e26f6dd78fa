use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PerceptionError {
    #[error("failed to load {kind} model from {path:?}: {message}")]
    ModelLoad {
        kind: &'static str,
        path: PathBuf,
        message: String,
    },
    #[error("{kind} model returned unexpected output: {detail}")]
    UnexpectedOutput { kind: &'static str, detail: String },
    #[error("gesture model scores {actual} classes but {expected} labels are configured")]
    LabelMismatch { expected: usize, actual: usize },
    #[cfg(feature = "with-tch")]
    #[error(transparent)]
    Torch(#[from] tch::TchError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
