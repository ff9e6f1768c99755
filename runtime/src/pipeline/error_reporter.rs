use std::error::Error as StdError;

use tracing::error;

use crate::ai::EmbeddingError;

use super::{
    retriever::RetrievalError,
    status::{ErrorKind, PhaseHandle, PipelineStatus},
};

/// Maps a component error onto the kind stored in the status report.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

impl Classify for EmbeddingError {
    fn kind(&self) -> ErrorKind {
        match self {
            EmbeddingError::Timeout(_) => ErrorKind::Timeout,
            EmbeddingError::Network(_) => ErrorKind::Network,
            EmbeddingError::Authentication { .. } => ErrorKind::Authentication,
            EmbeddingError::RateLimited { .. } => ErrorKind::RateLimit,
            EmbeddingError::Http { .. } => ErrorKind::HttpStatus,
            EmbeddingError::InvalidResponse(_)
            | EmbeddingError::CountMismatch { .. }
            | EmbeddingError::DimensionMismatch { .. } => ErrorKind::InvalidResponse,
            EmbeddingError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl Classify for RetrievalError {
    fn kind(&self) -> ErrorKind {
        match self {
            RetrievalError::Embedding(err) => err.kind(),
            RetrievalError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
        }
    }
}

/// Fails the phase behind `handle` with exactly one error record and logs
/// the error's cause chain.
pub fn report_failure<E>(status: &mut PipelineStatus, handle: PhaseHandle, err: &E, context: &str)
where
    E: StdError + Classify,
{
    let kind = err.kind();
    error!(kind = ?kind, error = %err, "{context}");
    let mut source = err.source();
    let mut depth = 1;
    while let Some(cause) = source {
        error!(cause_depth = depth, cause = %cause, "caused by");
        source = cause.source();
        depth += 1;
    }
    status.fail_with_error(handle, kind, format!("{context}: {err}"));
}
