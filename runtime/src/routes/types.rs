use serde::Serialize;

use crate::pipeline::StatusReport;

#[derive(Debug, Serialize)]
pub struct RagContextResponse {
    pub rag_enabled: bool,
    pub context: String,
    pub chunk_count: usize,
    /// `None` when RAG was skipped because embedding settings are missing.
    pub status: Option<StatusReport>,
}

impl RagContextResponse {
    pub fn skipped() -> Self {
        Self {
            rag_enabled: false,
            context: String::new(),
            chunk_count: 0,
            status: None,
        }
    }
}
