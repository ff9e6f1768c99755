use super::types::RetrievalResult;

/// Renders ranked chunks as labelled blocks for prompt injection.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    precision: usize,
    separator: String,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            precision: 2,
            separator: "\n\n".to_string(),
        }
    }
}

impl ContextBuilder {
    pub fn new(precision: usize, separator: impl Into<String>) -> Self {
        Self {
            precision,
            separator: separator.into(),
        }
    }

    pub fn build(&self, results: &[RetrievalResult]) -> String {
        results
            .iter()
            .map(|result| {
                format!(
                    "--- Document: {} (Relevance: {:.*}) ---\n{}",
                    result.chunk.source_filename,
                    self.precision,
                    result.score,
                    result.chunk.text.trim()
                )
            })
            .collect::<Vec<_>>()
            .join(&self.separator)
    }
}
