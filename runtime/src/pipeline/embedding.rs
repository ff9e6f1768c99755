use std::time::Instant;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::ai::{Embedder, EmbeddingError, InputType};

use super::{
    error_reporter::report_failure,
    status::{Phase, PipelineStatus},
};

/// Runs one batched embedding call inside an `embedding_generation` phase.
///
/// The batch is checked for shape before it is returned: one vector per
/// input, all of the same dimension. Cancelling `cancel` drops the
/// in-flight request and nothing from it is used.
pub async fn generate_embeddings(
    embedder: &dyn Embedder,
    texts: &[String],
    input_type: InputType,
    status: &mut PipelineStatus,
    cancel: &CancellationToken,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let handle = status.start(
        Phase::EmbeddingGeneration,
        Some(input_type.as_str()),
        format!(
            "Generating {} {} embeddings with model {}",
            texts.len(),
            input_type.as_str(),
            embedder.model()
        ),
    );
    let clock = Instant::now();

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EmbeddingError::Cancelled),
        result = embedder.embed(texts, Some(input_type)) => {
            result.and_then(|vectors| validate_batch(texts.len(), vectors))
        }
    };

    match result {
        Ok(vectors) => {
            let dimension = vectors.first().map_or(0, Vec::len);
            status.succeed(
                handle,
                format!("Generated {} embeddings", vectors.len()),
                json!({
                    "num_embeddings": vectors.len(),
                    "embedding_dimension": dimension,
                    "model": embedder.model(),
                    "input_type": input_type.as_str(),
                    "elapsed_ms": clock.elapsed().as_millis() as u64,
                }),
            );
            Ok(vectors)
        }
        Err(err) => {
            report_failure(status, handle, &err, "Embedding generation failed");
            Err(err)
        }
    }
}

fn validate_batch(
    expected: usize,
    vectors: Vec<Vec<f32>>,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if vectors.len() != expected {
        return Err(EmbeddingError::CountMismatch {
            expected,
            returned: vectors.len(),
        });
    }
    if let Some(first) = vectors.first() {
        let dimension = first.len();
        if let Some((index, vector)) = vectors
            .iter()
            .enumerate()
            .find(|(_, vector)| vector.len() != dimension)
        {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                found: vector.len(),
                index,
            });
        }
    }
    Ok(vectors)
}
