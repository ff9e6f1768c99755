use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ai::{Embedder, EmbeddingError, InputType};

use super::{
    embedding::generate_embeddings,
    error_reporter::report_failure,
    status::{Phase, PipelineStatus},
    types::{EmbeddedChunk, RetrievalResult},
    utils::preview,
};

pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("query embedding failed")]
    Embedding(#[from] EmbeddingError),
    #[error("query embedding has dimension {query} but the corpus uses {corpus}")]
    DimensionMismatch { query: usize, corpus: usize },
}

/// Cosine similarity of two vectors, clamped to `[-1, 1]`. Zero-norm
/// vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let score = dot / (norm_a.sqrt() * norm_b.sqrt());
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(-1.0, 1.0) as f32
}

/// Scores every chunk against `query` and keeps the best `top_k`. The sort
/// is stable, so equal scores keep corpus order.
pub fn rank(query: &[f32], corpus: &[EmbeddedChunk], top_k: usize) -> Vec<RetrievalResult> {
    select_top(score_all(query, corpus), top_k)
}

fn score_all(query: &[f32], corpus: &[EmbeddedChunk]) -> Vec<RetrievalResult> {
    corpus
        .iter()
        .map(|entry| RetrievalResult {
            chunk: entry.chunk.clone(),
            score: cosine_similarity(query, &entry.embedding),
        })
        .collect()
}

fn select_top(mut results: Vec<RetrievalResult>, top_k: usize) -> Vec<RetrievalResult> {
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results.truncate(top_k);
    results
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ScoreStats {
    min: f32,
    max: f32,
    mean: f32,
}

fn score_stats(results: &[RetrievalResult]) -> Option<ScoreStats> {
    if results.is_empty() {
        return None;
    }
    let (mut min, mut max, mut sum) = (f32::INFINITY, f32::NEG_INFINITY, 0.0f32);
    for result in results {
        min = min.min(result.score);
        max = max.max(result.score);
        sum += result.score;
    }
    Some(ScoreStats {
        min,
        max,
        mean: sum / results.len() as f32,
    })
}

/// Embeds `query` and ranks `corpus` against it inside a
/// `similarity_search` phase.
pub async fn retrieve(
    query: &str,
    corpus: &[EmbeddedChunk],
    top_k: usize,
    embedder: &dyn Embedder,
    status: &mut PipelineStatus,
    cancel: &CancellationToken,
) -> Result<Vec<RetrievalResult>, RetrievalError> {
    let handle = status.start(
        Phase::SimilaritySearch,
        None,
        format!("Searching {} chunks (top_k={top_k})", corpus.len()),
    );

    if corpus.is_empty() {
        status.warn(Phase::SimilaritySearch, "No chunks available for search");
        status.succeed(
            handle,
            "Nothing to search",
            json!({ "chunks_searched": 0, "num_results": 0 }),
        );
        return Ok(Vec::new());
    }

    let query_texts = [query.to_string()];
    let query_vector = match generate_embeddings(
        embedder,
        &query_texts,
        InputType::Query,
        status,
        cancel,
    )
    .await
    {
        Ok(mut vectors) => match vectors.pop() {
            Some(vector) => vector,
            None => {
                let err = RetrievalError::Embedding(EmbeddingError::CountMismatch {
                    expected: 1,
                    returned: 0,
                });
                report_failure(status, handle, &err, "Similarity search failed");
                return Err(err);
            }
        },
        Err(err) => {
            // already recorded on the embedding phase
            status.fail(handle, format!("Query embedding failed: {err}"));
            return Err(err.into());
        }
    };

    let corpus_dimension = corpus[0].embedding.len();
    if query_vector.len() != corpus_dimension {
        let err = RetrievalError::DimensionMismatch {
            query: query_vector.len(),
            corpus: corpus_dimension,
        };
        report_failure(status, handle, &err, "Similarity search failed");
        return Err(err);
    }

    let scored = score_all(&query_vector, corpus);
    let stats = score_stats(&scored);
    let results = select_top(scored, top_k);
    if let Some(top) = results.first() {
        debug!(
            score = top.score,
            source = %top.chunk.source_filename,
            preview = %preview(&top.chunk.text, 80),
            "top match"
        );
    }

    // corpus is non-empty here, so stats are always present
    let ScoreStats { min, max, mean } = stats.unwrap_or(ScoreStats {
        min: 0.0,
        max: 0.0,
        mean: 0.0,
    });
    status.succeed(
        handle,
        format!("Retrieved {} of {} chunks", results.len(), corpus.len()),
        json!({
            "chunks_searched": corpus.len(),
            "max_score": max,
            "mean_score": mean,
            "min_score": min,
            "num_results": results.len(),
        }),
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::Chunk;

    #[test]
    fn identical_vectors_score_one() {
        let v = [0.3, -1.2, 4.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn opposite_vectors_score_minus_one() {
        let score = cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]);
        assert!((score + 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_scores_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    fn entry(text: &str, embedding: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: Chunk {
                id: format!("chunk-{text}"),
                document_id: "doc".to_string(),
                source_filename: "doc.txt".to_string(),
                text: text.to_string(),
                sequence_index: 0,
            },
            embedding,
        }
    }

    #[test]
    fn stats_cover_every_scored_chunk() {
        let corpus = vec![
            entry("a", vec![1.0, 0.0]),
            entry("b", vec![0.0, 1.0]),
            entry("c", vec![-1.0, 0.0]),
        ];
        let scored = score_all(&[1.0, 0.0], &corpus);
        let stats = score_stats(&scored).unwrap();
        assert!((stats.max - 1.0).abs() < 1e-6);
        assert!((stats.min + 1.0).abs() < 1e-6);
        assert!(stats.mean.abs() < 1e-6);

        let top = select_top(scored, 1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].chunk.text, "a");
        assert_eq!(score_stats(&[]), None);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }
}
