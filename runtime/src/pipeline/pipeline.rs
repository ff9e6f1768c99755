use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, info, info_span};

use crate::ai::{Embedder, InputType};

use super::{
    chunker::{ChunkConfig, Chunker, SentenceChunker},
    context::ContextBuilder,
    embedding::generate_embeddings,
    extractor::{DocumentExtractor, FormatExtractor},
    retriever::{DEFAULT_TOP_K, retrieve},
    status::{Phase, PipelineStatus, StatusReport},
    types::{Chunk, Document, pair_embeddings},
    utils::compute_mdhash_id,
};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub chunk: ChunkConfig,
    pub top_k: usize,
    /// Upper bound on documents extracted and chunked at the same time.
    pub max_concurrent_documents: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk: ChunkConfig::default(),
            top_k: DEFAULT_TOP_K,
            max_concurrent_documents: 4,
        }
    }
}

/// Result of one `build_context` call. Failures never escape as errors;
/// they are carried in `status`.
#[derive(Debug, Clone, Serialize)]
pub struct RagOutcome {
    pub context: String,
    /// Number of retrieved chunks that made it into `context`.
    pub chunk_count: usize,
    pub status: StatusReport,
}

struct IndexedDocument {
    filename: String,
    status: Option<PipelineStatus>,
    chunks: Result<Vec<Chunk>, String>,
}

#[derive(Clone)]
pub struct RagPipeline {
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn DocumentExtractor>,
    chunker: Arc<dyn Chunker>,
    context_builder: ContextBuilder,
    config: PipelineConfig,
}

impl RagPipeline {
    pub fn new(embedder: Arc<dyn Embedder>, config: PipelineConfig) -> Self {
        Self::with_dependencies(
            embedder,
            Arc::new(FormatExtractor),
            Arc::new(SentenceChunker),
            ContextBuilder::default(),
            config,
        )
    }

    pub fn with_dependencies(
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn DocumentExtractor>,
        chunker: Arc<dyn Chunker>,
        context_builder: ContextBuilder,
        config: PipelineConfig,
    ) -> Self {
        Self {
            embedder,
            extractor,
            chunker,
            context_builder,
            config,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.config.top_k = top_k;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn build_context(&self, query: &str, documents: Vec<Document>) -> RagOutcome {
        self.build_context_with_cancel(query, documents, CancellationToken::new())
            .await
    }

    /// Runs extraction, chunking, embedding, retrieval and formatting for
    /// one query. Cancelling `cancel` aborts any in-flight embedding call
    /// and the run ends with a `cancelled` error.
    pub async fn build_context_with_cancel(
        &self,
        query: &str,
        documents: Vec<Document>,
        cancel: CancellationToken,
    ) -> RagOutcome {
        let status = PipelineStatus::new();
        let span = info_span!("rag_pipeline", run_id = %status.run_id());
        self.run(query, documents, status, cancel)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        query: &str,
        documents: Vec<Document>,
        mut status: PipelineStatus,
        cancel: CancellationToken,
    ) -> RagOutcome {
        let document_count = documents.len();
        info!(
            documents = document_count,
            top_k = self.config.top_k,
            chunk_size = self.config.chunk.chunk_size,
            overlap = self.config.chunk.overlap,
            "rag pipeline started"
        );

        let (chunks, failed_documents) = self.index_documents(documents, &mut status).await;
        if chunks.is_empty() {
            if document_count > 0 {
                status.warn(
                    Phase::DocumentRetrieval,
                    "No chunks created from any document",
                );
            }
            return finish(status, String::new(), 0, failed_documents);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = match generate_embeddings(
            self.embedder.as_ref(),
            &texts,
            InputType::Passage,
            &mut status,
            &cancel,
        )
        .await
        {
            Ok(embeddings) => embeddings,
            Err(_) => return finish(status, String::new(), 0, failed_documents),
        };
        let corpus = pair_embeddings(chunks, embeddings);

        let results = match retrieve(
            query,
            &corpus,
            self.config.top_k,
            self.embedder.as_ref(),
            &mut status,
            &cancel,
        )
        .await
        {
            Ok(results) => results,
            Err(_) => return finish(status, String::new(), 0, failed_documents),
        };
        if results.is_empty() {
            status.warn(Phase::SimilaritySearch, "No relevant chunks found");
        }

        let handle = status.start(
            Phase::ContextBuilding,
            None,
            format!("Building context from {} chunks", results.len()),
        );
        let context = self.context_builder.build(&results);
        let total_characters: usize = results
            .iter()
            .map(|result| result.chunk.text.chars().count())
            .sum();
        status.succeed(
            handle,
            format!("Built context of {} characters", context.chars().count()),
            json!({
                "num_chunks": results.len(),
                "total_characters": total_characters,
                "avg_chunk_size": total_characters.checked_div(results.len()).unwrap_or(0),
            }),
        );

        finish(status, context, results.len(), failed_documents)
    }

    /// Extracts and chunks every document on the blocking pool. Results are
    /// merged in input order; a failed document is skipped with a warning.
    async fn index_documents(
        &self,
        documents: Vec<Document>,
        status: &mut PipelineStatus,
    ) -> (Vec<Chunk>, usize) {
        let handle = status.start(
            Phase::DocumentRetrieval,
            None,
            format!("Indexing {} documents", documents.len()),
        );

        if documents.is_empty() {
            status.warn(Phase::DocumentRetrieval, "No documents provided");
            status.succeed(
                handle,
                "No documents to index",
                json!({ "total_chunks": 0, "successful_documents": 0, "failed_documents": 0 }),
            );
            return (Vec::new(), 0);
        }

        let concurrency = self.config.max_concurrent_documents.max(1);
        let indexed: Vec<IndexedDocument> = stream::iter(documents.into_iter().map(|document| {
            let extractor = self.extractor.clone();
            let chunker = self.chunker.clone();
            let config = self.config.chunk;
            let mut doc_status = status.detached(&document.filename);
            let filename = document.filename.clone();
            let span = Span::current();
            async move {
                let task = tokio::task::spawn_blocking(move || {
                    let _entered = span.enter();
                    let chunks = index_document(
                        extractor.as_ref(),
                        chunker.as_ref(),
                        &config,
                        &document,
                        &mut doc_status,
                    );
                    (doc_status, chunks)
                });
                match task.await {
                    Ok((doc_status, chunks)) => IndexedDocument {
                        filename,
                        status: Some(doc_status),
                        chunks,
                    },
                    Err(err) => IndexedDocument {
                        filename,
                        status: None,
                        chunks: Err(format!("worker failed: {err}")),
                    },
                }
            }
        }))
        .buffered(concurrency)
        .collect()
        .await;

        let mut pooled = Vec::new();
        let (mut succeeded, mut failed) = (0usize, 0usize);
        for document in indexed {
            if let Some(doc_status) = document.status {
                status.merge(doc_status);
            }
            match document.chunks {
                Ok(chunks) => {
                    succeeded += 1;
                    pooled.extend(chunks);
                }
                Err(reason) => {
                    failed += 1;
                    status.warn(
                        Phase::DocumentRetrieval,
                        format!("Skipping document '{}': {reason}", document.filename),
                    );
                }
            }
        }

        status.succeed(
            handle,
            format!("Indexed {succeeded} documents into {} chunks", pooled.len()),
            json!({
                "total_chunks": pooled.len(),
                "successful_documents": succeeded,
                "failed_documents": failed,
            }),
        );
        (pooled, failed)
    }
}

fn index_document(
    extractor: &dyn DocumentExtractor,
    chunker: &dyn Chunker,
    config: &ChunkConfig,
    document: &Document,
    status: &mut PipelineStatus,
) -> Result<Vec<Chunk>, String> {
    let extracted = extractor
        .extract(&document.content, &document.filename, status)
        .map_err(|err| err.to_string())?;

    let chunks: Vec<Chunk> = chunker
        .chunk(&extracted.text, config, status)
        .into_iter()
        .enumerate()
        .map(|(sequence_index, text)| Chunk {
            id: compute_mdhash_id(
                &format!("{}:{sequence_index}:{text}", document.id),
                "chunk-",
            ),
            document_id: document.id.clone(),
            source_filename: document.filename.clone(),
            text,
            sequence_index,
        })
        .collect();
    if chunks.is_empty() {
        return Err("no chunks created".to_string());
    }
    Ok(chunks)
}

fn finish(
    status: PipelineStatus,
    context: String,
    chunk_count: usize,
    failed_documents: usize,
) -> RagOutcome {
    let report = status.finish();
    // a failed run never hands back partial context
    let (context, chunk_count) = if report.success {
        (context, chunk_count)
    } else {
        (String::new(), 0)
    };
    info!(
        elapsed_seconds = report.total_elapsed_seconds,
        success = report.success,
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        chunks_used = chunk_count,
        context_chars = context.chars().count(),
        failed_documents,
        "rag pipeline finished"
    );
    RagOutcome {
        context,
        chunk_count,
        status: report,
    }
}
