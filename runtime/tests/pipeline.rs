mod common;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::http::StatusCode;
use case_rag::{
    ai::{Embedder, EmbeddingError, HttpEmbedder, InputType},
    pipeline::{
        ChunkConfig, ContextBuilder, Document, DocumentExtractor, ErrorKind, ExtractError,
        ExtractedText, FormatExtractor, Phase, PhaseState, PipelineConfig, PipelineStatus,
        RagPipeline, SentenceChunker,
    },
};
use common::{Behavior, MockEmbeddingServer, text_document};
use serde_json::json;
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_secs(5);

fn small_chunks(top_k: usize) -> PipelineConfig {
    PipelineConfig {
        chunk: ChunkConfig {
            chunk_size: 20,
            overlap: 5,
        },
        top_k,
        max_concurrent_documents: 2,
    }
}

fn http_pipeline(server: &MockEmbeddingServer, config: PipelineConfig) -> anyhow::Result<RagPipeline> {
    let embedder = HttpEmbedder::new(&server.base_url, "test-key", "mock-model", TIMEOUT)?;
    Ok(RagPipeline::new(Arc::new(embedder), config))
}

/// Scores text by which topic words it mentions.
struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn model(&self) -> &str {
        "keyword"
    }

    async fn embed(
        &self,
        texts: &[String],
        _input_type: Option<InputType>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|text| {
                let text = text.to_lowercase();
                vec![
                    f32::from(u8::from(text.contains("contract"))),
                    f32::from(u8::from(text.contains("rain"))),
                    0.1,
                ]
            })
            .collect())
    }
}

/// Never answers.
struct PendingEmbedder;

#[async_trait]
impl Embedder for PendingEmbedder {
    fn model(&self) -> &str {
        "pending"
    }

    async fn embed(
        &self,
        _texts: &[String],
        _input_type: Option<InputType>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        std::future::pending().await
    }
}

/// Panics on one filename, delegates everything else.
struct PanickingExtractor;

impl DocumentExtractor for PanickingExtractor {
    fn extract(
        &self,
        bytes: &[u8],
        filename: &str,
        status: &mut PipelineStatus,
    ) -> Result<ExtractedText, ExtractError> {
        if filename == "boom.txt" {
            panic!("extractor exploded");
        }
        FormatExtractor.extract(bytes, filename, status)
    }
}

#[tokio::test]
async fn corrupt_document_is_skipped_with_one_warning() -> anyhow::Result<()> {
    let server = MockEmbeddingServer::start(Behavior::UnitVectors(3)).await?;
    let pipeline = http_pipeline(&server, PipelineConfig::default())?;

    let documents = vec![
        text_document("facts.txt", "The witness saw the car at noon."),
        Document::new("doc-broken", "broken.pdf", b"%PDF-1.7 garbage".to_vec()),
        text_document("notes.md", "Follow up with the insurer."),
    ];
    let outcome = pipeline
        .build_context("What did the witness see?", documents)
        .await;

    assert!(outcome.status.success);
    assert!(!outcome.context.is_empty());
    let naming_broken: Vec<_> = outcome
        .status
        .warnings
        .iter()
        .filter(|warning| warning.message.contains("broken.pdf"))
        .collect();
    assert_eq!(naming_broken.len(), 1);
    assert_eq!(outcome.status.warnings.len(), 1);
    assert!(!outcome.context.contains("broken.pdf"));
    assert!(outcome.context.contains("facts.txt"));
    assert!(outcome.context.contains("notes.md"));

    let indexing = outcome
        .status
        .phases_named(Phase::DocumentRetrieval)
        .next()
        .expect("indexing phase");
    assert_eq!(indexing.metrics["failed_documents"], 1);
    assert_eq!(indexing.metrics["successful_documents"], 2);
    Ok(())
}

#[tokio::test]
async fn blank_document_counts_as_failed() -> anyhow::Result<()> {
    let server = MockEmbeddingServer::start(Behavior::UnitVectors(3)).await?;
    let pipeline = http_pipeline(&server, PipelineConfig::default())?;

    let documents = vec![
        text_document("blank.txt", "   \n\t  "),
        text_document("real.txt", "The lease ends in March."),
    ];
    let outcome = pipeline.build_context("When does the lease end?", documents).await;

    assert!(outcome.status.success);
    assert!(outcome.context.contains("real.txt"));
    assert!(!outcome.context.contains("blank.txt"));
    assert!(outcome.status.warnings.iter().any(|warning| {
        warning.phase == Phase::DocumentRetrieval
            && warning.message == "Skipping document 'blank.txt': no chunks created"
    }));

    let indexing = outcome
        .status
        .phases_named(Phase::DocumentRetrieval)
        .next()
        .expect("indexing phase");
    assert_eq!(indexing.metrics["failed_documents"], 1);
    assert_eq!(indexing.metrics["successful_documents"], 1);
    assert_eq!(indexing.metrics["total_chunks"], 1);
    Ok(())
}

#[tokio::test]
async fn empty_corpus_returns_empty_context() -> anyhow::Result<()> {
    let server = MockEmbeddingServer::start(Behavior::UnitVectors(3)).await?;
    let pipeline = http_pipeline(&server, PipelineConfig::default())?;

    let outcome = pipeline.build_context("any query", Vec::new()).await;

    assert_eq!(outcome.context, "");
    assert_eq!(outcome.chunk_count, 0);
    assert!(outcome.status.success);
    assert!(!outcome.status.warnings.is_empty());
    assert!(server.requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn all_documents_failing_is_not_an_error() -> anyhow::Result<()> {
    let server = MockEmbeddingServer::start(Behavior::UnitVectors(3)).await?;
    let pipeline = http_pipeline(&server, PipelineConfig::default())?;

    let outcome = pipeline
        .build_context(
            "query",
            vec![Document::new("d1", "scan.pdf", b"not a pdf".to_vec())],
        )
        .await;

    assert!(outcome.status.success);
    assert_eq!(outcome.chunk_count, 0);
    assert!(
        outcome
            .status
            .warnings
            .iter()
            .any(|warning| warning.message == "No chunks created from any document")
    );
    assert!(server.requests().is_empty());
    Ok(())
}

#[tokio::test]
async fn unauthorized_embedding_fails_the_run() -> anyhow::Result<()> {
    let server = MockEmbeddingServer::start(Behavior::Status(
        StatusCode::UNAUTHORIZED,
        json!({ "error": { "message": "Incorrect API key provided" } }).to_string(),
    ))
    .await?;
    let pipeline = http_pipeline(&server, PipelineConfig::default())?;

    let outcome = pipeline
        .build_context(
            "query",
            vec![text_document("a.txt", "Some case notes.")],
        )
        .await;

    assert_eq!(outcome.context, "");
    assert_eq!(outcome.chunk_count, 0);
    assert!(!outcome.status.success);
    assert_eq!(outcome.status.errors.len(), 1);
    let error = &outcome.status.errors[0];
    assert_eq!(error.kind, ErrorKind::Authentication);
    assert_eq!(error.phase, Phase::EmbeddingGeneration);
    assert!(error.message.contains("401"));
    assert!(
        outcome
            .status
            .phases_named(Phase::SimilaritySearch)
            .next()
            .is_none()
    );
    Ok(())
}

#[tokio::test]
async fn end_to_end_builds_labelled_context() -> anyhow::Result<()> {
    let server = MockEmbeddingServer::start(Behavior::UnitVectors(8)).await?;
    let pipeline = http_pipeline(&server, small_chunks(1))?;

    let outcome = pipeline
        .build_context(
            "What evidence supports the claim?",
            vec![text_document("a.txt", "Alpha beta gamma. Delta epsilon zeta.")],
        )
        .await;

    assert!(outcome.status.success, "{:?}", outcome.status.errors);
    assert_eq!(outcome.chunk_count, 1);
    assert_eq!(
        outcome.context,
        "--- Document: a.txt (Relevance: 1.00) ---\nAlpha beta gamma."
    );

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].body["input_type"], "passage");
    assert_eq!(
        requests[0].body["input"],
        json!(["Alpha beta gamma.", "amma. Delta epsilon ", "silon zeta."])
    );
    assert_eq!(requests[1].body["input_type"], "query");
    assert_eq!(
        requests[1].body["input"],
        json!(["What evidence supports the claim?"])
    );

    let phases: Vec<Phase> = outcome.status.phases.iter().map(|record| record.phase).collect();
    assert_eq!(
        phases,
        vec![
            Phase::DocumentRetrieval,
            Phase::ContentParsing,
            Phase::TextChunking,
            Phase::EmbeddingGeneration,
            Phase::SimilaritySearch,
            Phase::EmbeddingGeneration,
            Phase::ContextBuilding,
        ]
    );
    assert!(
        outcome
            .status
            .phases
            .iter()
            .all(|record| record.status == PhaseState::Success)
    );
    Ok(())
}

#[tokio::test]
async fn ranking_follows_query_relevance() {
    let pipeline = RagPipeline::new(Arc::new(KeywordEmbedder), PipelineConfig::default())
        .with_top_k(1);

    let outcome = pipeline
        .build_context(
            "Who signed the contract?",
            vec![
                text_document("weather.txt", "It rained all week in the valley."),
                text_document("contracts.txt", "The contract was signed in May."),
            ],
        )
        .await;

    assert!(outcome.status.success);
    assert_eq!(outcome.chunk_count, 1);
    assert!(outcome.context.contains("contracts.txt"));
    assert!(!outcome.context.contains("weather.txt"));
}

#[tokio::test]
async fn documents_keep_input_order() {
    let pipeline = RagPipeline::new(Arc::new(KeywordEmbedder), PipelineConfig::default());

    let outcome = pipeline
        .build_context(
            "anything",
            vec![
                text_document("one.txt", "First file."),
                text_document("two.txt", "Second file."),
                text_document("three.txt", "Third file."),
            ],
        )
        .await;

    let one = outcome.context.find("one.txt").expect("one.txt in context");
    let two = outcome.context.find("two.txt").expect("two.txt in context");
    let three = outcome.context.find("three.txt").expect("three.txt in context");
    assert!(one < two && two < three);

    let subjects: Vec<_> = outcome
        .status
        .phases_named(Phase::ContentParsing)
        .map(|record| record.subject.clone().unwrap_or_default())
        .collect();
    assert_eq!(subjects, vec!["one.txt", "two.txt", "three.txt"]);
}

#[tokio::test]
async fn cancellation_aborts_embedding() {
    let pipeline = RagPipeline::new(Arc::new(PendingEmbedder), PipelineConfig::default());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        pipeline.build_context_with_cancel(
            "query",
            vec![text_document("a.txt", "Some text.")],
            cancel,
        ),
    )
    .await
    .expect("cancelled run finishes");

    assert!(!outcome.status.success);
    assert_eq!(outcome.context, "");
    assert_eq!(outcome.status.errors.len(), 1);
    assert_eq!(outcome.status.errors[0].kind, ErrorKind::Cancelled);
}

#[tokio::test]
async fn panicking_worker_only_skips_its_document() {
    let pipeline = RagPipeline::with_dependencies(
        Arc::new(KeywordEmbedder),
        Arc::new(PanickingExtractor),
        Arc::new(SentenceChunker),
        ContextBuilder::default(),
        PipelineConfig::default(),
    );

    let outcome = pipeline
        .build_context(
            "query",
            vec![
                text_document("boom.txt", "never read"),
                text_document("fine.txt", "Readable notes."),
            ],
        )
        .await;

    assert!(outcome.status.success);
    assert!(outcome.context.contains("fine.txt"));
    assert_eq!(outcome.status.warnings.len(), 1);
    assert!(
        outcome.status.warnings[0]
            .message
            .starts_with("Skipping document 'boom.txt'")
    );
}

#[tokio::test]
async fn outcome_serializes_for_debug_payload() -> anyhow::Result<()> {
    let pipeline = RagPipeline::new(Arc::new(KeywordEmbedder), PipelineConfig::default());
    let outcome = pipeline
        .build_context("query", vec![text_document("a.txt", "Short note.")])
        .await;

    let value = serde_json::to_value(&outcome)?;
    assert_eq!(value["chunk_count"], 1);
    assert_eq!(value["status"]["success"], true);
    assert_eq!(value["status"]["phases"][0]["phase"], "document_retrieval");
    assert!(value["status"]["run_id"].is_string());
    Ok(())
}
