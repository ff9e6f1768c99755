use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Multipart, State},
    http::StatusCode,
    routing::post,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::pipeline::{Document, utils::sanitize_filename};

use super::{AppState, types::RagContextResponse};

pub fn rag_routes() -> Router<Arc<AppState>> {
    Router::new().route("/rag/context", post(build_context))
}

struct ContextRequest {
    query: String,
    top_k: Option<usize>,
    documents: Vec<Document>,
}

async fn build_context(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<RagContextResponse>, (StatusCode, String)> {
    let request = read_request(multipart).await?;

    let Some(pipeline) = state.pipeline.clone() else {
        warn!("embedding settings incomplete, skipping RAG");
        return Ok(Json(RagContextResponse::skipped()));
    };
    let pipeline = match request.top_k {
        Some(top_k) => pipeline.with_top_k(top_k),
        None => pipeline,
    };

    let cancel = CancellationToken::new();
    // fires when the handler returns or is dropped, ending the deadline task
    let _guard = cancel.clone().drop_guard();
    let deadline = cancel.clone();
    let timeout = state.config.rag.request_timeout();
    tokio::spawn(async move {
        tokio::select! {
            _ = deadline.cancelled() => {}
            _ = tokio::time::sleep(timeout) => {
                warn!(timeout_secs = timeout.as_secs(), "rag request deadline reached");
                deadline.cancel();
            }
        }
    });

    let outcome = pipeline
        .build_context_with_cancel(&request.query, request.documents, cancel)
        .await;
    info!(
        run_id = %outcome.status.run_id,
        success = outcome.status.success,
        chunk_count = outcome.chunk_count,
        "rag context request served"
    );

    Ok(Json(RagContextResponse {
        rag_enabled: true,
        context: outcome.context,
        chunk_count: outcome.chunk_count,
        status: Some(outcome.status),
    }))
}

async fn read_request(mut multipart: Multipart) -> Result<ContextRequest, (StatusCode, String)> {
    let mut query: Option<String> = None;
    let mut top_k: Option<usize> = None;
    let mut documents = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        (
            StatusCode::BAD_REQUEST,
            format!("invalid multipart payload: {err}"),
        )
    })? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("query") => {
                let text = field.text().await.map_err(bad_field)?;
                query = Some(text);
            }
            Some("top_k") => {
                let text = field.text().await.map_err(bad_field)?;
                let value = text
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|value| *value > 0)
                    .ok_or_else(|| {
                        (
                            StatusCode::BAD_REQUEST,
                            format!("top_k must be a positive integer, got '{text}'"),
                        )
                    })?;
                top_k = Some(value);
            }
            Some("file") => {
                let original = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| {
                        (
                            StatusCode::BAD_REQUEST,
                            "uploaded file missing filename".to_string(),
                        )
                    })?;
                let filename = sanitize_filename(&original).map_err(|err| {
                    (
                        StatusCode::BAD_REQUEST,
                        format!("invalid filename '{original}': {err}"),
                    )
                })?;
                let data = field.bytes().await.map_err(bad_field)?;
                debug!(filename = %filename, bytes = data.len(), "received document");
                documents.push(Document::new(
                    Uuid::new_v4().to_string(),
                    filename,
                    data.to_vec(),
                ));
            }
            other => debug!(field = ?other, "ignoring multipart field"),
        }
    }

    let query = query
        .map(|query| query.trim().to_string())
        .filter(|query| !query.is_empty())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                "missing query field in multipart payload".to_string(),
            )
        })?;

    Ok(ContextRequest {
        query,
        top_k,
        documents,
    })
}

fn bad_field(err: axum::extract::multipart::MultipartError) -> (StatusCode, String) {
    (
        StatusCode::BAD_REQUEST,
        format!("failed to read multipart field: {err}"),
    )
}
