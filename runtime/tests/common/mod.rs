#![allow(dead_code)]

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::post,
};
use case_rag::pipeline::Document;
use serde_json::{Value, json};
use tokio::{net::TcpListener, task::JoinHandle};

/// How the fake `/v1/embeddings` endpoint answers.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// One `[1, 0, 0, ...]` vector of the given dimension per input.
    UnitVectors(usize),
    Status(StatusCode, String),
    /// Sleeps before answering with 3-dimensional unit vectors.
    Delay(Duration),
    Fixed(Value),
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct MockState {
    behavior: Behavior,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

pub struct MockEmbeddingServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl MockEmbeddingServer {
    pub async fn start(behavior: Behavior) -> anyhow::Result<Self> {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            behavior,
            requests: requests.clone(),
        };
        let app = Router::new()
            .route("/v1/embeddings", post(embeddings))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            base_url: format!("http://{addr}"),
            requests,
            handle,
        })
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for MockEmbeddingServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn embeddings(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let inputs = body["input"].as_array().map_or(0, Vec::len);
    state.requests.lock().unwrap().push(RecordedRequest {
        authorization: headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        body,
    });

    match state.behavior {
        Behavior::UnitVectors(dimension) => Json(unit_vectors(inputs, dimension)).into_response(),
        Behavior::Status(status, body) => (status, body).into_response(),
        Behavior::Delay(delay) => {
            tokio::time::sleep(delay).await;
            Json(unit_vectors(inputs, 3)).into_response()
        }
        Behavior::Fixed(value) => Json(value).into_response(),
    }
}

fn unit_vectors(count: usize, dimension: usize) -> Value {
    let mut vector = vec![0.0f32; dimension.max(1)];
    vector[0] = 1.0;
    let data: Vec<Value> = (0..count)
        .map(|index| json!({ "object": "embedding", "index": index, "embedding": vector }))
        .collect();
    json!({ "object": "list", "data": data, "model": "mock-embedding" })
}

pub fn text_document(filename: &str, text: &str) -> Document {
    Document::new(
        format!("doc-{filename}"),
        filename,
        text.as_bytes().to_vec(),
    )
}

/// Address nothing is listening on.
pub async fn closed_port_url() -> anyhow::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(format!("http://{addr}"))
}

/// Single-page PDF with one line of text, built with lopdf.
pub fn hello_world_pdf() -> anyhow::Result<Vec<u8>> {
    use lopdf::{
        Document as PdfDocument, Object, Stream,
        content::{Content, Operation},
        dictionary,
    };

    let mut doc = PdfDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 48.into()]),
            Operation::new("Td", vec![100.into(), 600.into()]),
            Operation::new("Tj", vec![Object::string_literal("Hello World!")]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
}
