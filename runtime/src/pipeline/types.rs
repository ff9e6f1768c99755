use serde::Serialize;

/// A caller-owned document. The pipeline reads it and never mutates it.
#[derive(Debug, Clone)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub content: Vec<u8>,
}

impl Document {
    pub fn new(id: impl Into<String>, filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            content,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub source_filename: String,
    pub text: String,
    pub sequence_index: usize,
}

/// A chunk bound to the vector the embedding API returned for it.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    pub score: f32,
}

/// Binds each chunk to its vector. Callers validate that both sides have
/// the same length before pairing.
pub fn pair_embeddings(chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) -> Vec<EmbeddedChunk> {
    debug_assert_eq!(chunks.len(), embeddings.len());
    chunks
        .into_iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| EmbeddedChunk { chunk, embedding })
        .collect()
}
