pub mod embeddings;

pub use embeddings::{Embedder, EmbeddingError, HttpEmbedder, InputType, embeddings_url};
