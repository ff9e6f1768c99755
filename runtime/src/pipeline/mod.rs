pub mod chunker;
pub mod context;
pub mod embedding;
pub mod error_reporter;
pub mod extractor;
pub mod pipeline;
pub mod retriever;
pub mod rtf;
pub mod status;
pub mod types;

pub mod utils;

pub use chunker::{ChunkConfig, Chunker, SentenceChunker, split_with_overlap};
pub use context::ContextBuilder;
pub use embedding::generate_embeddings;
pub use error_reporter::{Classify, report_failure};
pub use extractor::{
    DocumentExtractor, DocumentFormat, ExtractError, ExtractedText, FormatExtractor, FormatFamily,
};
pub use pipeline::{PipelineConfig, RagOutcome, RagPipeline};
pub use retriever::{DEFAULT_TOP_K, RetrievalError, cosine_similarity, rank, retrieve};
pub use status::{
    ErrorKind, ErrorRecord, Phase, PhaseHandle, PhaseRecord, PhaseState, PipelineStatus,
    StatusReport, WarningRecord,
};
pub use types::{Chunk, Document, EmbeddedChunk, RetrievalResult, pair_embeddings};
