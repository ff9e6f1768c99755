use serde_json::json;

use super::{
    status::{Phase, PipelineStatus},
    utils::normalize_whitespace,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Window length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive windows.
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 50,
        }
    }
}

pub trait Chunker: Send + Sync {
    fn chunk(&self, content: &str, config: &ChunkConfig, status: &mut PipelineStatus)
    -> Vec<String>;
}

/// Fixed-size character windows that prefer to end on a sentence.
#[derive(Debug, Default, Clone)]
pub struct SentenceChunker;

impl Chunker for SentenceChunker {
    fn chunk(
        &self,
        content: &str,
        config: &ChunkConfig,
        status: &mut PipelineStatus,
    ) -> Vec<String> {
        let handle = status.start(
            Phase::TextChunking,
            None,
            format!(
                "Chunking text ({} chars, chunk_size={}, overlap={})",
                content.chars().count(),
                config.chunk_size,
                config.overlap
            ),
        );

        let (chunk_size, overlap) = effective_window(config, status);
        let normalized = normalize_whitespace(content);
        if normalized.is_empty() {
            status.warn(Phase::TextChunking, "Input text is empty");
        }

        let chunks = split_with_overlap(&normalized, chunk_size, overlap);
        let total_chars: usize = chunks.iter().map(|chunk| chunk.chars().count()).sum();
        let avg_chunk_size = total_chars.checked_div(chunks.len()).unwrap_or(0);

        status.succeed(
            handle,
            format!("Created {} chunks", chunks.len()),
            json!({
                "num_chunks": chunks.len(),
                "avg_chunk_size": avg_chunk_size,
                "total_text_length": normalized.chars().count(),
            }),
        );
        chunks
    }
}

fn effective_window(config: &ChunkConfig, status: &mut PipelineStatus) -> (usize, usize) {
    let chunk_size = if config.chunk_size == 0 {
        status.warn(Phase::TextChunking, "chunk_size of 0 is invalid, using 1");
        1
    } else {
        config.chunk_size
    };

    let overlap = if config.overlap >= chunk_size {
        let clamped = chunk_size - 1;
        status.warn(
            Phase::TextChunking,
            format!(
                "overlap {} must be smaller than chunk_size {chunk_size}, using {clamped}",
                config.overlap
            ),
        );
        clamped
    } else {
        config.overlap
    };

    (chunk_size, overlap)
}

/// Splits already-normalized text into windows of at most `chunk_size`
/// characters. Each window after the first starts `overlap` characters
/// before the previous one ended, so dropping the first `overlap`
/// characters of every later chunk reconstructs `text` exactly.
///
/// Requires `overlap < chunk_size`.
pub fn split_with_overlap(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    if len == 0 {
        return Vec::new();
    }
    if len <= chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let window_end = (start + chunk_size).min(len);
        let end = if window_end < len {
            // the cut must stay past the overlap so the next window advances
            sentence_end(&chars, start + overlap + 1, window_end).unwrap_or(window_end)
        } else {
            window_end
        };

        chunks.push(chars[start..end].iter().collect());
        if end >= len {
            break;
        }
        start = end - overlap;
    }
    chunks
}

/// Largest end offset in `min_end..=max_end` that closes a sentence: the
/// character before it is terminal punctuation and the next one is
/// whitespace or the end of the text.
fn sentence_end(chars: &[char], min_end: usize, max_end: usize) -> Option<usize> {
    (min_end..=max_end).rev().find(|&end| {
        matches!(chars[end - 1], '.' | '!' | '?')
            && chars.get(end).is_none_or(|next| next.is_whitespace())
    })
}
