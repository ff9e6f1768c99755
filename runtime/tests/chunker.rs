use case_rag::pipeline::{
    ChunkConfig, Chunker, PhaseState, PipelineStatus, SentenceChunker, split_with_overlap,
    utils::normalize_whitespace,
};

const BRIEF: &str = "The plaintiff filed the complaint on March 3.  The defendant answered\n\
    within thirty days!   Discovery closed in October, and both parties moved\tfor summary \
    judgment. Was the motion timely? The court held a hearing in December and \
    reserved ruling pending supplemental briefing from both sides";

fn rebuild(chunks: &[String], overlap: usize) -> String {
    let mut rebuilt = chunks[0].clone();
    for chunk in &chunks[1..] {
        rebuilt.extend(chunk.chars().skip(overlap));
    }
    rebuilt
}

#[test]
fn chunks_round_trip_after_removing_overlap() {
    let config = ChunkConfig {
        chunk_size: 60,
        overlap: 12,
    };
    let mut status = PipelineStatus::new();
    let chunks = SentenceChunker.chunk(BRIEF, &config, &mut status);

    assert!(chunks.len() > 1);
    assert_eq!(rebuild(&chunks, config.overlap), normalize_whitespace(BRIEF));
    for chunk in &chunks {
        assert!(chunk.chars().count() <= config.chunk_size);
    }
}

#[test]
fn hard_cuts_share_overlap_window() {
    let text: String = ('a'..='z').cycle().take(130).collect();
    let chunks = split_with_overlap(&text, 25, 7);

    assert!(chunks.len() > 2);
    for pair in chunks.windows(2) {
        let previous: Vec<char> = pair[0].chars().collect();
        let suffix: String = previous[previous.len() - 7..].iter().collect();
        let prefix: String = pair[1].chars().take(7).collect();
        assert_eq!(suffix, prefix);
    }
    assert_eq!(rebuild(&chunks, 7), text);
}

#[test]
fn windows_prefer_sentence_endings() {
    let chunks = split_with_overlap("Alpha beta gamma. Delta epsilon zeta.", 20, 5);
    assert_eq!(
        chunks,
        vec!["Alpha beta gamma.", "amma. Delta epsilon ", "silon zeta."]
    );
}

#[test]
fn short_text_is_one_chunk() {
    let mut status = PipelineStatus::new();
    let chunks = SentenceChunker.chunk(
        "  A short   note. ",
        &ChunkConfig::default(),
        &mut status,
    );
    assert_eq!(chunks, vec!["A short note."]);
}

#[test]
fn empty_text_warns_and_yields_no_chunks() {
    let mut status = PipelineStatus::new();
    let chunks = SentenceChunker.chunk(" \n\t ", &ChunkConfig::default(), &mut status);

    assert!(chunks.is_empty());
    assert_eq!(status.warnings().len(), 1);
    assert_eq!(status.warnings()[0].message, "Input text is empty");
    assert_eq!(status.phases()[0].status, PhaseState::Success);
    assert!(status.is_success());
}

#[test]
fn oversized_overlap_is_clamped() {
    let config = ChunkConfig {
        chunk_size: 10,
        overlap: 10,
    };
    let mut status = PipelineStatus::new();
    let chunks = SentenceChunker.chunk("abcdefghijklmnopqrstuvwxyz", &config, &mut status);

    assert_eq!(status.warnings().len(), 1);
    assert_eq!(rebuild(&chunks, 9), "abcdefghijklmnopqrstuvwxyz");
}

#[test]
fn chunking_records_metrics() {
    let config = ChunkConfig {
        chunk_size: 60,
        overlap: 12,
    };
    let mut status = PipelineStatus::new();
    let chunks = SentenceChunker.chunk(BRIEF, &config, &mut status);

    let metrics = &status.phases()[0].metrics;
    assert_eq!(metrics["num_chunks"], chunks.len());
    assert!(metrics["avg_chunk_size"].as_u64().unwrap() > 0);
    assert_eq!(
        metrics["total_text_length"],
        normalize_whitespace(BRIEF).chars().count()
    );
}
