//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and three implementations:
//!
//! - [`WordChunker`]: fixed word windows with configurable overlap, for prose
//! - [`PageChunker`]: splits on page markers first, then bounds each page by words
//! - [`SentenceChunker`]: merges consecutive sentences up to a word budget
//!
//! All strategies are deterministic: the same text and parameters always
//! produce the same sequence of chunks.

use serde_json::Value;

use crate::document::{Chunk, DocumentKind, Metadata, SourceDocument};

/// Marker that upstream PDF extraction places at the start of every page.
pub const PAGE_MARKER: &str = "--- Page";

/// Split `text` into word windows of `chunk_size_words` with the default
/// overlap of 10% of the window.
///
/// Blank text yields an empty `Vec`.
pub fn chunk(text: &str, chunk_size_words: usize) -> Vec<String> {
    WordChunker::with_default_overlap(chunk_size_words).split(text)
}

/// A strategy for splitting extracted text into chunks.
///
/// Implementations produce plain text segments; ids and embeddings are
/// assigned downstream by the index.
pub trait Chunker: Send + Sync {
    /// Split text into non-empty, trimmed segments.
    ///
    /// Returns an empty `Vec` if the text is empty or whitespace-only.
    fn split(&self, text: &str) -> Vec<String>;

    /// Split a source document and attach per-chunk metadata.
    ///
    /// Each chunk carries the extractor metadata plus `document_id`,
    /// `filename`, `chunk_index` and `source`; the latter four always win
    /// over extractor keys of the same name.
    fn chunk(&self, document: &SourceDocument) -> Vec<Chunk> {
        self.split(&document.text)
            .into_iter()
            .enumerate()
            .map(|(i, text)| Chunk { text, source_metadata: chunk_metadata(document, i) })
            .collect()
    }
}

/// Build the metadata for chunk `chunk_index` of `document`.
pub fn chunk_metadata(document: &SourceDocument, chunk_index: usize) -> Metadata {
    let mut metadata = document.metadata.clone();
    metadata.insert("document_id".to_string(), Value::from(document.document_id.clone()));
    metadata.insert("filename".to_string(), Value::from(document.filename.clone()));
    metadata.insert("chunk_index".to_string(), Value::from(chunk_index));
    metadata.insert("source".to_string(), Value::from(document.source.clone()));
    metadata
}

/// Return the chunker suited to a document kind.
pub fn chunker_for(kind: DocumentKind, chunk_size: usize, chunk_overlap: usize) -> Box<dyn Chunker> {
    match kind {
        DocumentKind::Text | DocumentKind::Docx => {
            Box::new(WordChunker::new(chunk_size, chunk_overlap))
        }
        DocumentKind::Pdf => Box::new(PageChunker::new(chunk_size, chunk_overlap)),
        DocumentKind::Image => Box::new(SentenceChunker::new(chunk_size)),
    }
}

/// Splits text into windows of `chunk_size` words, consecutive windows
/// sharing `chunk_overlap` words.
///
/// # Example
///
/// ```rust,ignore
/// use docmind_rag::WordChunker;
///
/// let chunker = WordChunker::new(200, 20);
/// let chunks = chunker.split(&text);
/// ```
#[derive(Debug, Clone)]
pub struct WordChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl WordChunker {
    /// Create a new `WordChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of words per chunk
    /// * `chunk_overlap`: number of words shared by consecutive chunks
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { chunk_size, chunk_overlap }
    }

    /// Create a `WordChunker` whose overlap is 10% of `chunk_size`.
    pub fn with_default_overlap(chunk_size: usize) -> Self {
        Self::new(chunk_size, chunk_size / 10)
    }
}

impl Chunker for WordChunker {
    fn split(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        window_words(&words, self.chunk_size, self.chunk_overlap)
    }
}

/// Join word windows of `chunk_size` advancing by `chunk_size - chunk_overlap`.
///
/// The last window always ends at the last word, so no trailing chunk is made
/// up solely of overlap.
fn window_words(words: &[&str], chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if words.is_empty() {
        return Vec::new();
    }

    let chunk_size = chunk_size.max(1);
    let step = chunk_size.saturating_sub(chunk_overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }

    chunks
}

/// Splits page-delimited text page by page, then bounds each page by words.
///
/// Lines starting with [`PAGE_MARKER`] open a new page and are not part of
/// any chunk. Blank pages produce nothing. Chunks never span two pages.
#[derive(Debug, Clone)]
pub struct PageChunker {
    words: WordChunker,
}

impl PageChunker {
    /// Create a new `PageChunker` bounding each page to `chunk_size` words.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { words: WordChunker::new(chunk_size, chunk_overlap) }
    }
}

/// Split text into pages at lines starting with [`PAGE_MARKER`].
fn split_pages(text: &str) -> Vec<String> {
    let mut pages = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if line.trim_start().starts_with(PAGE_MARKER) {
            pages.push(std::mem::take(&mut current));
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    pages.push(current);

    pages.retain(|page| !page.trim().is_empty());
    pages
}

impl Chunker for PageChunker {
    fn split(&self, text: &str) -> Vec<String> {
        split_pages(text).iter().flat_map(|page| self.words.split(page)).collect()
    }
}

/// Splits text into sentences and merges consecutive sentences until the
/// next one would push the chunk past `chunk_size` words.
///
/// A single sentence longer than `chunk_size` is split into word windows on
/// its own rather than producing an oversized chunk.
#[derive(Debug, Clone)]
pub struct SentenceChunker {
    chunk_size: usize,
}

impl SentenceChunker {
    /// Create a new `SentenceChunker` with a budget of `chunk_size` words.
    pub fn new(chunk_size: usize) -> Self {
        Self { chunk_size: chunk_size.max(1) }
    }
}

/// Split text after `.`, `!` or `?` when followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?')
            && chars.peek().is_some_and(|(_, next)| next.is_whitespace())
        {
            let end = i + c.len_utf8();
            sentences.push(text[start..end].trim());
            start = end;
        }
    }
    sentences.push(text[start..].trim());

    sentences.retain(|s| !s.is_empty());
    sentences
}

impl Chunker for SentenceChunker {
    fn split(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for sentence in split_sentences(text) {
            let words: Vec<&str> = sentence.split_whitespace().collect();

            if words.len() > self.chunk_size {
                if !current.is_empty() {
                    chunks.push(current.join(" "));
                    current.clear();
                }
                chunks.extend(window_words(&words, self.chunk_size, 0));
                continue;
            }

            if current.len() + words.len() > self.chunk_size && !current.is_empty() {
                chunks.push(current.join(" "));
                current.clear();
            }
            current.extend(words);
        }

        if !current.is_empty() {
            chunks.push(current.join(" "));
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn blank_text_yields_no_chunks() {
        assert!(chunk("", 10).is_empty());
        assert!(chunk("   \n\t ", 10).is_empty());
        assert!(PageChunker::new(10, 1).split("--- Page 1 ---\n   \n").is_empty());
        assert!(SentenceChunker::new(10).split("  ").is_empty());
    }

    #[test]
    fn word_windows_overlap_and_end_at_last_word() {
        let chunks = WordChunker::new(4, 1).split(&numbered_words(10));
        assert_eq!(chunks, vec!["w0 w1 w2 w3", "w3 w4 w5 w6", "w6 w7 w8 w9"]);
    }

    #[test]
    fn default_overlap_is_ten_percent() {
        let chunks = chunk(&numbered_words(25), 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].ends_with("w9"));
        assert!(chunks[1].starts_with("w9 "));
        assert!(chunks[2].ends_with("w24"));
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        assert_eq!(chunk("The sky is blue.", 100), vec!["The sky is blue."]);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "alpha beta gamma. delta epsilon! zeta eta theta? iota kappa";
        for chunker in [
            chunker_for(DocumentKind::Text, 3, 1),
            chunker_for(DocumentKind::Pdf, 3, 1),
            chunker_for(DocumentKind::Image, 3, 1),
        ] {
            assert_eq!(chunker.split(text), chunker.split(text));
        }
    }

    #[test]
    fn pages_are_never_merged() {
        let text = "--- Page 1 ---\none two\n--- Page 2 ---\n\n--- Page 3 ---\nthree four five";
        let chunks = PageChunker::new(10, 0).split(text);
        assert_eq!(chunks, vec!["one two", "three four five"]);
    }

    #[test]
    fn long_pages_are_word_bounded() {
        let text = format!("--- Page 1 ---\n{}", numbered_words(5));
        let chunks = PageChunker::new(2, 0).split(&text);
        assert_eq!(chunks, vec!["w0 w1", "w2 w3", "w4"]);
    }

    #[test]
    fn sentences_merge_up_to_budget() {
        let text = "One two three. Four five. Six seven eight nine! Ten?";
        let chunks = SentenceChunker::new(5).split(text);
        assert_eq!(
            chunks,
            vec!["One two three. Four five.", "Six seven eight nine! Ten?"]
        );
    }

    #[test]
    fn oversized_sentence_is_split_by_words() {
        let text = format!("Short one. {} end.", numbered_words(7));
        let chunks = SentenceChunker::new(3).split(&text);
        assert_eq!(chunks[0], "Short one.");
        assert!(chunks.iter().all(|c| c.split_whitespace().count() <= 3));
        assert_eq!(chunks.last().map(String::as_str), Some("w6 end."));
    }

    #[test]
    fn document_chunks_carry_core_metadata() {
        let mut extractor = Metadata::new();
        extractor.insert("word_count".into(), Value::from(3));
        extractor.insert("filename".into(), Value::from("overridden"));
        let document = SourceDocument {
            document_id: "42".into(),
            filename: "notes.txt".into(),
            source: "/uploads/notes.txt".into(),
            kind: DocumentKind::Text,
            text: "a b c".into(),
            metadata: extractor,
        };

        let chunks = WordChunker::new(2, 0).chunk(&document);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].source_metadata["chunk_index"], Value::from(1));
        assert_eq!(chunks[1].source_metadata["filename"], Value::from("notes.txt"));
        assert_eq!(chunks[1].source_metadata["document_id"], Value::from("42"));
        assert_eq!(chunks[1].source_metadata["source"], Value::from("/uploads/notes.txt"));
        assert_eq!(chunks[0].source_metadata["word_count"], Value::from(3));
    }

    #[test]
    fn extensions_map_to_kinds() {
        assert_eq!(DocumentKind::from_extension("PDF"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_extension("jpeg"), Some(DocumentKind::Image));
        assert_eq!(DocumentKind::from_extension("txt"), Some(DocumentKind::Text));
        assert_eq!(DocumentKind::from_extension("exe"), None);
    }
}
