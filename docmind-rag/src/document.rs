//! Data types for source documents, chunks, indexed documents and retrieval results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered key-value metadata attached to chunks and indexed documents.
pub type Metadata = Map<String, Value>;

/// The kind of file a [`SourceDocument`] was extracted from.
///
/// The kind selects the chunking strategy: already page-delimited PDF text is
/// split by page first, OCR'd images by sentence, everything else by words.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Plain text or markdown.
    Text,
    /// Text extracted from a PDF, pages separated by `--- Page` markers.
    Pdf,
    /// Text extracted from a word-processor document.
    Docx,
    /// Text recognised from an image.
    Image,
}

impl DocumentKind {
    /// Map a file extension (without the dot, any case) to a document kind.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "txt" | "md" => Some(Self::Text),
            "pdf" => Some(Self::Pdf),
            "docx" | "doc" => Some(Self::Docx),
            "jpg" | "jpeg" | "png" => Some(Self::Image),
            _ => None,
        }
    }
}

/// Extracted text of one uploaded file, as supplied by upstream extraction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceDocument {
    /// Identifier assigned by the administrative layer.
    pub document_id: String,
    /// Original file name.
    pub filename: String,
    /// Location of the original file.
    pub source: String,
    /// What kind of file the text came from.
    pub kind: DocumentKind,
    /// The extracted text.
    pub text: String,
    /// Extractor-provided metadata (page count, word count, ...).
    #[serde(default)]
    pub metadata: Metadata,
}

/// A segment of extracted text, ready to be embedded.
///
/// Chunks carry no id and no embedding; both are assigned when the chunk is
/// inserted into a [`VectorIndex`](crate::VectorIndex).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// The text content of the chunk.
    pub text: String,
    /// Metadata describing where the chunk came from.
    pub source_metadata: Metadata,
}

/// A document stored in a collection of the vector index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedDocument {
    /// Index-generated identifier, unique within the collection.
    pub id: String,
    /// The stored text.
    pub text: String,
    /// Caller-supplied metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// The embedding as supplied at insertion, retained for rebuilds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// The collection this document belongs to.
    pub collection: String,
}

/// A retrieved document paired with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    /// The id of the matching [`IndexedDocument`].
    pub document_id: String,
    /// The matching text.
    pub text: String,
    /// The matching document's metadata.
    pub metadata: Metadata,
    /// Cosine similarity to the query (higher is more relevant).
    pub score: f32,
}
