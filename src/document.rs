//! Data types for documents, chunks, retrieval results, and chat history.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A source document containing text content and metadata.
///
/// Documents are immutable inputs: they are consumed at ingestion time and
/// only their derived [`Chunk`]s persist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Create a document with a freshly minted id.
    pub fn new(text: impl Into<String>, metadata: HashMap<String, String>) -> Self {
        Self { id: uuid::Uuid::new_v4().to_string(), text: text.into(), metadata }
    }
}

/// A segment of a [`Document`] with its vector embedding.
///
/// Chunks are the unit of retrieval. Every chunk held by an index has an
/// embedding of that index's fixed dimensionality.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk within its index.
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// The vector embedding for this chunk's text.
    pub embedding: Vec<f32>,
    /// Metadata inherited from the parent document plus chunk-position fields.
    pub metadata: HashMap<String, String>,
    /// The ID of the parent [`Document`].
    pub document_id: String,
}

/// A retrieved [`Chunk`] paired with a relevance score and the query it
/// was retrieved for.
///
/// Scores are cosine similarity clamped to `[0, 1]`; higher is more
/// relevant. Results are transient and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The relevance score in `[0, 1]` (higher is more relevant).
    pub score: f32,
    /// The query this result was retrieved for.
    pub query: String,
}

/// The speaker of a [`ChatMessage`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A system instruction.
    System,
    /// The end user.
    User,
    /// The model.
    Assistant,
}

/// One turn of caller-supplied chat history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Who produced this message.
    pub role: Role,
    /// The message text.
    pub content: String,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}
