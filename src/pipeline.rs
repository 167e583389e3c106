//! The query pipeline: retrieval, the relevance gate, and generation.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::document::{ChatMessage, Chunk};
use crate::error::Result;
use crate::generate::Generator;
use crate::retriever::Retriever;

/// The outcome of one [`RagPipeline::answer`] call.
///
/// `used_context` distinguishes an answer grounded in retrieved sources
/// from a plain conversational answer; a failed call is an error, never an
/// `Answer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    /// The generated answer text.
    pub text: String,
    /// Whether retrieved context was used to ground the answer.
    pub used_context: bool,
    /// The chunks passed to the generator, empty when `used_context` is
    /// false.
    pub sources: Vec<Chunk>,
}

/// Orchestrates retrieval and generation for one tenant.
///
/// The pipeline's central policy decision is the relevance gate: retrieved
/// context is used only when the **top** retrieval score reaches
/// `rag_threshold`. Low-confidence retrieval falls back to an ungrounded
/// answer instead of poisoning an otherwise-answerable question. The gate
/// is re-evaluated on every call; nothing about the decision is cached.
///
/// The pipeline is stateless across calls apart from the index its
/// retriever wraps; chat history is caller-supplied and never persisted.
pub struct RagPipeline {
    retriever: Retriever,
    generator: Generator,
    top_k: usize,
    rag_threshold: f32,
}

impl RagPipeline {
    /// Create a pipeline.
    pub fn new(retriever: Retriever, generator: Generator, top_k: usize, rag_threshold: f32) -> Self {
        Self { retriever, generator, top_k, rag_threshold }
    }

    /// Answer `query`, grounding in retrieved context when it passes the
    /// relevance gate.
    pub async fn answer(&self, query: &str, history: &[ChatMessage]) -> Result<Answer> {
        let retrieved = self.retriever.retrieve(query, self.top_k).await?;

        let top_score = retrieved.first().map(|r| r.score);
        let grounded = top_score.is_some_and(|s| s >= self.rag_threshold);

        if !grounded {
            debug!(query, ?top_score, threshold = self.rag_threshold, "relevance gate: ungrounded");
            let text = self.generator.generate(query, &[], history).await?;
            return Ok(Answer { text, used_context: false, sources: Vec::new() });
        }

        info!(
            query,
            top_score = top_score.unwrap_or_default(),
            source_count = retrieved.len(),
            "relevance gate: grounded"
        );
        let text = self.generator.generate(query, &retrieved, history).await?;
        let sources = retrieved.into_iter().map(|r| r.chunk).collect();
        Ok(Answer { text, used_context: true, sources })
    }
}
