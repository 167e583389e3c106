//! Answer generation: prompt composition and language-model delegation.

use std::sync::Arc;

use tracing::debug;

use crate::document::{ChatMessage, RetrievalResult};
use crate::error::Result;
use crate::llm::LanguageModel;

/// Composes grounded or ungrounded prompts and delegates to a
/// [`LanguageModel`].
///
/// With retrieved context, the prompt embeds the chunk texts as numbered
/// source blocks in the order received and instructs the model to answer
/// only from them, falling back to an insufficient-information framing
/// when the context does not address the query. Without context, the raw
/// query is sent as a conversational prompt. Provider failures propagate
/// as [`RagError::Generation`](crate::error::RagError::Generation); they
/// are never converted into an empty answer.
pub struct Generator {
    lm: Arc<dyn LanguageModel>,
    system_prompt: Option<String>,
    max_context_chars: usize,
}

impl Generator {
    /// Create a generator.
    ///
    /// `system_prompt`, when set, is prepended to the chat history as a
    /// system message on every call. `max_context_chars` bounds the total
    /// context text embedded in a grounded prompt.
    pub fn new(
        lm: Arc<dyn LanguageModel>,
        system_prompt: Option<String>,
        max_context_chars: usize,
    ) -> Self {
        Self { lm, system_prompt, max_context_chars }
    }

    /// Generate an answer for `query`, grounded in `context` when
    /// non-empty.
    pub async fn generate(
        &self,
        query: &str,
        context: &[RetrievalResult],
        history: &[ChatMessage],
    ) -> Result<String> {
        let prompt = if context.is_empty() {
            query.to_string()
        } else {
            self.grounded_prompt(query, context)
        };

        let history = match &self.system_prompt {
            Some(system) => {
                let mut full = Vec::with_capacity(history.len() + 1);
                full.push(ChatMessage::system(system.clone()));
                full.extend_from_slice(history);
                full
            }
            None => history.to_vec(),
        };

        debug!(
            model = self.lm.name(),
            grounded = !context.is_empty(),
            prompt_chars = prompt.chars().count(),
            "generating answer"
        );
        self.lm.generate(&prompt, &history).await
    }

    /// Build the grounded prompt, keeping sources in the order received
    /// and dropping the lowest-scored ones first if the combined text
    /// would exceed the context budget.
    fn grounded_prompt(&self, query: &str, context: &[RetrievalResult]) -> String {
        let kept = fit_to_budget(context, self.max_context_chars);

        let mut blocks = String::new();
        for (i, result) in kept.iter().enumerate() {
            blocks.push_str(&format!("[Source {}]\n{}\n\n", i + 1, result.chunk.text));
        }

        format!(
            "Answer the user's question using only the context below.\n\n\
             Context:\n{blocks}\
             Question: {query}\n\n\
             Instructions:\n\
             - Use only information from the context above.\n\
             - If the context does not contain the information needed, \
             say that the provided documents are insufficient to answer.\n\
             - Be concise and accurate.\n\n\
             Answer:"
        )
    }
}

/// Select the results whose combined text fits `budget` characters,
/// dropping the lowest-scored results first while preserving the original
/// order of those kept. The highest-scored result is always kept, with
/// its text hard-truncated if it alone exceeds the budget.
fn fit_to_budget(context: &[RetrievalResult], budget: usize) -> Vec<RetrievalResult> {
    let total: usize = context.iter().map(|r| r.chunk.text.chars().count()).sum();
    if total <= budget {
        return context.to_vec();
    }

    // Indices ordered worst-score first; stable so equal scores drop the
    // later-received result first.
    let mut by_score: Vec<usize> = (0..context.len()).collect();
    by_score.sort_by(|a, b| {
        context[*a]
            .score
            .partial_cmp(&context[*b].score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.cmp(a))
    });

    let mut dropped = vec![false; context.len()];
    let mut remaining = total;
    for idx in by_score {
        if remaining <= budget || dropped.iter().filter(|d| !**d).count() == 1 {
            break;
        }
        dropped[idx] = true;
        remaining -= context[idx].chunk.text.chars().count();
    }

    let mut kept: Vec<RetrievalResult> = context
        .iter()
        .zip(&dropped)
        .filter(|(_, d)| !**d)
        .map(|(r, _)| r.clone())
        .collect();

    if kept.len() == 1 && kept[0].chunk.text.chars().count() > budget {
        let truncated: String = kept[0].chunk.text.chars().take(budget).collect();
        kept[0].chunk.text = truncated;
    }
    kept
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::document::Chunk;
    use crate::mock::MockLm;

    fn result(id: &str, text: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            chunk: Chunk {
                id: id.to_string(),
                text: text.to_string(),
                embedding: Vec::new(),
                metadata: HashMap::new(),
                document_id: "doc".to_string(),
            },
            score,
            query: "q".to_string(),
        }
    }

    #[tokio::test]
    async fn empty_context_sends_the_raw_query() {
        let lm = Arc::new(MockLm::new("answer"));
        let generator = Generator::new(lm.clone(), None, 1000);
        generator.generate("what is up?", &[], &[]).await.unwrap();

        let prompts = lm.prompts();
        assert_eq!(prompts, vec!["what is up?".to_string()]);
    }

    #[tokio::test]
    async fn grounded_prompt_embeds_sources_in_received_order() {
        let lm = Arc::new(MockLm::new("answer"));
        let generator = Generator::new(lm.clone(), None, 1000);
        let context = [result("a", "first passage", 0.9), result("b", "second passage", 0.8)];
        generator.generate("question?", &context, &[]).await.unwrap();

        let prompt = lm.prompts().pop().unwrap();
        assert!(prompt.contains("[Source 1]\nfirst passage"));
        assert!(prompt.contains("[Source 2]\nsecond passage"));
        assert!(prompt.contains("Question: question?"));
        assert!(prompt.find("first passage").unwrap() < prompt.find("second passage").unwrap());
    }

    #[tokio::test]
    async fn system_prompt_is_prepended_to_history() {
        let lm = Arc::new(MockLm::new("answer"));
        let generator = Generator::new(lm.clone(), Some("be formal".to_string()), 1000);
        generator.generate("hi", &[], &[ChatMessage::user("earlier turn")]).await.unwrap();

        let history = lm.histories().pop().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "be formal");
        assert_eq!(history[1].content, "earlier turn");
    }

    #[test]
    fn budget_drops_lowest_score_first_keeping_order() {
        let context = [
            result("a", "aaaaaaaaaa", 0.9), // 10 chars
            result("b", "bbbbbbbbbb", 0.3), // lowest score, dropped first
            result("c", "cccccccccc", 0.7),
        ];
        let kept = fit_to_budget(&context, 20);
        let ids: Vec<&str> = kept.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn budget_always_keeps_the_best_result_truncated() {
        let context = [result("a", "aaaaaaaaaa", 0.9), result("b", "bbbbbbbbbb", 0.5)];
        let kept = fit_to_budget(&context, 4);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].chunk.id, "a");
        assert_eq!(kept[0].chunk.text, "aaaa");
    }

    #[test]
    fn budget_is_a_no_op_when_everything_fits() {
        let context = [result("a", "short", 0.9), result("b", "texts", 0.5)];
        let kept = fit_to_budget(&context, 100);
        assert_eq!(kept.len(), 2);
    }
}
