//! Answer synthesis: bounded prompt assembly and the language model call.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::completion::CompletionProvider;
use crate::config::RagConfig;
use crate::document::{Answer, SearchResult};
use crate::error::{RagError, Result};

/// Instruction template used unless the configuration overrides it.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "\
Use only the following context to answer the user's question.
If the context does not contain the answer, say that you do not know instead of making one up.

Context:
{context}

Question: {question}

Detailed answer:";

/// Separator placed between chunk texts in the context block.
const CONTEXT_SEPARATOR: &str = "\n\n";

/// Builds a grounded prompt from retrieved chunks and asks the language model.
///
/// The context is filled with chunks in retrieval order until the next one
/// would exceed `max_context_chars`; that chunk and everything ranked below
/// it are left out. Chunks are never cut.
#[derive(Clone)]
pub struct AnswerSynthesizer {
    completion_provider: Arc<dyn CompletionProvider>,
    template: String,
    max_context_chars: usize,
    timeout: Duration,
}

impl AnswerSynthesizer {
    /// Create a synthesizer with the default template, a 6000 character
    /// context bound and a 60 second timeout.
    pub fn new(completion_provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            completion_provider,
            template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            max_context_chars: 6000,
            timeout: Duration::from_secs(60),
        }
    }

    /// Create a synthesizer using the template, bound and timeout from `config`.
    pub fn from_config(
        completion_provider: Arc<dyn CompletionProvider>,
        config: &RagConfig,
    ) -> Self {
        Self {
            completion_provider,
            template: config.prompt_template.clone(),
            max_context_chars: config.max_context_chars,
            timeout: config.completion_timeout(),
        }
    }

    /// Replace the prompt template. It must contain `{context}` and `{question}`.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Set the context bound in characters.
    pub fn with_max_context_chars(mut self, chars: usize) -> Self {
        self.max_context_chars = chars;
        self
    }

    /// Set how long to wait for the language model.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The longest prefix of `retrieved` whose texts fit the context bound.
    pub fn select_context<'a>(&self, retrieved: &'a [SearchResult]) -> &'a [SearchResult] {
        let separator_len = CONTEXT_SEPARATOR.chars().count();
        let mut used = 0;
        for (i, result) in retrieved.iter().enumerate() {
            let cost = result.chunk.text.chars().count() + if i == 0 { 0 } else { separator_len };
            if used + cost > self.max_context_chars {
                return &retrieved[..i];
            }
            used += cost;
        }
        retrieved
    }

    /// Render the prompt for `question` over the given context chunks.
    pub fn build_prompt(&self, question: &str, context: &[SearchResult]) -> String {
        let context_text = context
            .iter()
            .map(|r| r.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);
        render_template(&self.template, &context_text, question)
    }

    /// Answer `question` from `retrieved`, most similar first.
    ///
    /// Returns the model's text and exactly the chunks placed in the prompt.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::SynthesisError`] if the model fails or does not
    /// respond within the timeout.
    pub async fn answer(&self, question: &str, retrieved: &[SearchResult]) -> Result<Answer> {
        let used = self.select_context(retrieved);
        if used.len() < retrieved.len() {
            info!(
                retrieved = retrieved.len(),
                used = used.len(),
                max_context_chars = self.max_context_chars,
                "context bound dropped lower-ranked chunks"
            );
        }

        let prompt = self.build_prompt(question, used);
        let provider = self.completion_provider.name().to_string();
        debug!(provider = %provider, prompt_len = prompt.len(), "invoking language model");

        let call = self.completion_provider.complete(&prompt);
        let text = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                error!(provider = %provider, error = %e, "language model call failed");
                return Err(match e {
                    e @ RagError::SynthesisError { .. } => e,
                    other => RagError::SynthesisError { provider, message: other.to_string() },
                });
            }
            Err(_) => {
                error!(
                    provider = %provider,
                    timeout_secs = self.timeout.as_secs(),
                    "language model timed out"
                );
                return Err(RagError::SynthesisError {
                    provider,
                    message: format!("no response within {} seconds", self.timeout.as_secs()),
                });
            }
        };

        Ok(Answer { text: text.trim().to_string(), used_chunks: used.to_vec() })
    }
}

/// Substitute `{context}` and `{question}` in one pass, so placeholder-like
/// text inside either value is left alone.
fn render_template(template: &str, context: &str, question: &str) -> String {
    let mut out = String::with_capacity(template.len() + context.len() + question.len());
    let mut rest = template;
    loop {
        let next = [("{context}", context), ("{question}", question)]
            .into_iter()
            .filter_map(|(placeholder, value)| {
                rest.find(placeholder).map(|at| (at, placeholder, value))
            })
            .min_by_key(|(at, _, _)| *at);
        match next {
            Some((at, placeholder, value)) => {
                out.push_str(&rest[..at]);
                out.push_str(value);
                rest = &rest[at + placeholder.len()..];
            }
            None => {
                out.push_str(rest);
                return out;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::document::Chunk;

    /// Records the prompt and answers with a fixed string.
    #[derive(Default)]
    struct RecordingModel {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CompletionProvider for RecordingModel {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("  The deadline is 30 days.\n".into())
        }
    }

    struct SlowModel;

    #[async_trait]
    impl CompletionProvider for SlowModel {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok("too late".into())
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn result(text: &str, score: f32) -> SearchResult {
        SearchResult {
            chunk: Chunk {
                id: text.into(),
                text: text.into(),
                document_id: "doc".into(),
                page_number: 1,
                start_offset: 0,
                chunk_index: 0,
            },
            score,
        }
    }

    #[tokio::test]
    async fn prompt_contains_context_in_rank_order() {
        let model = Arc::new(RecordingModel::default());
        let synthesizer = AnswerSynthesizer::new(model.clone());
        let retrieved = vec![result("first", 0.9), result("second", 0.8)];

        let answer = synthesizer.answer("What is the deadline?", &retrieved).await.unwrap();

        assert_eq!(answer.text, "The deadline is 30 days.");
        assert_eq!(answer.used_chunks, retrieved);
        let prompt = &model.prompts.lock().unwrap()[0];
        assert!(prompt.contains("first\n\nsecond"));
        assert!(prompt.contains("Question: What is the deadline?"));
        assert!(prompt.contains("say that you do not know"));
    }

    #[tokio::test]
    async fn context_bound_drops_lowest_ranked_chunks_whole() {
        let model = Arc::new(RecordingModel::default());
        // "aaaa" + "\n\n" + "bbbb" = 10 chars; "cc" would need 4 more
        let synthesizer = AnswerSynthesizer::new(model.clone()).with_max_context_chars(12);
        let retrieved = vec![result("aaaa", 0.9), result("bbbb", 0.8), result("cc", 0.7)];

        let answer = synthesizer.answer("q", &retrieved).await.unwrap();

        assert_eq!(answer.used_chunks, retrieved[..2].to_vec());
        let prompt = &model.prompts.lock().unwrap()[0];
        assert!(prompt.contains("aaaa\n\nbbbb"));
        assert!(!prompt.contains("cc"));
    }

    #[test]
    fn a_lower_ranked_chunk_never_jumps_a_dropped_one() {
        let synthesizer =
            AnswerSynthesizer::new(Arc::new(RecordingModel::default())).with_max_context_chars(5);
        let retrieved = vec![result("abc", 0.9), result("too long", 0.8), result("x", 0.1)];
        assert_eq!(synthesizer.select_context(&retrieved).len(), 1);
    }

    #[test]
    fn oversized_top_chunk_leaves_empty_context() {
        let synthesizer =
            AnswerSynthesizer::new(Arc::new(RecordingModel::default())).with_max_context_chars(3);
        assert!(synthesizer.select_context(&[result("abcd", 1.0)]).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_becomes_a_synthesis_error() {
        let synthesizer =
            AnswerSynthesizer::new(Arc::new(SlowModel)).with_timeout(Duration::from_secs(5));
        let err = synthesizer.answer("q", &[result("ctx", 1.0)]).await.unwrap_err();
        assert!(matches!(
            err,
            RagError::SynthesisError { provider, message }
                if provider == "slow" && message.contains("5 seconds")
        ));
    }

    #[test]
    fn placeholders_inside_values_are_not_expanded() {
        let rendered = render_template("C={context} Q={question}", "{question}", "{context}?");
        assert_eq!(rendered, "C={question} Q={context}?");
    }
}
