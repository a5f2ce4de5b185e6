//! Language model capability used to synthesize answers.

use async_trait::async_trait;

use crate::error::Result;

/// A language model that turns a prompt into a completion.
///
/// Implementations should report failures as
/// [`RagError::SynthesisError`](crate::RagError::SynthesisError). Timeouts are
/// applied by the caller.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::CompletionProvider;
///
/// let model = MyModel::new();
/// let text = model.complete("Say hello").await?;
/// ```
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Complete the given prompt.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Short name used in logs and error messages.
    fn name(&self) -> &str {
        "completion"
    }
}
