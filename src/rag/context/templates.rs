//! Chat prompt rendering
//!
//! Renders the role-delimited ChatML layout used by Qwen-family models:
//!
//! ```text
//! <|im_start|>system
//! {system_prompt}
//! <|im_end|>
//! <|im_start|>user
//! Context:
//! {context}
//!
//! Question: {question}
//! <|im_end|>
//! <|im_start|>assistant
//! ```
//!
//! Values are concatenated, never substituted, so braces or role markers
//! inside a snippet cannot pull in another field.

pub const IM_START: &str = "<|im_start|>";
pub const IM_END: &str = "<|im_end|>";

/// Header opening the segment where generation begins
pub const ASSISTANT_HEADER: &str = "<|im_start|>assistant\n";

/// Separator between retrieved snippets
pub const SNIPPET_SEPARATOR: &str = "\n\n";

/// Renders prompts from a system prompt, retrieved snippets and a question
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptAssembler;

impl PromptAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Join snippets in the given order
    pub fn join_context<S: AsRef<str>>(&self, snippets: &[S]) -> String {
        snippets
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(SNIPPET_SEPARATOR)
    }

    /// Render the full prompt, ending with an open assistant segment
    pub fn render<S: AsRef<str>>(&self, system_prompt: &str, snippets: &[S], question: &str) -> String {
        let context = self.join_context(snippets);

        let mut prompt = String::with_capacity(
            system_prompt.len() + context.len() + question.len() + 96,
        );
        prompt.push_str(IM_START);
        prompt.push_str("system\n");
        prompt.push_str(system_prompt);
        prompt.push('\n');
        prompt.push_str(IM_END);
        prompt.push('\n');

        prompt.push_str(IM_START);
        prompt.push_str("user\nContext:\n");
        prompt.push_str(&context);
        prompt.push_str("\n\nQuestion: ");
        prompt.push_str(question);
        prompt.push('\n');
        prompt.push_str(IM_END);
        prompt.push('\n');

        prompt.push_str(ASSISTANT_HEADER);
        prompt
    }
}
