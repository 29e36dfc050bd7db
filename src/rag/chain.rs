//! Question-to-answer chain
//!
//! retrieve → render prompt → generate → strip the echoed prompt. The chain
//! owns no state of its own; the pipeline and system prompt come from the
//! shared [`PipelineCache`] on every call.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::PipelineCache;
use crate::config::Settings;
use crate::error::Result;
use crate::rag::context::{PromptAssembler, ASSISTANT_HEADER};
use crate::rag::query::{ChainResult, Source};
use crate::retrieval::Retriever;

/// Wires a retriever, the prompt layout and the cached pipeline together
pub struct RetrievalChain {
    retriever: Arc<dyn Retriever>,
    cache: Arc<PipelineCache>,
    top_k: usize,
    system_prompt_path: PathBuf,
    assembler: PromptAssembler,
}

impl RetrievalChain {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        cache: Arc<PipelineCache>,
        top_k: usize,
        system_prompt_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            retriever,
            cache,
            top_k,
            system_prompt_path: system_prompt_path.into(),
            assembler: PromptAssembler::new(),
        }
    }

    /// Chain using the prompt path and top-k from `settings`
    pub fn from_settings(
        settings: &Settings,
        retriever: Arc<dyn Retriever>,
        cache: Arc<PipelineCache>,
    ) -> Result<Self> {
        Ok(Self::new(
            retriever,
            cache,
            settings.top_k()?,
            settings.system_prompt_path.clone(),
        ))
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Answer a question from the knowledge base
    pub fn answer(&self, question: &str) -> Result<ChainResult> {
        let start = Instant::now();
        let results = self.retriever.retrieve(question, self.top_k)?;
        let retrieval_time_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            "Retrieved {} snippets via {} in {}ms",
            results.len(),
            self.retriever.name(),
            retrieval_time_ms
        );

        let system_prompt = self.cache.get_or_create_system_prompt(&self.system_prompt_path);
        let snippets: Vec<&str> = results.iter().map(|r| r.text.as_str()).collect();
        let prompt = self.assembler.render(&system_prompt, &snippets, question);

        let pipeline = self.cache.get_or_create_pipeline()?;
        let start = Instant::now();
        let output = pipeline.generate(&prompt)?;
        let generation_time_ms = start.elapsed().as_millis() as u64;

        let answer = extract_continuation(&output, &prompt);
        tracing::info!(
            "Answered in {}ms ({} chars, {} sources)",
            retrieval_time_ms + generation_time_ms,
            answer.len(),
            results.len()
        );

        Ok(ChainResult {
            answer,
            sources: results
                .iter()
                .map(|r| Source::new(&r.source, r.score))
                .collect(),
            retrieval_time_ms,
            generation_time_ms,
        })
    }
}

/// The newly generated part of a model output
///
/// Removes the echoed prompt when the output starts with it; otherwise keeps
/// what follows the last assistant header, if any.
pub fn extract_continuation(output: &str, prompt: &str) -> String {
    let continuation = match output.strip_prefix(prompt) {
        Some(rest) => rest,
        None => match output.rfind(ASSISTANT_HEADER) {
            Some(idx) => &output[idx + ASSISTANT_HEADER.len()..],
            None => output,
        },
    };
    continuation.trim().to_string()
}
