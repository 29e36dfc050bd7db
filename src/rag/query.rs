//! Chain result types

use serde::{Deserialize, Serialize};

/// Retrieved snippet reference in a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Source path of the indexed document
    pub source: String,
    /// Relevance score from retrieval
    pub score: f32,
}

impl Source {
    pub fn new(source: &str, score: f32) -> Self {
        Self {
            source: source.to_string(),
            score,
        }
    }
}

/// Answer to one question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainResult {
    /// Newly generated text only
    pub answer: String,
    /// Snippets the prompt was built from, best first
    pub sources: Vec<Source>,
    pub retrieval_time_ms: u64,
    pub generation_time_ms: u64,
}

impl ChainResult {
    /// Get total processing time in milliseconds
    pub fn total_time_ms(&self) -> u64 {
        self.retrieval_time_ms + self.generation_time_ms
    }
}

impl std::fmt::Display for ChainResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Answer: {}", self.answer)?;
        writeln!(f, "\nSources ({}):", self.sources.len())?;
        for (i, source) in self.sources.iter().enumerate() {
            writeln!(f, "  [{}] {} (score: {:.4})", i + 1, source.source, source.score)?;
        }
        writeln!(
            f,
            "\nTiming: retrieval={}ms, generation={}ms, total={}ms",
            self.retrieval_time_ms,
            self.generation_time_ms,
            self.total_time_ms()
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_result_display() {
        let result = ChainResult {
            answer: "Three days.".to_string(),
            sources: vec![Source::new("knowledge_base/delivery.txt", 0.91)],
            retrieval_time_ms: 12,
            generation_time_ms: 488,
        };

        let display = format!("{}", result);
        assert!(display.contains("Three days."));
        assert!(display.contains("knowledge_base/delivery.txt"));
        assert!(display.contains("0.9100"));
        assert!(display.contains("total=500ms"));
    }
}
