//! Ingest a small knowledge base with the hashing embedder, then answer a
//! question through the chain with a scripted generator. No model downloads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kbqa::backend::{BackendDecision, BackendStrategy, DeviceTarget};
use kbqa::cache::{PipelineCache, PipelineFactory};
use kbqa::embedding::{Embedder, TokenEmbedder};
use kbqa::generator::{GenerationProfile, Generator, LoadedPipeline};
use kbqa::ingest::IngestionPipeline;
use kbqa::rag::RetrievalChain;
use kbqa::retrieval::{HnswRetriever, Retriever};
use tempfile::TempDir;

/// Echoes the prompt like a full-text pipeline, answering from the context
struct Scripted;

impl Generator for Scripted {
    fn generate(&self, prompt: &str, _profile: &GenerationProfile) -> anyhow::Result<String> {
        let answer = if prompt.contains("three working days") {
            "Delivery takes three working days."
        } else {
            "I do not know."
        };
        Ok(format!("{}{}", prompt, answer))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedFactory {
    loads: Arc<AtomicUsize>,
}

impl PipelineFactory for ScriptedFactory {
    fn create(&self) -> kbqa::Result<LoadedPipeline> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(LoadedPipeline::new(
            Box::new(Scripted),
            BackendDecision {
                strategy: BackendStrategy::Cpu,
                device: DeviceTarget::Cpu,
                trail: vec!["cpu".to_string()],
            },
            GenerationProfile::default(),
        ))
    }
}

fn write_kb(dir: &std::path::Path) {
    std::fs::write(
        dir.join("delivery.txt"),
        "Delivery: orders ship within three working days of payment.",
    )
    .unwrap();
    std::fs::write(
        dir.join("returns.md"),
        "# Returns\n\nUnused items can be returned within thirty days for a refund.",
    )
    .unwrap();
    std::fs::write(dir.join("empty.txt"), "\n   \n").unwrap();
    std::fs::write(dir.join("system_prompt.txt"), "  You answer questions about the shop.  \n")
        .unwrap();
}

#[test]
fn ingest_then_answer() {
    let kb = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    write_kb(kb.path());

    let embedder: Arc<dyn Embedder> = Arc::new(TokenEmbedder::default());
    let report = IngestionPipeline::new(Arc::clone(&embedder))
        .ingest(kb.path(), store.path())
        .unwrap();
    // system_prompt.txt is a .txt file and gets indexed as well
    assert_eq!(report.files_discovered, 4);
    assert_eq!(report.documents_indexed, 3);
    assert_eq!(report.skipped_empty.len(), 1);

    let retriever: Arc<dyn Retriever> =
        Arc::new(HnswRetriever::from_index(store.path(), Arc::clone(&embedder)).unwrap());
    let loads = Arc::new(AtomicUsize::new(0));
    let cache = Arc::new(PipelineCache::new(ScriptedFactory {
        loads: Arc::clone(&loads),
    }));
    let chain = RetrievalChain::new(
        retriever,
        Arc::clone(&cache),
        3,
        kb.path().join("system_prompt.txt"),
    );

    let result = chain.answer("How many working days does delivery take?").unwrap();
    assert_eq!(result.answer, "Delivery takes three working days.");
    assert!(!result.answer.contains("<|im_start|>"));
    assert!(result.sources.iter().any(|s| s.source.ends_with("delivery.txt")));
    assert!(!result.sources.iter().any(|s| s.source.ends_with("empty.txt")));

    chain.answer("Can I return an item?").unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(
        &*cache.get_or_create_system_prompt(&kb.path().join("other.txt")),
        "You answer questions about the shop."
    );
}

#[test]
fn reingest_does_not_lose_content() {
    let kb = TempDir::new().unwrap();
    let store = TempDir::new().unwrap();
    write_kb(kb.path());

    let embedder: Arc<dyn Embedder> = Arc::new(TokenEmbedder::default());
    let pipeline = IngestionPipeline::new(Arc::clone(&embedder));
    pipeline.ingest(kb.path(), store.path()).unwrap();
    pipeline.ingest(kb.path(), store.path()).unwrap();

    let retriever = HnswRetriever::from_index(store.path(), embedder).unwrap();
    assert_eq!(retriever.len(), 3);

    let results = retriever.retrieve("returned within thirty days refund", 1).unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].source.ends_with("returns.md"));
}
