//! Command-line interface
//!
//! Provides CLI commands for ingest, ask and backends. Model loading,
//! embedding and generation block, so each command body runs on the
//! blocking pool.

use crate::backend::{select_backend, CapabilityProbe, SystemProbe};
use crate::cache;
use crate::config::Settings;
use crate::embedding::create_embedder;
use crate::ingest::IngestionPipeline;
use crate::rag::RetrievalChain;
use crate::retrieval::{HnswRetriever, Retriever};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Execute the ingest command
pub async fn ingest(
    settings: Settings,
    input: Option<PathBuf>,
    index: Option<PathBuf>,
    recursive: bool,
) -> Result<()> {
    let input = input.unwrap_or_else(|| settings.knowledge_base.clone());
    let index = index.unwrap_or_else(|| settings.index_path.clone());

    tracing::info!("Starting ingestion pipeline");
    tracing::info!("  Input: {:?}", input);
    tracing::info!("  Index: {:?}", index);
    tracing::info!("  Embedding: {} ({})", settings.embedding_model, settings.embedding_backend);

    let report = tokio::task::spawn_blocking(move || -> Result<_> {
        let embedder = create_embedder(&settings)?;
        let pipeline = IngestionPipeline::new(embedder).with_recursive(recursive);
        Ok(pipeline.ingest(&input, &index)?)
    })
    .await
    .context("Ingestion task panicked")??;

    println!("\n✓ Ingestion complete");
    println!("  {}", report);
    for path in &report.skipped_empty {
        println!("  empty: {}", path.display());
    }
    for path in &report.failed {
        println!("  unreadable: {}", path.display());
    }
    if !report.index_written {
        println!("  Index left unchanged");
    }

    Ok(())
}

/// Execute the ask command
pub async fn ask(settings: Settings, question: String, top_k: Option<usize>) -> Result<()> {
    tracing::info!("Question: {}", question);

    let result = tokio::task::spawn_blocking(move || -> Result<_> {
        let embedder = create_embedder(&settings)?;
        let retriever: Arc<dyn Retriever> =
            Arc::new(HnswRetriever::from_index(&settings.index_path, embedder)?);

        let mut chain = RetrievalChain::from_settings(&settings, retriever, cache::shared(&settings))?;
        if let Some(top_k) = top_k {
            chain = chain.with_top_k(top_k);
        }
        Ok(chain.answer(&question)?)
    })
    .await
    .context("Query task panicked")?;

    match result {
        Ok(result) => {
            println!("\n{}", result);
            Ok(())
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            println!("\nSorry, the assistant could not answer this question right now.");
            Err(e)
        }
    }
}

/// Execute the backends command
///
/// Reports what the selector would choose without loading a model.
pub async fn backends(settings: Settings) -> Result<()> {
    let caps = SystemProbe.probe();
    let decision = select_backend(&settings.backend, &caps, &settings.device_hint);

    println!("Capabilities:\n{}", caps);
    println!("\nRequested: {} (device hint: {})", settings.backend, settings.device_hint);
    println!("Decision:  {}", decision);
    for step in &decision.trail {
        println!("  - {}", step);
    }
    if decision.is_degraded() {
        println!("\nRequested backend is unavailable; a fallback would be used");
    }

    Ok(())
}
