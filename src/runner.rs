//! Concurrent execution of analyses.
//!
//! Each analysis runs on a blocking worker over the shared, read-only
//! snapshot. At most `concurrency` run at once and results come back in
//! the order they were requested.

use crate::analysis::{self, AnalysisKind, AnalysisOutput, AnalysisParams};
use crate::loader::Dataset;
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Run `kinds` over `dataset`, at most `concurrency` at a time.
pub async fn run_analyses(
    dataset: Arc<Dataset>,
    params: Arc<AnalysisParams>,
    kinds: &[AnalysisKind],
    concurrency: usize,
) -> Result<Vec<AnalysisOutput>> {
    info!(
        "Running {} analyses (concurrency {})",
        kinds.len(),
        concurrency
    );

    stream::iter(kinds.iter().copied())
        .map(|kind| {
            let dataset = Arc::clone(&dataset);
            let params = Arc::clone(&params);

            async move {
                let started = Instant::now();
                let output =
                    tokio::task::spawn_blocking(move || analysis::run(kind, &dataset, &params))
                        .await
                        .with_context(|| format!("Analysis '{}' did not complete", kind))?;

                debug!(
                    "{}: {} rows in {:.1}ms",
                    kind,
                    output.len(),
                    started.elapsed().as_secs_f64() * 1000.0
                );
                Ok::<_, anyhow::Error>(output)
            }
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}
