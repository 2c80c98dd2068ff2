//! The top-level orchestrator (spec.md section 4.9 / C9): loads a
//! [`Config`]'s analyzer list, instantiates one [`Scheduler`] per entry, and
//! runs all of them concurrently under a single cancellation signal.
//!
//! Grounded on `cmd/serve.go`'s analyzer-set startup: build every configured
//! analyzer, run them all, and propagate a shutdown signal to each on exit.

use std::{collections::HashMap, sync::Arc, time::Duration};

use indexer_config::{AnalyzerConfig, DEFAULT_LOCK_EXPIRY_MINUTES};
use indexer_primitives::IndexerError;
use indexer_storage::Sink;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::scheduler::{BlockProcessor, Scheduler};

/// Plain counters exposed for an external metrics recorder to scrape
/// (SPEC_FULL.md section 4.9b); nothing in this crate installs one.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnalyzerMetrics {
    pub blocks_processed: u64,
    pub blocks_failed: u64,
    pub current_height: u64,
}

/// Drives every configured analyzer to completion (or cancellation).
pub struct Orchestrator<S: Sink> {
    sink: Arc<S>,
    cancel: CancellationToken,
}

impl<S: Sink + Send + Sync + 'static> Orchestrator<S> {
    pub fn new(sink: Arc<S>) -> Self {
        Self { sink, cancel: CancellationToken::new() }
    }

    /// A clone of the token every scheduler is driven with; hand this to a
    /// signal handler to trigger a clean shutdown.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Run one scheduler per `analyzers` entry concurrently. `processors`
    /// must contain one boxed [`BlockProcessor`] per analyzer name; a
    /// missing entry is a fatal configuration error (the orchestrator never
    /// guesses at a default processor).
    pub async fn run(
        &self,
        analyzers: Vec<AnalyzerConfig>,
        mut processors: HashMap<String, Box<dyn BlockProcessor<S> + Send + Sync>>,
    ) -> Result<(), IndexerError> {
        let mut handles = Vec::with_capacity(analyzers.len());

        for cfg in analyzers {
            let processor = processors
                .remove(&cfg.name)
                .ok_or_else(|| IndexerError::Fatal(format!("no processor registered for analyzer {:?}", cfg.name)))?;
            let lock_expiry =
                Duration::from_secs(cfg.lock_expiry_minutes.unwrap_or(DEFAULT_LOCK_EXPIRY_MINUTES) * 60);
            let scheduler = Scheduler::new(
                cfg.name.clone(),
                cfg.mode,
                cfg.block_range,
                cfg.batch_size,
                lock_expiry,
                self.sink.clone(),
                processor,
                self.cancel.clone(),
            );
            let name = cfg.name.clone();
            handles.push((name, tokio::spawn(async move { scheduler.run().await })));
        }

        let mut first_err = None;
        for (name, handle) in handles {
            match handle.await {
                Ok(Ok(())) => info!(analyzer = %name, "analyzer finished"),
                Ok(Err(err)) => {
                    error!(analyzer = %name, error = %err, "analyzer exited with an error");
                    first_err.get_or_insert(err);
                }
                Err(join_err) => {
                    error!(analyzer = %name, error = %join_err, "analyzer task panicked");
                    first_err.get_or_insert(IndexerError::Fatal(join_err.to_string()));
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use indexer_primitives::{BlockRange, Height};
    use indexer_storage::MemorySink;

    use super::*;
    use indexer_config::AnalyzerMode;

    struct NoopProcessor;

    #[async_trait]
    impl BlockProcessor<MemorySink> for NoopProcessor {
        async fn process_block(&self, _sink: &MemorySink, _height: Height) -> Result<(), IndexerError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn missing_processor_is_a_fatal_configuration_error() {
        let orchestrator = Orchestrator::new(Arc::new(MemorySink::new()));
        let analyzers = vec![AnalyzerConfig {
            name: "consensus".to_string(),
            mode: AnalyzerMode::SlowSync,
            block_range: BlockRange { from: 0, to: Some(0) },
            batch_size: 1,
            lock_expiry_minutes: None,
        }];
        let result = orchestrator.run(analyzers, HashMap::new()).await;
        assert!(matches!(result, Err(IndexerError::Fatal(_))));
    }

    #[tokio::test]
    async fn cancelling_the_token_stops_every_scheduler() {
        let orchestrator = Orchestrator::new(Arc::new(MemorySink::new()));
        let analyzers = vec![AnalyzerConfig {
            name: "consensus".to_string(),
            mode: AnalyzerMode::FastSync,
            block_range: BlockRange { from: 0, to: None },
            batch_size: 10,
            lock_expiry_minutes: Some(5),
        }];
        let mut processors: HashMap<String, Box<dyn BlockProcessor<MemorySink> + Send + Sync>> = HashMap::new();
        processors.insert("consensus".to_string(), Box::new(NoopProcessor));

        orchestrator.shutdown();
        orchestrator.run(analyzers, processors).await.unwrap();
    }
}
