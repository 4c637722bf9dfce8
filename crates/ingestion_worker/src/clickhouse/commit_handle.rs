use common::domain::{DomainError, TimeSeriesSink};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Periodically commits the time-series buffer and flushes it on shutdown
pub struct InserterCommitHandle {
    sink: Arc<dyn TimeSeriesSink>,
    commit_interval: Duration,
}

impl InserterCommitHandle {
    pub fn new(sink: Arc<dyn TimeSeriesSink>, commit_interval: Duration) -> Self {
        Self {
            sink,
            commit_interval,
        }
    }

    /// Run the commit loop until cancellation
    pub async fn run(&self, ctx: CancellationToken) -> anyhow::Result<()> {
        info!(
            interval_ms = self.commit_interval.as_millis(),
            "starting inserter commit loop"
        );

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("inserter commit loop shutting down");
                    match self.sink.flush().await {
                        Ok(()) | Err(DomainError::SinkUnavailable(_)) => {}
                        Err(e) => error!(error = %e, "failed to flush on shutdown"),
                    }
                    break;
                }
                _ = tokio::time::sleep(self.commit_interval) => {
                    match self.sink.commit().await {
                        Ok(()) => {}
                        Err(DomainError::SinkUnavailable(reason)) => {
                            debug!(reason = %reason, "time-series sink not ready, skipping commit");
                        }
                        Err(e) => warn!(error = %e, "failed to commit inserter buffer"),
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use collector_runner::{RunOutcome, Runner};
    use common::domain::{DomainResult, MockTimeSeriesSink, RangeQuery, TelemetryPoint};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_commits_periodically_and_flushes_on_shutdown() {
        let mut sink = MockTimeSeriesSink::new();
        sink.expect_commit().returning(|| Ok(()));
        sink.expect_flush().times(1).returning(|| Ok(()));

        let handle = InserterCommitHandle::new(Arc::new(sink), Duration::from_millis(5));
        let ctx = CancellationToken::new();
        let stop = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            stop.cancel();
        });

        handle.run(ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_failures_do_not_stop_the_loop() {
        let mut sink = MockTimeSeriesSink::new();
        sink.expect_commit()
            .returning(|| Err(DomainError::SinkUnavailable("timeseries".to_string())));
        sink.expect_flush()
            .times(1)
            .returning(|| Err(DomainError::SinkUnavailable("timeseries".to_string())));

        let handle = InserterCommitHandle::new(Arc::new(sink), Duration::from_millis(1));
        let ctx = CancellationToken::new();
        let stop = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stop.cancel();
        });

        assert!(handle.run(ctx).await.is_ok());
    }

    struct SlowFlushSink {
        flushed: AtomicBool,
    }

    #[async_trait]
    impl TimeSeriesSink for SlowFlushSink {
        async fn write(&self, _point: &TelemetryPoint) -> DomainResult<()> {
            Ok(())
        }

        async fn query_range(&self, _query: &RangeQuery) -> DomainResult<Vec<TelemetryPoint>> {
            Ok(Vec::new())
        }

        async fn commit(&self) -> DomainResult<()> {
            Ok(())
        }

        async fn flush(&self) -> DomainResult<()> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_shutdown_flush_completes_under_runner() {
        let sink = Arc::new(SlowFlushSink {
            flushed: AtomicBool::new(false),
        });
        let commit_sink: Arc<dyn TimeSeriesSink> = sink.clone();
        let token = CancellationToken::new();

        let runner = Runner::new()
            .with_named_process("health_server", |ctx| async move {
                ctx.cancelled().await;
                Ok(())
            })
            .with_named_process("timeseries_commit", move |ctx| async move {
                InserterCommitHandle::new(commit_sink, Duration::from_secs(60))
                    .run(ctx)
                    .await
            })
            .with_cancellation_token(token.clone());

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let outcome = runner.run_until_stopped().await;
        assert_eq!(outcome, RunOutcome::Clean);
        assert!(sink.flushed.load(Ordering::SeqCst));
    }
}
