use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Bounded attempts with a fixed delay between them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff: Duration::from_secs(5),
        }
    }
}

/// Brings one storage backend up and installs it
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SinkInitializer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn initialize(&self) -> anyhow::Result<()>;
}

/// Try `initializer` until it succeeds, attempts run out or `ctx` is cancelled
///
/// Returns whether the sink came up. Exhaustion is logged, not propagated, so the
/// transport keeps running without this sink.
pub async fn initialize_with_retry(
    initializer: Arc<dyn SinkInitializer>,
    policy: RetryPolicy,
    ctx: CancellationToken,
) -> bool {
    let sink = initializer.name();

    for attempt in 1..=policy.max_attempts {
        match initializer.initialize().await {
            Ok(()) => {
                info!(sink, attempt, "sink initialized");
                return true;
            }
            Err(e) => {
                warn!(
                    sink,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "sink initialization failed"
                );
            }
        }

        if attempt == policy.max_attempts {
            break;
        }

        tokio::select! {
            _ = ctx.cancelled() => {
                info!(sink, "sink initialization cancelled");
                return false;
            }
            _ = tokio::time::sleep(policy.backoff) => {}
        }
    }

    error!(
        sink,
        max_attempts = policy.max_attempts,
        "sink initialization gave up, sink stays not ready"
    );
    false
}
