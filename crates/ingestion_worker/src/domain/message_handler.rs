use async_trait::async_trait;
use common::domain::InboundMessage;

/// What a handler managed to store for one message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerOutcome {
    pub archived: bool,
    pub archive_failed: bool,
    pub points_written: u64,
    pub points_failed: u64,
    pub event_published: bool,
    pub event_failed: bool,
}

/// Handles one category of admitted messages
///
/// Sink failures are logged and reported in the outcome, never returned.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &InboundMessage) -> HandlerOutcome;
}
