use crate::domain::{HandlerOutcome, MessageHandler};
use common::domain::{Category, InboundMessage};
use std::sync::Arc;
use tracing::debug;

/// Dispatches admitted messages to the handler for their category
pub struct MessageRouter {
    telemetry: Arc<dyn MessageHandler>,
    hello: Arc<dyn MessageHandler>,
    status: Arc<dyn MessageHandler>,
    command_ack: Arc<dyn MessageHandler>,
    ota_status: Arc<dyn MessageHandler>,
}

impl MessageRouter {
    pub fn new(
        telemetry: Arc<dyn MessageHandler>,
        hello: Arc<dyn MessageHandler>,
        status: Arc<dyn MessageHandler>,
        command_ack: Arc<dyn MessageHandler>,
        ota_status: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            telemetry,
            hello,
            status,
            command_ack,
            ota_status,
        }
    }

    pub fn handler_for(&self, category: Category) -> &Arc<dyn MessageHandler> {
        match category {
            Category::Telemetry => &self.telemetry,
            Category::Hello => &self.hello,
            Category::Status => &self.status,
            Category::CommandAck => &self.command_ack,
            Category::OtaStatus => &self.ota_status,
        }
    }

    pub async fn route(&self, message: &InboundMessage) -> HandlerOutcome {
        let category = message.category();
        debug!(category = %category, "routing message");
        self.handler_for(category).handle(message).await
    }
}
