mod deferred_sink;
mod device_activity;
mod envelope_parser;
mod error;
mod handlers;
mod message_handler;
mod pipeline;
mod readiness;
mod router;
mod sequence_deduplicator;
mod sink_initializer;
mod stats;

pub use deferred_sink::*;
pub use device_activity::*;
pub use envelope_parser::*;
pub use error::*;
pub use handlers::*;
pub use message_handler::*;
pub use pipeline::*;
pub use readiness::*;
pub use router::*;
pub use sequence_deduplicator::*;
pub use sink_initializer::*;
pub use stats::*;
