mod device_event_producer;
mod sink_initializer;

pub use device_event_producer::*;
pub use sink_initializer::*;
