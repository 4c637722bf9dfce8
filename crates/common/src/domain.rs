mod archive;
mod device_event;
mod envelope;
mod result;
mod telemetry_point;

pub use archive::*;
pub use device_event::*;
pub use envelope::*;
pub use result::*;
pub use telemetry_point::*;
