mod client;
mod object_store;
mod traits;

pub use client::*;
pub use object_store::*;
pub use traits::*;
