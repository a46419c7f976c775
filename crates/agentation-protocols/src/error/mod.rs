//! Error types for the Agentation protocol layer.

mod codes;
mod handler;
mod protocol;
mod sampling;

pub use codes::*;
pub use handler::*;
pub use protocol::*;
pub use sampling::*;
