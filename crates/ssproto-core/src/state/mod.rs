//! Framer state machine module.

pub mod framer;
pub mod machine;

pub use framer::{Framer, FramerError, FramerOptions, ResponseEnvelope};
pub use machine::{FramerContext, FramerState, ResponseDisposition, TransactionHandle};
