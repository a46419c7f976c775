//! # Agentation Bridge
//!
//! The feedback pipeline between the relay and an AI sampling capability.
//!
//! [`build_feedback_prompt`] renders a submission into a single prompt and
//! [`SamplingFeedbackHandler`] sends it through any [`SamplingCapability`],
//! turning every failure into a [`HandlerError`] instead of a fault.
//!
//! [`SamplingCapability`]: agentation_protocols::SamplingCapability
//! [`HandlerError`]: agentation_protocols::HandlerError

mod handler;
mod prompt;

pub use handler::{BridgeOptions, NON_TEXT_RESPONSE, SamplingFeedbackHandler, validate_submission};
pub use prompt::build_feedback_prompt;
