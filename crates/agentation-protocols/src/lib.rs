//! # Agentation Protocols
//!
//! Wire format and capability traits shared by every Agentation component.
//! Contains only data types and interface definitions - no I/O.
//!
//! ## Contents
//!
//! - [`Envelope`] - The self-describing JSON message exchanged between the
//!   annotation client and the relay server
//! - [`Annotation`] - Single and group annotations produced by the UI layer
//! - Payload types for each [`MessageKind`]
//! - [`FeedbackHandler`] - The asynchronous capability the relay invokes for
//!   each submission
//! - [`SamplingCapability`] - The AI completion capability behind the handler

pub mod annotation;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod payload;
pub mod sampling;

pub use annotation::{Annotation, BoundingBox, GroupAnnotation, Position, SingleAnnotation};
pub use envelope::{Envelope, MessageKind, new_request_id};
pub use error::{ErrorCode, HandlerError, ProtocolError, SamplingError};
pub use handler::{FeedbackHandler, FeedbackRequest};
pub use payload::{
    ConnectPayload, ErrorPayload, FeedbackResultPayload, StatusPayload, SubmitFeedbackPayload,
};
pub use sampling::{
    ModelHint, ModelPreferences, SamplingCapability, SamplingContent, SamplingMessage,
    SamplingRequest, SamplingResponse, SamplingRole,
};

/// Default port of the local relay server.
pub const DEFAULT_RELAY_PORT: u16 = 19989;

/// Default WebSocket URL of the local relay server.
pub const DEFAULT_RELAY_URL: &str = "ws://localhost:19989";

/// WebSocket close code used for intentional disconnects.
pub const NORMAL_CLOSURE: u16 = 1000;
