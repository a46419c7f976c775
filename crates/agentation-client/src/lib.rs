//! # Agentation Client
//!
//! Client side of the relay protocol, as run by the annotation tool.
//!
//! A [`ClientSession`] owns at most one WebSocket connection to the relay,
//! correlates every `submit-feedback` with its `feedback-result`, enforces a
//! per-request deadline and reconnects a bounded number of times after an
//! unexpected close.
//!
//! ## Usage
//!
//! ```ignore
//! use agentation_client::{ClientSession, SessionConfig};
//!
//! let session = ClientSession::new(SessionConfig::default());
//! session.set_page("http://example.test", "Example");
//! session.connect("ws://localhost:19989", false).await?;
//! let answer = session.submit_feedback(annotations, None).await?;
//! ```

mod config;
mod design_terms;
mod error;
mod pending;
mod session;

pub use config::SessionConfig;
pub use design_terms::{
    DesignCategory, DesignTerm, DesignTermCatalog, DesignTermResolver, expand_design_terms,
};
pub use error::ClientError;
pub use session::{ClientSession, PageInfo, SessionStatus};
