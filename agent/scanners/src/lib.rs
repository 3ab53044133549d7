//! Parsers for the output of the security scanners the agent runs alongside
//! itself.
//!
//! Both parsers normalize their input into [`ComplianceFinding`]s so that the
//! index sees a single shape regardless of which tool produced a result.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod bench;
pub mod hunter;

pub use collie_agent_core::ComplianceFinding;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("expected a JSON line before the final line, but output has {0} line(s)")]
    MissingJsonLine(usize),

    #[error("failed to decode scanner JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("vulnerability {vid} has malformed category {category:?}")]
    MalformedCategory { vid: String, category: String },
}
