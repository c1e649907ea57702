//! Typed error taxonomy for the protocol engine (§7 of the specification).
//!
//! Transport and classification failures are represented as distinct variants so
//! callers can tell "the wire is broken" from "the module said something we don't
//! recognize" without parsing strings. Aggregation points (the supervisor, `main`)
//! wrap these in `anyhow::Error` the way the teacher codebase wraps `btleplug`
//! errors with `.context(...)`.

use crate::protocol::CommandKind;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("transport failure during {command:?}: {source}")]
    Transport {
        command: CommandKind,
        #[source]
        source: std::io::Error,
    },

    #[error("protocol mismatch for {command:?}: observed {observed} bytes: {window:02x?}")]
    Mismatch {
        command: CommandKind,
        observed: usize,
        window: Vec<u8>,
    },

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(&'static str),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
