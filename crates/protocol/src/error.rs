//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while decoding session messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid message opcode: {0:#04x}")]
    InvalidOpcode(u8),

    #[error("Unexpected end of data")]
    UnexpectedEof,

    #[error("Invalid value {value} for field {field}")]
    InvalidValue { field: &'static str, value: u8 },

    #[error("String field is not valid UTF-8")]
    InvalidString,
}
