use std::io;
use thiserror::Error;

/// Custom error types for the gateway protocol client
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Unknown command id {command} (subsystem {subsystem})")]
    UnknownCommand {
        /// Subsystem byte from the frame header
        subsystem: u8,
        /// Command byte from the frame header
        command: u8,
    },

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Invalid address mode: {0}")]
    InvalidAddressMode(u32),

    #[error("Payload decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Payload is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("Value {value} does not fit field `{field}`")]
    FieldRange {
        /// Payload field name
        field: &'static str,
        /// Raw wire value
        value: u64,
    },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Client task is no longer running")]
    ChannelClosed,
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new framing error
    pub fn framing(msg: impl Into<String>) -> Self {
        Error::Framing(msg.into())
    }

    /// Creates a new unknown device error
    pub fn unknown_device(msg: impl Into<String>) -> Self {
        Error::UnknownDevice(msg.into())
    }

    /// Creates a new connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Error::Connection(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Whether the error should tear down the socket and start the reconnect sequence.
    ///
    /// Everything else is absorbed where it happens: the frame or request is dropped
    /// and the connection stays up.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Connection(_))
    }
}
