use std::io;

use thiserror::Error;

use crate::command::CommandCode;

/// The primary error type for the `ld2410-tokio` library.
#[derive(Error, Debug)]
pub enum Error {
    /// The serial transport failed to open, read or write.
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),

    /// The device stopped sending frames (EOF or closed transport).
    ///
    /// Once a session is in this state every further operation fails with
    /// the same error until the client is dropped and a new one is opened.
    #[error("device has disconnected")]
    Disconnected,

    /// A command was issued in the wrong session mode.
    #[error("command used in the wrong mode: {0}")]
    CommandContext(&'static str),

    /// Command arguments were rejected before any byte hit the wire.
    #[error("invalid command parameter: {0}")]
    CommandParam(String),

    /// No usable ack: the device stayed silent past the command timeout or
    /// replied with something that does not parse.
    #[error("bad or missing command reply: {0}")]
    CommandReply(String),

    /// The device acknowledged the command with a non-zero status word.
    ///
    /// Status meanings beyond zero are undocumented by the vendor, so the
    /// raw value is surfaced as-is.
    #[error("command {code:?} failed with device status {status}")]
    CommandStatus { code: CommandCode, status: u16 },

    /// The module is restarting; the transport is about to disappear.
    #[error("module is restarting")]
    ModuleRestarted,
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::CommandReply("no ack within the command timeout".to_string())
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while decoding wire frames or their payloads.
///
/// These never surface to callers of the high-level API: the frame stream
/// resynchronises and keeps scanning, and the reader task logs and skips
/// payloads it cannot make sense of.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Not enough bytes for even the smallest frame.
    #[error("frame too short: need at least {expected} bytes, got {actual}")]
    FrameTooShort { expected: usize, actual: usize },

    /// Head magic did not match either dialect: not a frame at all.
    #[error("bad frame magic {0:02x?}")]
    BadMagic([u8; 4]),

    /// Head and length checked out but the trailer did not: a real frame
    /// that got clipped or corrupted on the wire.
    #[error("bad frame trailer {0:02x?}")]
    BadTrailer([u8; 4]),

    /// The payload bytes do not follow the schema for their frame kind.
    #[error("payload schema mismatch: {0}")]
    PayloadSchemaMismatch(String),

    /// The payload ended before the schema was satisfied.
    #[error("truncated payload: need at least {expected} bytes, got {actual}")]
    TruncatedPayload { expected: usize, actual: usize },
}

impl FrameError {
    pub(crate) fn schema(what: impl Into<String>) -> Self {
        FrameError::PayloadSchemaMismatch(what.into())
    }

    pub(crate) fn truncated(expected: usize, actual: usize) -> Self {
        FrameError::TruncatedPayload { expected, actual }
    }
}

impl From<FrameError> for Error {
    fn from(err: FrameError) -> Self {
        Error::CommandReply(err.to_string())
    }
}
