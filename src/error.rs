//! Error types for the hfp-battery crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error on the underlying RFCOMM stream.
    #[error("Stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A command line could not be parsed as a well-formed accessory event.
    ///
    /// Recovered locally: the line is dropped and the session keeps
    /// waiting for further input.
    #[error("Malformed command line: {line:?}")]
    MalformedLine {
        /// The offending line text.
        line: String,
    },

    /// The peer closed the stream or the stream failed.
    ///
    /// Terminates only the affected session; reported as a session
    /// outcome, never propagated across session boundaries.
    #[error("Connection lost")]
    ConnectionLost,

    /// The Connection Broker referenced a path with no active session.
    ///
    /// Benign: callers should treat a disconnection request for an
    /// unknown path as a no-op, not a failure.
    #[error("No active session for path: {path}")]
    UnknownConnection {
        /// The path identifier that was looked up.
        path: String,
    },

    /// The profile has been released and no longer accepts connections.
    #[error("Profile has been released")]
    Released,
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
