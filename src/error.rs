//! Error types for build response decoding

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Fatal decoding failures.
///
/// Build failures reported by the daemon itself are not errors at this
/// level; they are delivered as [`ImageBuildEvent::Error`] events and
/// decoding continues to the end of the stream.
///
/// [`ImageBuildEvent::Error`]: crate::progress::ImageBuildEvent::Error
#[derive(Debug, Error)]
pub enum DecodeError {
    /// A line in the response stream was not a valid JSON object.
    ///
    /// `line` holds the offending input quoted as a JSON string so it is
    /// safe to display whatever bytes the daemon sent.
    #[error("received malformed response line from daemon: {line}")]
    MalformedResponse {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    /// The daemon violated the build response wire contract: a missing
    /// expected field, invalid base64 trace data, an unparseable status
    /// payload, or a status or log referencing a vertex that never started.
    #[error("daemon protocol violation: {0}")]
    Protocol(String),

    /// Reading the response stream or writing the transcript failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// An event handler rejected an event.
    #[error("build event handler failed: {0}")]
    Callback(anyhow::Error),
}
