use std::io;
use std::time::Duration;

use thiserror::Error;

/// Everything that can end a query without a result.
#[derive(Debug, Error)]
pub enum SourceQueryError {
    /// Name lookup for the target host failed.
    #[error("failed to resolve host: {0}")]
    Resolution(#[source] io::Error),
    /// Name lookup succeeded but yielded nothing usable.
    #[error("host {0} resolved to no usable addresses")]
    NoEndpoints(String),
    #[error("failed to bind a local UDP port: {0}")]
    FailedPortBind(#[source] io::Error),
    #[error("failed to send packet: {0}")]
    SendError(#[source] io::Error),
    #[error("failed to receive packet: {0}")]
    ReceiveError(#[source] io::Error),
    /// No valid reply arrived before the deadline.
    #[error("no valid reply within {0:?}")]
    TimedOut(Duration),
    /// The reply did not start with the `-1` single-packet header.
    #[error("bad reply header {0} (expected -1)")]
    BadHeader(i32),
    /// The reply carried a format tag this client does not understand.
    #[error("unsupported reply format tag {0:#04x}")]
    UnsupportedFormat(u8),
    /// The reply ended in the middle of a field.
    #[error("reply truncated at {0} bytes")]
    Truncated(usize),
    /// The runtime driving the query went away before it finished.
    #[error("query was cancelled before completion")]
    Cancelled,
}

impl SourceQueryError {
    /// True for errors raised while decoding a reply, as opposed to
    /// network, resolution or deadline failures.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::BadHeader(_) | Self::UnsupportedFormat(_) | Self::Truncated(_)
        )
    }
}
