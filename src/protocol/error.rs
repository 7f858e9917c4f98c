//! Error types for message serialization.
//!
//! The taxonomy separates four kinds of condition:
//!
//! - **Precondition violations**: using a serializer after it is done,
//!   committing a zero-length chunk, calling `prepare` in compressed mode
//!   without draining, consuming past the header while expect-continue is
//!   pending. These are programmer errors and panic; they never appear here.
//! - **Resource exhaustion**: the workspace is too small for the selected
//!   transfer mode. Raised by `start_*` as [`SerializeError::WorkspaceExhausted`].
//! - **Sentinel statuses**: [`SerializeError::Expect100Continue`] and
//!   [`SerializeError::NeedData`] are part of normal operation: they tell the
//!   caller to synchronize with the peer or push more body data, and leave the
//!   serializer in a well-defined, retry-capable state.
//! - **Upstream failures**: a body source or content-coding filter failed;
//!   forwarded verbatim as [`SerializeError::Body`].
use std::io;

use thiserror::Error;

/// Errors surfaced by the serializer through `start_*` and `prepare`.
#[derive(Debug, Error)]
pub enum SerializeError {
    /// The workspace cannot hold the minimum staging buffers for the selected
    /// transfer mode. Raised by `start_*` only.
    #[error("workspace too small for the selected transfer mode")]
    WorkspaceExhausted,

    /// The header has been transmitted and the caller must await the peer's
    /// interim response before the body is produced. Not a failure.
    #[error("expect 100-continue: await the interim response before sending the body")]
    Expect100Continue,

    /// The stream has no committed data and has not been closed. Not a
    /// failure: push body bytes or close the stream, then retry.
    #[error("stream has no data: commit body bytes or close the stream")]
    NeedData,

    /// A body source or content-coding filter failed.
    #[error("body error: {source}")]
    Body {
        #[from]
        source: io::Error,
    },
}

impl SerializeError {
    /// Returns true for the sentinel statuses that are part of normal
    /// operation rather than failures.
    #[inline]
    pub fn is_sentinel(&self) -> bool {
        matches!(self, SerializeError::Expect100Continue | SerializeError::NeedData)
    }
}

/// Errors raised while rendering a message head from `http` crate parts.
#[derive(Debug, Error)]
pub enum HeadError {
    /// Only HTTP/1.1 heads can be rendered.
    #[error("unsupported http version: {0:?}")]
    UnsupportedVersion(http::Version),

    /// The `Content-Encoding` header names a coding the serializer cannot
    /// apply.
    #[error("unsupported content coding: {value}")]
    UnsupportedCoding { value: String },

    /// A metadata-bearing header value is not valid visible ASCII.
    #[error("invalid value for header {name}")]
    InvalidValue { name: &'static str },
}

impl HeadError {
    pub fn unsupported_coding<S: ToString>(value: S) -> Self {
        Self::UnsupportedCoding { value: value.to_string() }
    }
}
