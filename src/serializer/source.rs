use std::io;

use bytes::{Buf, Bytes};

/// Result of one [`Source::read`] pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceOutcome {
    /// Bytes written into the destination span.
    pub bytes: usize,
    /// No further body bytes will be produced.
    pub finished: bool,
}

impl SourceOutcome {
    /// `bytes` written, more to come.
    pub fn partial(bytes: usize) -> Self {
        SourceOutcome { bytes, finished: false }
    }

    /// `bytes` written and the body is complete.
    pub fn finished(bytes: usize) -> Self {
        SourceOutcome { bytes, finished: true }
    }
}

/// Pull-style body ingestion.
///
/// The serializer calls [`read`](Self::read) with a writable span carved from
/// its staging ring; the source fills some prefix of it and reports whether
/// the body is complete. Returning `bytes: 0` with `finished: false` is
/// allowed; the serializer produces no output for that cycle and the caller
/// re-drives.
///
/// Errors propagate out of `Serializer::prepare` unchanged.
pub trait Source {
    fn read(&mut self, dest: &mut [u8]) -> io::Result<SourceOutcome>;
}

/// The canonical in-memory source: yields a [`Bytes`] payload.
#[derive(Debug, Clone)]
pub struct BytesSource {
    remaining: Bytes,
}

impl BytesSource {
    pub fn new(payload: Bytes) -> Self {
        BytesSource { remaining: payload }
    }
}

impl From<Bytes> for BytesSource {
    fn from(payload: Bytes) -> Self {
        Self::new(payload)
    }
}

impl Source for BytesSource {
    fn read(&mut self, dest: &mut [u8]) -> io::Result<SourceOutcome> {
        let n = dest.len().min(self.remaining.len());
        dest[..n].copy_from_slice(&self.remaining[..n]);
        self.remaining.advance(n);
        if self.remaining.is_empty() {
            Ok(SourceOutcome::finished(n))
        } else {
            Ok(SourceOutcome::partial(n))
        }
    }
}
