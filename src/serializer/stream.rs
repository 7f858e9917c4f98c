use crate::buffer::RingBuffer;
use crate::codec::chunk::{self, CHUNKED_OVERHEAD, CHUNK_HEADER_LEN, CRLF_LEN, LAST_CHUNK_LEN};

use super::Serializer;

/// Push-style body ingestion handle, obtained from
/// [`Serializer::start_stream`] or re-acquired with [`Serializer::stream`].
///
/// Body bytes are pushed by writing into the span returned by
/// [`prepare`](Self::prepare) and then calling [`commit`](Self::commit) (or in
/// one step with [`write`](Self::write)); [`close`](Self::close) signals the
/// end of the body. With chunked framing every commit becomes one chunk: the
/// serializer reserves the chunk-size line in front of the returned span and
/// backfills it on commit, so a caller may `commit` and `close` back to back
/// without draining in between.
pub struct Stream<'a> {
    sr: &'a mut Serializer,
}

impl<'a> Stream<'a> {
    pub(super) fn new(sr: &'a mut Serializer) -> Self {
        Stream { sr }
    }

    fn staging(&self) -> &RingBuffer {
        if self.sr.is_compressed {
            &self.sr.tmp1
        } else {
            &self.sr.tmp0
        }
    }

    /// Bytes that can still be committed before the serializer must be
    /// drained (framing overhead not yet deducted).
    pub fn capacity(&self) -> usize {
        self.staging().free()
    }

    /// Body bytes queued and not yet handed to the transport.
    pub fn len(&self) -> usize {
        self.staging().len()
    }

    pub fn is_empty(&self) -> bool {
        self.staging().is_empty()
    }

    /// No further bytes can be pushed until the serializer is drained.
    pub fn is_full(&self) -> bool {
        if self.sr.is_compressed {
            self.sr.tmp1.free() == 0
        } else if self.sr.is_chunked {
            self.sr.tmp0.contiguous_free() < CHUNKED_OVERHEAD + 1
        } else {
            self.sr.tmp0.free() == 0
        }
    }

    /// A writable span for the next batch of body bytes.
    ///
    /// Nothing is queued until [`commit`](Self::commit). With chunked framing
    /// the span already excludes the reserved chunk-size line and the
    /// trailing framing bytes.
    ///
    /// # Panics
    ///
    /// Panics if the stream [`is_full`](Self::is_full).
    pub fn prepare(&mut self) -> &mut [u8] {
        assert!(!self.is_full(), "stream buffer is full; drain the serializer before pushing more");
        let sr = &mut *self.sr;
        if sr.is_compressed {
            let n = sr.tmp1.contiguous_free();
            return sr.tmp1.tail_mut(sr.ws.front_mut(), n);
        }
        if sr.is_chunked {
            let n = sr.tmp0.contiguous_free() - CRLF_LEN - LAST_CHUNK_LEN;
            let span = sr.tmp0.tail_mut(sr.ws.back_mut(), n);
            &mut span[CHUNK_HEADER_LEN..]
        } else {
            let n = sr.tmp0.contiguous_free();
            sr.tmp0.tail_mut(sr.ws.back_mut(), n)
        }
    }

    /// Queue the first `n` bytes written into the prepared span. With chunked
    /// framing this backfills the chunk-size line and appends the chunk
    /// terminator, producing exactly one chunk.
    ///
    /// # Panics
    ///
    /// Panics on a zero-length chunked commit (zero-sized chunks mark the end
    /// of the body; call [`close`](Self::close) for that), or if `n` exceeds
    /// the prepared span.
    pub fn commit(&mut self, n: usize) {
        let sr = &mut *self.sr;
        if sr.is_compressed {
            sr.tmp1.commit(n);
            return;
        }
        if !sr.is_chunked {
            sr.tmp0.commit(n);
            return;
        }

        assert!(n != 0, "zero-sized chunks are not valid; call close() to end the body");
        let usable = sr.tmp0.contiguous_free().saturating_sub(CHUNKED_OVERHEAD);
        assert!(n <= usable, "commit({n}) exceeds the prepared span ({usable})");

        let span = sr.tmp0.tail_mut(sr.ws.back_mut(), CHUNK_HEADER_LEN + n);
        chunk::write_size_line(span, n);
        sr.tmp0.commit(CHUNK_HEADER_LEN + n);
        sr.tmp0.extend_from_slice(sr.ws.back_mut(), chunk::CRLF);
    }

    /// Copy as much of `data` as currently fits and commit it. Returns the
    /// number of bytes taken; `0` means the stream is full.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if data.is_empty() || self.is_full() {
            return 0;
        }
        let span = self.prepare();
        let n = span.len().min(data.len());
        span[..n].copy_from_slice(&data[..n]);
        if n > 0 {
            self.commit(n);
        }
        n
    }

    /// Signal the end of the body. With uncompressed chunked framing this
    /// writes the last-chunk marker; compressed styles finish the filter on
    /// the following `prepare`.
    ///
    /// # Panics
    ///
    /// Panics if the stream was already closed.
    pub fn close(self) {
        let sr = self.sr;
        assert!(sr.more, "stream already closed");
        if sr.is_chunked && !sr.is_compressed {
            sr.tmp0.extend_from_slice(sr.ws.back_mut(), chunk::LAST_CHUNK);
        }
        sr.more = false;
    }
}
