//! The per-message serialization state machine.
//!
//! A [`Serializer`] owns a fixed workspace and serializes one message at a
//! time: pick a body style with one of the `start_*` methods, then loop
//! `prepare` → transmit → `consume` until [`Serializer::is_done`]. The
//! workspace is reused across messages; `start_*` re-initializes.
//!
//! Four body styles feed the same output protocol:
//!
//! - **empty**: no body; the view is the header (plus the last-chunk marker
//!   when chunked)
//! - **buffers**: caller-owned [`Bytes`] ranges, exposed zero-copy; chunked
//!   framing wraps them in a single chunk since the total is known up front
//! - **source** (pull): the serializer reads body bytes directly into its
//!   output ring ([`Source`])
//! - **stream** (push): the caller commits bytes through a [`Stream`] handle
//!
//! A non-identity content-coding routes any style through the compression
//! pipeline: body bytes are staged on the input side, driven through the
//! filter into the output ring, and, when chunked, framed as exactly one
//! chunk per `prepare` call. In compressed mode the caller must fully consume
//! each batch before the next `prepare`.

use bytes::{Buf, Bytes};
use tracing::trace;

use crate::buffer::{BufferSlices, RingBuffer, Workspace};
use crate::codec::chunk::{self, CHUNKED_OVERHEAD, CHUNK_HEADER_LEN, CRLF_LEN, LAST_CHUNK_LEN};
use crate::codec::{make_deflate_filter, make_gzip_filter, Filter, SYNC_FLUSH_OVERHEAD};
use crate::ensure;
use crate::protocol::{ContentCoding, MessageHead, SerializeError};

mod source;
mod stream;

pub use source::BytesSource;
pub use source::Source;
pub use source::SourceOutcome;
pub use stream::Stream;

const DEFAULT_WORKSPACE_SIZE: usize = 65536;

/// Smallest output ring that fits one chunk-size line, one body byte, the
/// chunk terminator and the last-chunk marker.
const RING_MIN: usize = CHUNK_HEADER_LEN + 1 + CRLF_LEN + LAST_CHUNK_LEN;

/// Compressed modes additionally reserve room for a synchronous flush marker.
const COMPRESSED_RING_MIN: usize = CHUNKED_OVERHEAD + SYNC_FLUSH_OVERHEAD + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Unset,
    Empty,
    Buffers,
    Source,
    Stream,
}

/// Serializes one HTTP/1.1 message at a time into ready-to-send byte ranges.
///
/// See the [module documentation](self) for the session protocol.
pub struct Serializer {
    ws: Workspace,
    style: Style,
    /// Output staging: framed bytes ready for transmission.
    tmp0: RingBuffer,
    /// Compression input staging for the source / stream styles.
    tmp1: RingBuffer,
    header: Bytes,
    header_pos: usize,
    /// Pre-rendered chunk-size line for the buffers style (front of the
    /// workspace), and how much of it has been consumed.
    prologue_len: usize,
    prologue_pos: usize,
    /// Trailing literal for the empty / buffers styles.
    epilogue: &'static [u8],
    epilogue_pos: usize,
    bufs: Vec<Bytes>,
    buf_idx: usize,
    source: Option<Box<dyn Source>>,
    filter: Option<Box<dyn Filter>>,
    is_chunked: bool,
    is_compressed: bool,
    is_expect_continue: bool,
    /// Upstream may still yield body bytes.
    more: bool,
    filter_done: bool,
    /// The filter may hold coded bytes it could not fit in the last window.
    filter_pending: bool,
    is_done: bool,
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer {
    /// A serializer with the default 64 KiB workspace.
    pub fn new() -> Self {
        Self::with_workspace(DEFAULT_WORKSPACE_SIZE)
    }

    /// A serializer with a workspace of `workspace_size` bytes.
    ///
    /// The workspace is allocated once, here; `start_*` fails with
    /// [`SerializeError::WorkspaceExhausted`] if it cannot hold the staging
    /// buffers the selected mode needs.
    pub fn with_workspace(workspace_size: usize) -> Self {
        Serializer {
            ws: Workspace::new(workspace_size),
            style: Style::Unset,
            tmp0: RingBuffer::new(0),
            tmp1: RingBuffer::new(0),
            header: Bytes::new(),
            header_pos: 0,
            prologue_len: 0,
            prologue_pos: 0,
            epilogue: b"",
            epilogue_pos: 0,
            bufs: Vec::new(),
            buf_idx: 0,
            source: None,
            filter: None,
            is_chunked: false,
            is_compressed: false,
            is_expect_continue: false,
            more: false,
            filter_done: false,
            filter_pending: false,
            is_done: false,
        }
    }

    /// Abandon the current message and release all workspace carves.
    pub fn reset(&mut self) {
        self.ws.clear();
        self.style = Style::Unset;
        self.tmp0 = RingBuffer::new(0);
        self.tmp1 = RingBuffer::new(0);
        self.header = Bytes::new();
        self.header_pos = 0;
        self.prologue_len = 0;
        self.prologue_pos = 0;
        self.epilogue = b"";
        self.epilogue_pos = 0;
        self.bufs.clear();
        self.buf_idx = 0;
        self.source = None;
        self.filter = None;
        self.is_chunked = false;
        self.is_compressed = false;
        self.is_expect_continue = false;
        self.more = false;
        self.filter_done = false;
        self.filter_pending = false;
        self.is_done = false;
    }

    /// The current message has been fully serialized and consumed.
    pub fn is_done(&self) -> bool {
        self.is_done
    }

    fn start_init(&mut self, head: &MessageHead) {
        self.reset();
        self.header = head.bytes().clone();
        self.is_expect_continue = head.is_expect_continue();
        let transfer = head.transfer();
        self.is_chunked = transfer.chunked;
        match transfer.coding {
            ContentCoding::Identity => {}
            ContentCoding::Deflate => {
                self.is_compressed = true;
                self.filter = Some(make_deflate_filter());
            }
            ContentCoding::Gzip => {
                self.is_compressed = true;
                self.filter = Some(make_gzip_filter());
            }
        }
        trace!(
            chunked = self.is_chunked,
            compressed = self.is_compressed,
            expect_continue = self.is_expect_continue,
            "starting message"
        );
    }

    fn init_rings(&mut self) -> Result<(), SerializeError> {
        if self.is_compressed {
            let front = self.ws.len() / 2;
            ensure!(front > 0, SerializeError::WorkspaceExhausted);
            self.ws.reserve_front(front);
            self.tmp1 = RingBuffer::new(self.ws.front_len());
            ensure!(self.ws.back_len() >= COMPRESSED_RING_MIN, SerializeError::WorkspaceExhausted);
            self.tmp0 = RingBuffer::new(self.ws.back_len());
        } else {
            ensure!(self.ws.back_len() >= RING_MIN, SerializeError::WorkspaceExhausted);
            self.tmp0 = RingBuffer::new(self.ws.back_len());
        }
        self.more = true;
        Ok(())
    }

    /// Start a message with no body.
    pub fn start_empty(&mut self, head: &MessageHead) -> Result<(), SerializeError> {
        self.start_init(head);
        // No body bytes exist to run through a content-coding.
        self.is_compressed = false;
        self.filter = None;
        if self.is_chunked {
            self.epilogue = chunk::LAST_CHUNK;
        }
        self.style = Style::Empty;
        Ok(())
    }

    /// Start a message whose body is an ordered sequence of caller-owned
    /// byte ranges.
    ///
    /// Uncompressed, the ranges are exposed in the output view verbatim,
    /// zero-copy; chunked framing wraps the whole body in a single chunk
    /// since the total length is known up front. Compressed, the ranges
    /// become the input side of the compression pipeline.
    ///
    /// The ranges must not be mutated until the message is done.
    pub fn start_buffers(&mut self, head: &MessageHead, bufs: Vec<Bytes>) -> Result<(), SerializeError> {
        self.start_init(head);
        let total: usize = bufs.iter().map(Bytes::len).sum();

        if self.is_compressed {
            ensure!(self.ws.back_len() >= COMPRESSED_RING_MIN, SerializeError::WorkspaceExhausted);
            self.tmp0 = RingBuffer::new(self.ws.back_len());
            self.more = true;
        } else if self.is_chunked {
            if total == 0 {
                // A zero-length chunk-size line would read as the terminator;
                // frame like the empty style instead.
                self.epilogue = chunk::LAST_CHUNK;
                self.style = Style::Buffers;
                return Ok(());
            }
            ensure!(self.ws.reserve_front(CHUNK_HEADER_LEN), SerializeError::WorkspaceExhausted);
            chunk::write_size_line(self.ws.front_mut(), total);
            self.prologue_len = CHUNK_HEADER_LEN;
            self.epilogue = chunk::CRLF_LAST_CHUNK;
        }

        self.bufs = bufs;
        self.style = Style::Buffers;
        Ok(())
    }

    /// Start a message whose body is pulled from `source`.
    pub fn start_source<S>(&mut self, head: &MessageHead, source: S) -> Result<(), SerializeError>
    where
        S: Source + 'static,
    {
        self.start_init(head);
        self.init_rings()?;
        self.source = Some(Box::new(source));
        self.style = Style::Source;
        Ok(())
    }

    /// Start a message whose body the caller pushes through the returned
    /// [`Stream`] handle.
    ///
    /// The handle borrows the serializer; drop it to run `prepare` /
    /// `consume`, and call [`Serializer::stream`] to push again.
    pub fn start_stream(&mut self, head: &MessageHead) -> Result<Stream<'_>, SerializeError> {
        self.start_init(head);
        self.init_rings()?;
        self.style = Style::Stream;
        Ok(Stream::new(self))
    }

    /// Re-acquire the push handle for a message started with `start_stream`.
    ///
    /// # Panics
    ///
    /// Panics if the current message was not started with `start_stream`.
    pub fn stream(&mut self) -> Stream<'_> {
        assert!(self.style == Style::Stream, "stream() requires a message started with start_stream");
        Stream::new(self)
    }

    /// Produce the next batch of output as a flat view of byte ranges.
    ///
    /// Sentinel results ([`SerializeError::Expect100Continue`],
    /// [`SerializeError::NeedData`]) are part of normal operation; source and
    /// filter failures are forwarded unchanged. With no intervening
    /// `consume`, repeated calls in non-compressed modes yield byte-identical
    /// views.
    ///
    /// # Panics
    ///
    /// Panics if the message is already done, if no `start_*` preceded this
    /// call, or, in compressed mode, if the previous batch was not fully
    /// consumed.
    pub fn prepare(&mut self) -> Result<BufferSlices<'_>, SerializeError> {
        assert!(!self.is_done, "prepare called after the message completed");
        assert!(self.style != Style::Unset, "start_* must be called before prepare");

        if self.is_expect_continue {
            if self.header_pos < self.header.len() {
                let mut view = BufferSlices::new();
                view.push(&self.header[self.header_pos..]);
                return Ok(view);
            }
            // The header is out; pause until the caller has seen the interim
            // response. The next prepare proceeds with the body.
            self.is_expect_continue = false;
            trace!("header consumed, pausing for 100-continue");
            return Err(SerializeError::Expect100Continue);
        }

        if self.is_compressed {
            return self.prepare_compressed();
        }

        match self.style {
            Style::Empty | Style::Buffers => Ok(self.static_view()),
            Style::Source => self.prepare_source(),
            Style::Stream => {
                if self.tmp0.is_empty() && self.more {
                    return Err(SerializeError::NeedData);
                }
                Ok(self.ring_view())
            }
            Style::Unset => unreachable!(),
        }
    }

    /// Reclaim the first `n` bytes of the most recent view after the
    /// transport transmitted them.
    ///
    /// # Panics
    ///
    /// Panics if the message is already done, if `n` exceeds the prepared
    /// output, or if `n` reaches past the header while expect-continue is
    /// pending.
    pub fn consume(&mut self, n: usize) {
        assert!(!self.is_done, "consume called after the message completed");
        assert!(self.style != Style::Unset, "start_* must be called before consume");

        let header_rem = self.header.len() - self.header_pos;
        if self.is_expect_continue {
            assert!(n <= header_rem, "cannot consume past the header while expect-continue is pending");
            self.header_pos += n;
            return;
        }

        let mut n = n;
        let take = n.min(header_rem);
        self.header_pos += take;
        n -= take;

        match self.style {
            Style::Empty | Style::Buffers if !self.is_compressed => {
                n = self.advance_prologue(n);
                n = self.advance_bufs(n);
                n = self.advance_epilogue(n);
                assert!(n == 0, "consume exceeds the prepared output");
                if self.static_remaining() == 0 {
                    self.is_done = true;
                }
            }
            _ => {
                assert!(n <= self.tmp0.len(), "consume exceeds the prepared output");
                self.tmp0.consume(n);
                let drained = self.tmp0.is_empty() && self.header_pos == self.header.len();
                let finished = if self.is_compressed { self.filter_done } else { !self.more };
                if drained && finished {
                    self.is_done = true;
                }
            }
        }
    }

    fn prepare_source(&mut self) -> Result<BufferSlices<'_>, SerializeError> {
        // Refill only once the ring is drained: views stay stable across
        // repeated prepares, and a drained ring is contiguous.
        if self.more && self.tmp0.is_empty() {
            let source = self.source.as_mut().expect("source style carries a source");
            let region = self.ws.back_mut();
            if !self.is_chunked {
                let dest = self.tmp0.tail_mut(&mut *region, self.tmp0.contiguous_free());
                let outcome = source.read(dest)?;
                self.tmp0.commit(outcome.bytes);
                self.more = !outcome.finished;
            } else {
                let span = self.tmp0.tail_mut(&mut *region, self.tmp0.capacity() - CRLF_LEN - LAST_CHUNK_LEN);
                let (line, payload) = span.split_at_mut(CHUNK_HEADER_LEN);
                let outcome = source.read(payload)?;
                if outcome.bytes > 0 {
                    chunk::write_size_line(line, outcome.bytes);
                    self.tmp0.commit(CHUNK_HEADER_LEN + outcome.bytes);
                    self.tmp0.extend_from_slice(region, chunk::CRLF);
                }
                if outcome.finished {
                    self.tmp0.extend_from_slice(region, chunk::LAST_CHUNK);
                    self.more = false;
                }
            }
        }
        Ok(self.ring_view())
    }

    fn prepare_compressed(&mut self) -> Result<BufferSlices<'_>, SerializeError> {
        assert!(self.tmp0.is_empty(), "compressed mode requires draining the output between prepare calls");

        if self.style == Style::Source && self.more && self.tmp1.is_empty() {
            let source = self.source.as_mut().expect("source style carries a source");
            let region = self.ws.front_mut();
            let dest = self.tmp1.tail_mut(&mut *region, self.tmp1.contiguous_free());
            let outcome = source.read(dest)?;
            self.tmp1.commit(outcome.bytes);
            self.more = !outcome.finished;
        }

        if self.style == Style::Stream && self.more && self.tmp1.is_empty() && !self.filter_pending {
            return Err(SerializeError::NeedData);
        }

        let (front, back) = self.ws.split_mut();
        let cap = self.tmp0.capacity();
        let (data_off, window_end) =
            if self.is_chunked { (CHUNK_HEADER_LEN, cap - CRLF_LEN - LAST_CHUNK_LEN) } else { (0, cap) };

        let filter = self.filter.as_mut().expect("compressed mode carries a filter");
        let mut written = 0usize;
        loop {
            if data_off + written >= window_end {
                // Out of window; the filter may still hold coded bytes.
                self.filter_pending = true;
                break;
            }

            if self.style == Style::Buffers {
                while self.buf_idx < self.bufs.len() && self.bufs[self.buf_idx].is_empty() {
                    self.buf_idx += 1;
                }
                if self.buf_idx == self.bufs.len() {
                    self.more = false;
                }
            }

            let input: &[u8] = match self.style {
                Style::Buffers => self.bufs.get(self.buf_idx).map(|b| &b[..]).unwrap_or(&[]),
                _ => {
                    let (a, b) = self.tmp1.data(&*front);
                    if a.is_empty() {
                        b
                    } else {
                        a
                    }
                }
            };

            if input.is_empty() && self.more && !self.filter_pending {
                // Nothing to feed and nothing buffered inside the filter.
                break;
            }

            let out_span = &mut back[data_off + written..window_end];
            let outcome = filter.process(out_span, input, self.more)?;
            if outcome.finished {
                self.filter_done = true;
            }

            match self.style {
                Style::Buffers => {
                    if outcome.consumed > 0 {
                        let payload = &mut self.bufs[self.buf_idx];
                        payload.advance(outcome.consumed);
                        if payload.is_empty() {
                            self.buf_idx += 1;
                        }
                    }
                }
                _ => self.tmp1.consume(outcome.consumed),
            }

            written += outcome.written;
            if outcome.finished || outcome.written == 0 {
                self.filter_pending = false;
                break;
            }
        }

        if self.is_chunked {
            if written > 0 {
                chunk::write_size_line(&mut back[..CHUNK_HEADER_LEN], written);
                self.tmp0.commit(CHUNK_HEADER_LEN + written);
                self.tmp0.extend_from_slice(back, chunk::CRLF);
            }
            if self.filter_done {
                self.tmp0.extend_from_slice(back, chunk::LAST_CHUNK);
            }
        } else if written > 0 {
            self.tmp0.commit(written);
        }
        trace!(written, finished = self.filter_done, "compressed prepare");

        Ok(self.ring_view())
    }

    fn static_view(&self) -> BufferSlices<'_> {
        let mut view = BufferSlices::new();
        view.push(&self.header[self.header_pos..]);
        if self.prologue_len > 0 {
            view.push(&self.ws.front()[self.prologue_pos..self.prologue_len]);
        }
        for payload in &self.bufs[self.buf_idx..] {
            if view.is_full() {
                return view;
            }
            view.push(payload);
        }
        view.push(&self.epilogue[self.epilogue_pos..]);
        view
    }

    fn ring_view(&self) -> BufferSlices<'_> {
        let mut view = BufferSlices::new();
        view.push(&self.header[self.header_pos..]);
        let (a, b) = self.tmp0.data(self.ws.back());
        view.push(a);
        view.push(b);
        view
    }

    fn advance_prologue(&mut self, n: usize) -> usize {
        let take = n.min(self.prologue_len - self.prologue_pos);
        self.prologue_pos += take;
        n - take
    }

    fn advance_bufs(&mut self, mut n: usize) -> usize {
        while n > 0 && self.buf_idx < self.bufs.len() {
            let payload = &mut self.bufs[self.buf_idx];
            if payload.is_empty() {
                self.buf_idx += 1;
                continue;
            }
            let take = n.min(payload.len());
            payload.advance(take);
            n -= take;
            if payload.is_empty() {
                self.buf_idx += 1;
            }
        }
        n
    }

    fn advance_epilogue(&mut self, n: usize) -> usize {
        let take = n.min(self.epilogue.len() - self.epilogue_pos);
        self.epilogue_pos += take;
        n - take
    }

    fn static_remaining(&self) -> usize {
        (self.header.len() - self.header_pos)
            + (self.prologue_len - self.prologue_pos)
            + self.bufs[self.buf_idx..].iter().map(Bytes::len).sum::<usize>()
            + (self.epilogue.len() - self.epilogue_pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TransferEncoding;
    use std::io::Read;

    const PLAIN_HEAD: &[u8] = b"HTTP/1.1 200 OK\r\n\r\n";
    const CHUNKED_HEAD: &[u8] = b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n";

    fn head(bytes: &'static [u8], transfer: TransferEncoding) -> MessageHead {
        MessageHead::new(Bytes::from_static(bytes), transfer, false)
    }

    fn deflate_head(chunked: bool) -> MessageHead {
        head(
            b"HTTP/1.1 200 OK\r\ncontent-encoding: deflate\r\n\r\n",
            TransferEncoding { chunked, coding: ContentCoding::Deflate },
        )
    }

    /// Drain a whole session, consuming everything each cycle.
    fn drain(sr: &mut Serializer) -> Vec<u8> {
        let mut wire = Vec::new();
        while !sr.is_done() {
            let view = sr.prepare().unwrap();
            let batch = view.concat();
            let n = batch.len();
            wire.extend_from_slice(&batch);
            sr.consume(n);
        }
        wire
    }

    /// Decode a chunked body; returns the payload and asserts proper
    /// termination.
    fn decode_chunked(mut data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let pos = data.windows(2).position(|w| w == b"\r\n").expect("size line");
            let size = usize::from_str_radix(std::str::from_utf8(&data[..pos]).unwrap(), 16).unwrap();
            data = &data[pos + 2..];
            if size == 0 {
                assert_eq!(data, b"\r\n", "terminator must end the stream");
                return out;
            }
            out.extend_from_slice(&data[..size]);
            assert_eq!(&data[size..size + 2], b"\r\n");
            data = &data[size + 2..];
        }
    }

    #[test]
    fn empty_message_is_header_only() {
        let mut sr = Serializer::new();
        sr.start_empty(&head(b"HTTP/1.1 204 No Content\r\n\r\n", TransferEncoding::IDENTITY)).unwrap();

        let view = sr.prepare().unwrap();
        assert_eq!(view.len(), 1);
        assert_eq!(view.concat(), b"HTTP/1.1 204 No Content\r\n\r\n");
        let n = view.total_len();
        sr.consume(n);
        assert!(sr.is_done());
    }

    #[test]
    fn empty_chunked_appends_last_chunk() {
        let mut sr = Serializer::new();
        sr.start_empty(&head(CHUNKED_HEAD, TransferEncoding::CHUNKED)).unwrap();
        let wire = drain(&mut sr);
        let body = &wire[CHUNKED_HEAD.len()..];
        assert_eq!(body, b"0\r\n\r\n");
    }

    #[test]
    fn buffers_identity_is_verbatim() {
        let mut sr = Serializer::new();
        let bufs = vec![Bytes::from_static(b"hello "), Bytes::from_static(b"world")];
        sr.start_buffers(&head(PLAIN_HEAD, TransferEncoding::IDENTITY), bufs).unwrap();

        let view = sr.prepare().unwrap();
        assert_eq!(view.len(), 3); // header + two user ranges
        let wire = drain(&mut sr);
        assert_eq!(&wire[PLAIN_HEAD.len()..], b"hello world");
    }

    #[test]
    fn buffers_chunked_single_chunk_framing() {
        let mut sr = Serializer::new();
        sr.start_buffers(&head(CHUNKED_HEAD, TransferEncoding::CHUNKED), vec![Bytes::from_static(b"hello world")])
            .unwrap();

        let wire = drain(&mut sr);
        let mut expected = CHUNKED_HEAD.to_vec();
        expected.extend_from_slice(b"000000000000000B\r\nhello world\r\n0\r\n\r\n");
        assert_eq!(wire, expected);
    }

    #[test]
    fn buffers_chunked_partial_consumes() {
        let mut sr = Serializer::new();
        sr.start_buffers(&head(CHUNKED_HEAD, TransferEncoding::CHUNKED), vec![Bytes::from_static(b"hello world")])
            .unwrap();

        // Trickle three bytes at a time; the views must re-expose the rest.
        let mut wire = Vec::new();
        while !sr.is_done() {
            let view = sr.prepare().unwrap();
            let batch = view.concat();
            let n = batch.len().min(3);
            wire.extend_from_slice(&batch[..n]);
            sr.consume(n);
        }
        assert_eq!(decode_chunked(&wire[CHUNKED_HEAD.len()..]), b"hello world");
    }

    #[test]
    fn buffers_chunked_zero_total_degenerates_to_empty() {
        let mut sr = Serializer::new();
        sr.start_buffers(&head(CHUNKED_HEAD, TransferEncoding::CHUNKED), vec![Bytes::new(), Bytes::new()])
            .unwrap();
        let wire = drain(&mut sr);
        assert_eq!(&wire[CHUNKED_HEAD.len()..], b"0\r\n\r\n");
    }

    #[test]
    fn prepare_is_idempotent_without_consume() {
        let mut sr = Serializer::new();
        sr.start_buffers(&head(CHUNKED_HEAD, TransferEncoding::CHUNKED), vec![Bytes::from_static(b"stable")])
            .unwrap();
        let first = sr.prepare().unwrap().concat();
        let second = sr.prepare().unwrap().concat();
        assert_eq!(first, second);
    }

    #[test]
    fn source_identity_unchunked() {
        let payload = Bytes::from(vec![b'x'; 10_000]);
        let mut sr = Serializer::with_workspace(1024);
        sr.start_source(&head(PLAIN_HEAD, TransferEncoding::IDENTITY), BytesSource::new(payload.clone()))
            .unwrap();
        let wire = drain(&mut sr);
        assert_eq!(&wire[..PLAIN_HEAD.len()], PLAIN_HEAD);
        assert_eq!(&wire[PLAIN_HEAD.len()..], &payload[..]);
    }

    #[test]
    fn source_chunked_multiple_cycles() {
        let payload = Bytes::from(vec![b'a'; 9_000]);
        let mut sr = Serializer::with_workspace(4096);
        sr.start_source(&head(CHUNKED_HEAD, TransferEncoding::CHUNKED), BytesSource::new(payload.clone()))
            .unwrap();
        let wire = drain(&mut sr);
        assert!(wire.ends_with(b"0\r\n\r\n"));
        assert_eq!(decode_chunked(&wire[CHUNKED_HEAD.len()..]), &payload[..]);
    }

    #[test]
    fn source_zero_read_requires_redrive() {
        /// Yields nothing on the first read, finishes on the second.
        struct Stutter {
            calls: usize,
        }
        impl Source for Stutter {
            fn read(&mut self, dest: &mut [u8]) -> std::io::Result<SourceOutcome> {
                self.calls += 1;
                if self.calls == 1 {
                    Ok(SourceOutcome::partial(0))
                } else {
                    dest[..4].copy_from_slice(b"data");
                    Ok(SourceOutcome::finished(4))
                }
            }
        }

        let mut sr = Serializer::new();
        sr.start_source(&head(CHUNKED_HEAD, TransferEncoding::CHUNKED), Stutter { calls: 0 }).unwrap();

        let first = sr.prepare().unwrap();
        assert_eq!(first.concat(), CHUNKED_HEAD); // no body progress yet
        let n = first.total_len();
        sr.consume(n);

        let wire = drain(&mut sr);
        assert_eq!(decode_chunked(&wire), b"data");
    }

    #[test]
    fn source_with_empty_body_completes() {
        let mut sr = Serializer::new();
        sr.start_source(&head(PLAIN_HEAD, TransferEncoding::IDENTITY), BytesSource::new(Bytes::new())).unwrap();
        let wire = drain(&mut sr);
        assert_eq!(wire, PLAIN_HEAD);
    }

    #[test]
    fn buffers_with_many_ranges_paginate_through_the_view() {
        let bufs: Vec<Bytes> = (0..20).map(|i| Bytes::from(vec![b'a' + i as u8; 3])).collect();
        let flat: Vec<u8> = bufs.iter().flat_map(|b| b.to_vec()).collect();

        let mut sr = Serializer::new();
        sr.start_buffers(&head(PLAIN_HEAD, TransferEncoding::IDENTITY), bufs).unwrap();

        // More ranges than view slots: the first view is capped and later
        // prepares expose the rest.
        let first = sr.prepare().unwrap();
        assert_eq!(first.len(), crate::buffer::MAX_SLICES);
        let wire = drain(&mut sr);
        assert_eq!(&wire[PLAIN_HEAD.len()..], &flat[..]);
    }

    #[test]
    fn source_error_is_forwarded() {
        struct Failing;
        impl Source for Failing {
            fn read(&mut self, _dest: &mut [u8]) -> std::io::Result<SourceOutcome> {
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "upstream gone"))
            }
        }

        let mut sr = Serializer::new();
        sr.start_source(&head(PLAIN_HEAD, TransferEncoding::IDENTITY), Failing).unwrap();
        match sr.prepare() {
            Err(SerializeError::Body { source }) => {
                assert_eq!(source.kind(), std::io::ErrorKind::BrokenPipe);
            }
            other => panic!("expected forwarded source error, got {other:?}"),
        }
    }

    #[test]
    fn buffers_deflate_chunked_round_trip() {
        let payload = Bytes::from(vec![b'z'; 20_000]);
        let mut sr = Serializer::with_workspace(2048);
        sr.start_buffers(&deflate_head(true), vec![payload.clone()]).unwrap();

        let wire = drain(&mut sr);
        let body = decode_chunked(&wire[deflate_head(true).bytes().len()..]);
        let mut decoded = Vec::new();
        flate2::read::ZlibDecoder::new(&body[..]).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, &payload[..]);
    }

    #[test]
    fn buffers_deflate_unchunked_round_trip() {
        let payload = Bytes::from_static(b"compress me, compress me, compress me");
        let mut sr = Serializer::new();
        sr.start_buffers(&deflate_head(false), vec![payload.clone()]).unwrap();

        let wire = drain(&mut sr);
        let body = &wire[deflate_head(false).bytes().len()..];
        let mut decoded = Vec::new();
        flate2::read::ZlibDecoder::new(body).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, &payload[..]);
    }

    #[test]
    fn source_gzip_chunked_round_trip() {
        let payload = Bytes::from((0..50_000u32).map(|i| (i % 256) as u8).collect::<Vec<u8>>());
        let gzip_head = head(
            b"HTTP/1.1 200 OK\r\ncontent-encoding: gzip\r\ntransfer-encoding: chunked\r\n\r\n",
            TransferEncoding { chunked: true, coding: ContentCoding::Gzip },
        );
        let mut sr = Serializer::with_workspace(4096);
        sr.start_source(&gzip_head, BytesSource::new(payload.clone())).unwrap();

        let wire = drain(&mut sr);
        let body = decode_chunked(&wire[gzip_head.bytes().len()..]);
        let mut decoded = Vec::new();
        flate2::read::GzDecoder::new(&body[..]).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, &payload[..]);
    }

    #[test]
    fn expect_continue_pauses_after_header() {
        let head = MessageHead::new(
            Bytes::from_static(b"POST /upload HTTP/1.1\r\nexpect: 100-continue\r\n\r\n"),
            TransferEncoding::CHUNKED,
            true,
        );
        let mut sr = Serializer::new();
        sr.start_source(&head, BytesSource::new(Bytes::from_static(b"body"))).unwrap();

        // Only the header until it has been consumed.
        let view = sr.prepare().unwrap();
        assert_eq!(view.concat(), &head.bytes()[..]);
        let n = view.total_len();
        sr.consume(n);

        // One sentinel, then body delivery.
        assert!(matches!(sr.prepare(), Err(SerializeError::Expect100Continue)));
        let wire = drain(&mut sr);
        assert_eq!(decode_chunked(&wire), b"body");
    }

    #[test]
    #[should_panic(expected = "cannot consume past the header")]
    fn expect_continue_rejects_consuming_past_header() {
        let head = MessageHead::new(Bytes::from_static(b"POST / HTTP/1.1\r\n\r\n"), TransferEncoding::IDENTITY, true);
        let mut sr = Serializer::new();
        sr.start_source(&head, BytesSource::new(Bytes::from_static(b"body"))).unwrap();
        sr.consume(head.bytes().len() + 1);
    }

    #[test]
    fn workspace_below_lower_bound() {
        let mut sr = Serializer::with_workspace(RING_MIN - 1);
        let result = sr.start_source(&head(CHUNKED_HEAD, TransferEncoding::CHUNKED), BytesSource::new(Bytes::new()));
        assert!(matches!(result, Err(SerializeError::WorkspaceExhausted)));

        let mut sr = Serializer::with_workspace(COMPRESSED_RING_MIN); // halved for tmp1
        let result = sr.start_source(&deflate_head(true), BytesSource::new(Bytes::new()));
        assert!(matches!(result, Err(SerializeError::WorkspaceExhausted)));
    }

    #[test]
    #[should_panic(expected = "after the message completed")]
    fn prepare_after_done_panics() {
        let mut sr = Serializer::new();
        sr.start_empty(&head(PLAIN_HEAD, TransferEncoding::IDENTITY)).unwrap();
        let n = sr.prepare().unwrap().total_len();
        sr.consume(n);
        assert!(sr.is_done());
        let _ = sr.prepare();
    }

    #[test]
    #[should_panic(expected = "requires draining")]
    fn compressed_prepare_without_drain_panics() {
        let mut sr = Serializer::new();
        sr.start_buffers(&deflate_head(true), vec![Bytes::from_static(b"payload")]).unwrap();
        let _ = sr.prepare().unwrap();
        let _ = sr.prepare();
    }

    #[test]
    fn body_exactly_filling_ring() {
        // Identity unchunked: the ring is filled to capacity in one read.
        let cap = 256;
        let payload = Bytes::from(vec![b'f'; cap]);
        let mut sr = Serializer::with_workspace(cap);
        sr.start_source(&head(PLAIN_HEAD, TransferEncoding::IDENTITY), BytesSource::new(payload.clone()))
            .unwrap();
        let wire = drain(&mut sr);
        assert_eq!(&wire[PLAIN_HEAD.len()..], &payload[..]);
    }

    #[test]
    fn serializer_reuse_across_messages() {
        let mut sr = Serializer::new();

        sr.start_buffers(&head(CHUNKED_HEAD, TransferEncoding::CHUNKED), vec![Bytes::from_static(b"first")])
            .unwrap();
        let wire = drain(&mut sr);
        assert_eq!(decode_chunked(&wire[CHUNKED_HEAD.len()..]), b"first");

        sr.start_source(&head(PLAIN_HEAD, TransferEncoding::IDENTITY), BytesSource::new(Bytes::from_static(b"second")))
            .unwrap();
        let wire = drain(&mut sr);
        assert_eq!(&wire[PLAIN_HEAD.len()..], b"second");
    }

    #[test]
    fn mass_conservation_over_session() {
        let payload = Bytes::from(vec![b'm'; 12_345]);
        let mut sr = Serializer::with_workspace(1000);
        sr.start_source(&head(CHUNKED_HEAD, TransferEncoding::CHUNKED), BytesSource::new(payload)).unwrap();

        let mut consumed_total = 0usize;
        let mut wire = Vec::new();
        while !sr.is_done() {
            let view = sr.prepare().unwrap();
            let batch = view.concat();
            // Uneven consumption: take at most 777 bytes per cycle.
            let n = batch.len().min(777);
            wire.extend_from_slice(&batch[..n]);
            consumed_total += n;
            sr.consume(n);
        }
        assert_eq!(consumed_total, wire.len());
        assert_eq!(decode_chunked(&wire[CHUNKED_HEAD.len()..]).len(), 12_345);
    }
}
