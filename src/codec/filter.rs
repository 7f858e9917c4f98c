//! Content-coding filters driven by the serializer's compression pipeline.
//!
//! A [`Filter`] transforms a byte stream buffer-to-buffer: the serializer hands
//! it an output window carved from the staging ring, whatever input is
//! currently available, and a flag saying whether more input may follow. While
//! more input remains the filters flush synchronously, so every drive with
//! pending input makes visible progress, which the one-chunk-per-
//! `prepare` framing relies on. Once the caller signals end of input the
//! stream is finished and the filter reports `finished` when the final bytes
//! (including the gzip trailer) have been written.

use std::io;

use flate2::{Compress, Compression, Crc, FlushCompress, Status};
use tracing::trace;

/// Worst-case bytes a synchronous flush appends beyond the compressed data
/// (the zlib empty stored-block marker).
pub(crate) const SYNC_FLUSH_OVERHEAD: usize = 6;

/// Result of one [`Filter::process`] drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Bytes consumed from the input slice.
    pub consumed: usize,
    /// Bytes written to the output window.
    pub written: usize,
    /// The coded stream is complete; no further output will be produced.
    pub finished: bool,
}

/// A streaming content-coding transform.
pub trait Filter {
    /// Drive the transform: consume from `input`, write into `out`.
    ///
    /// `more_input` tells the filter whether further input may follow. When it
    /// is `false` the filter finishes the stream, possibly across several calls
    /// if `out` is too small for the remaining bytes.
    fn process(&mut self, out: &mut [u8], input: &[u8], more_input: bool) -> io::Result<ProcessOutcome>;
}

/// A filter for the `deflate` content-coding (RFC 1950 zlib container).
pub fn make_deflate_filter() -> Box<dyn Filter> {
    Box::new(DeflateFilter::new())
}

/// A filter for the `gzip` content-coding (RFC 1952 container).
pub fn make_gzip_filter() -> Box<dyn Filter> {
    Box::new(GzipFilter::new())
}

/// `deflate` content-coding: a zlib-wrapped deflate stream.
pub struct DeflateFilter {
    compress: Compress,
}

impl DeflateFilter {
    pub fn new() -> Self {
        DeflateFilter { compress: Compress::new(Compression::default(), true) }
    }
}

impl Default for DeflateFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for DeflateFilter {
    fn process(&mut self, out: &mut [u8], input: &[u8], more_input: bool) -> io::Result<ProcessOutcome> {
        let flush = if more_input { FlushCompress::Sync } else { FlushCompress::Finish };
        let (consumed, written, status) = drive(&mut self.compress, out, input, flush)?;
        trace!(consumed, written, ?status, "deflate filter drive");
        Ok(ProcessOutcome { consumed, written, finished: status == Status::StreamEnd })
    }
}

const GZIP_HEADER: [u8; 10] = [0x1f, 0x8b, 0x08, 0, 0, 0, 0, 0, 0, 0xff];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GzipStage {
    Header,
    Body,
    Trailer,
    Done,
}

/// `gzip` content-coding: the 10-byte member header, a raw deflate stream, and
/// the CRC32 / input-size trailer.
pub struct GzipFilter {
    compress: Compress,
    crc: Crc,
    stage: GzipStage,
    header_pos: usize,
    trailer: [u8; 8],
    trailer_pos: usize,
}

impl GzipFilter {
    pub fn new() -> Self {
        GzipFilter {
            compress: Compress::new(Compression::default(), false),
            crc: Crc::new(),
            stage: GzipStage::Header,
            header_pos: 0,
            trailer: [0u8; 8],
            trailer_pos: 0,
        }
    }
}

impl Default for GzipFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Filter for GzipFilter {
    fn process(&mut self, out: &mut [u8], input: &[u8], more_input: bool) -> io::Result<ProcessOutcome> {
        let mut written = 0;
        let mut consumed = 0;

        if self.stage == GzipStage::Header {
            let n = out.len().min(GZIP_HEADER.len() - self.header_pos);
            out[..n].copy_from_slice(&GZIP_HEADER[self.header_pos..self.header_pos + n]);
            self.header_pos += n;
            written += n;
            if self.header_pos < GZIP_HEADER.len() {
                return Ok(ProcessOutcome { consumed: 0, written, finished: false });
            }
            self.stage = GzipStage::Body;
        }

        if self.stage == GzipStage::Body {
            let flush = if more_input { FlushCompress::Sync } else { FlushCompress::Finish };
            let (n_in, n_out, status) = drive(&mut self.compress, &mut out[written..], input, flush)?;
            self.crc.update(&input[..n_in]);
            consumed = n_in;
            written += n_out;
            trace!(consumed, written, ?status, "gzip filter drive");
            if status == Status::StreamEnd {
                self.trailer[..4].copy_from_slice(&self.crc.sum().to_le_bytes());
                self.trailer[4..].copy_from_slice(&self.crc.amount().to_le_bytes());
                self.stage = GzipStage::Trailer;
            }
        }

        if self.stage == GzipStage::Trailer {
            let n = (out.len() - written).min(self.trailer.len() - self.trailer_pos);
            out[written..written + n].copy_from_slice(&self.trailer[self.trailer_pos..self.trailer_pos + n]);
            self.trailer_pos += n;
            written += n;
            if self.trailer_pos == self.trailer.len() {
                self.stage = GzipStage::Done;
            }
        }

        Ok(ProcessOutcome { consumed, written, finished: self.stage == GzipStage::Done })
    }
}

/// One `Compress::compress` call, reported as (consumed, written, status).
/// `BufError` means no forward progress was possible and is not a failure.
fn drive(
    compress: &mut Compress,
    out: &mut [u8],
    input: &[u8],
    flush: FlushCompress,
) -> io::Result<(usize, usize, Status)> {
    let before_in = compress.total_in();
    let before_out = compress.total_out();
    let status = compress
        .compress(input, out, flush)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    let consumed = (compress.total_in() - before_in) as usize;
    let written = (compress.total_out() - before_out) as usize;
    Ok((consumed, written, status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    /// Push `input` through the filter in bounded output windows, the way the
    /// serializer does, and collect everything it emits.
    fn run_filter(filter: &mut dyn Filter, input: &[u8], window: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; window];
        let mut pos = 0;
        loop {
            let more = pos < input.len();
            let outcome = filter.process(&mut buf, &input[pos..], more).unwrap();
            pos += outcome.consumed;
            out.extend_from_slice(&buf[..outcome.written]);
            if outcome.finished {
                break;
            }
        }
        out
    }

    #[test]
    fn deflate_round_trip() {
        let input = b"hello world, hello world, hello world".repeat(20);
        let mut filter = DeflateFilter::new();
        let coded = run_filter(&mut filter, &input, 64);

        let mut decoded = Vec::new();
        flate2::read::ZlibDecoder::new(&coded[..]).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn gzip_round_trip() {
        let input: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let mut filter = GzipFilter::new();
        let coded = run_filter(&mut filter, &input, 128);

        assert_eq!(&coded[..3], &[0x1f, 0x8b, 0x08]);
        let mut decoded = Vec::new();
        flate2::read::GzDecoder::new(&coded[..]).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn gzip_empty_input() {
        let mut filter = GzipFilter::new();
        let coded = run_filter(&mut filter, b"", 64);
        let mut decoded = Vec::new();
        flate2::read::GzDecoder::new(&coded[..]).read_to_end(&mut decoded).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn sync_flush_makes_visible_progress() {
        // With more_input the output must be decodable up to the flush point.
        let mut filter = DeflateFilter::new();
        let mut out = vec![0u8; 256];
        let outcome = filter.process(&mut out, b"first batch", true).unwrap();
        assert_eq!(outcome.consumed, 11);
        assert!(outcome.written > 0);
        assert!(!outcome.finished);

        let mut decoder = flate2::Decompress::new(true);
        let mut decoded = vec![0u8; 64];
        decoder
            .decompress(&out[..outcome.written], &mut decoded, flate2::FlushDecompress::Sync)
            .unwrap();
        assert_eq!(&decoded[..decoder.total_out() as usize], b"first batch");
    }

    #[test]
    fn tiny_output_window_finishes_across_calls() {
        let input = vec![b'a'; 2048];
        let mut filter = GzipFilter::new();
        // A 4-byte window forces header, body and trailer to straddle calls.
        let coded = run_filter(&mut filter, &input, 4);
        let mut decoded = Vec::new();
        flate2::read::GzDecoder::new(&coded[..]).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, input);
    }
}
