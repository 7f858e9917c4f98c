//! micro-wire is a sans-io HTTP/1.1 message serializer.
//!
//! It takes a prepared message head plus a body and turns them into ready-to-send
//! byte ranges, owning the transfer framing (identity vs. chunked), the body
//! ingestion shapes, optional content-coding (deflate / gzip) and the buffer
//! reclamation protocol. It never performs I/O itself: each [`Serializer::prepare`]
//! call exposes a flat view of the next bytes to send, and [`Serializer::consume`]
//! reclaims whatever the transport actually transmitted.
//!
//! # Architecture
//!
//! - Body handling:
//!   - [`serializer::Serializer`]: the per-message state machine
//!   - [`serializer::Source`]: pull-style body ingestion
//!   - [`serializer::Stream`]: push-style body ingestion
//! - Wire format:
//!   - [`codec::chunk`]: chunked transfer framing
//!   - [`codec::Filter`]: content-coding filters (deflate / gzip)
//! - Message metadata:
//!   - [`protocol::MessageHead`]: header octets plus parsed transfer metadata
//! - Transport seam:
//!   - [`connection::MessageWriter`]: drives a session into any `AsyncWrite`
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use micro_wire::protocol::{ContentCoding, MessageHead, TransferEncoding};
//! use micro_wire::serializer::Serializer;
//!
//! let head = MessageHead::new(
//!     Bytes::from_static(b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n"),
//!     TransferEncoding { chunked: true, coding: ContentCoding::Identity },
//!     false,
//! );
//!
//! let mut serializer = Serializer::new();
//! serializer.start_buffers(&head, vec![Bytes::from_static(b"hello world")]).unwrap();
//! while !serializer.is_done() {
//!     let view = serializer.prepare().unwrap();
//!     let sent = view.total_len(); // a real transport may send less
//!     serializer.consume(sent);
//! }
//! ```

pub mod buffer;
pub mod codec;
pub mod connection;
pub mod protocol;
pub mod serializer;

pub use buffer::BufferSlices;
pub use protocol::{ContentCoding, HeadError, MessageHead, SerializeError, TransferEncoding};
pub use serializer::{Serializer, Source, SourceOutcome, Stream};

pub(crate) use help::ensure;

mod help {

    macro_rules! ensure {
        ($predicate:expr, $error:expr) => {
            if !$predicate {
                return Err($error);
            }
        };
    }
    pub(crate) use ensure;
}
