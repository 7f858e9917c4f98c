use bytes::Bytes;

/// Content-coding applied to the body before transfer framing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ContentCoding {
    /// No transformation.
    #[default]
    Identity,
    /// RFC 1950 zlib-wrapped deflate.
    Deflate,
    /// RFC 1952 gzip.
    Gzip,
}

impl ContentCoding {
    /// Returns true if the body bytes pass through untransformed.
    #[inline]
    pub fn is_identity(&self) -> bool {
        matches!(self, ContentCoding::Identity)
    }
}

/// How the body is framed and coded on the wire.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransferEncoding {
    /// Chunked transfer framing vs. identity framing.
    pub chunked: bool,
    /// Content-coding applied before framing.
    pub coding: ContentCoding,
}

impl TransferEncoding {
    /// Identity framing, identity coding.
    pub const IDENTITY: TransferEncoding = TransferEncoding { chunked: false, coding: ContentCoding::Identity };

    /// Chunked framing, identity coding.
    pub const CHUNKED: TransferEncoding = TransferEncoding { chunked: true, coding: ContentCoding::Identity };

    #[inline]
    pub fn is_chunked(&self) -> bool {
        self.chunked
    }
}

/// A prepared message head: the rendered header octets plus the parsed
/// metadata the serializer acts on.
///
/// The octets are held as [`Bytes`], so cloning a head (and handing one to a
/// serializer) shares the header producer's storage instead of copying it.
/// The storage must not be mutated until the serializer is done with the
/// message.
#[derive(Debug, Clone)]
pub struct MessageHead {
    bytes: Bytes,
    transfer: TransferEncoding,
    expect_continue: bool,
}

impl MessageHead {
    /// Build a head from pre-rendered header octets and explicit metadata.
    ///
    /// The octets must be the complete head, including the terminating blank
    /// line. See [`head`](super::head) for renderers from `http` crate parts.
    pub fn new(bytes: Bytes, transfer: TransferEncoding, expect_continue: bool) -> Self {
        MessageHead { bytes, transfer, expect_continue }
    }

    /// The header octets.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn transfer(&self) -> TransferEncoding {
        self.transfer
    }

    /// Whether the message carries `Expect: 100-continue`.
    pub fn is_expect_continue(&self) -> bool {
        self.expect_continue
    }
}
