//! Render `http` crate request / response parts into a [`MessageHead`].
//!
//! The renderers emit the status- or request-line plus every header, each as
//! `name: value\r\n`, terminated by the blank line, and derive the transfer
//! metadata the serializer consumes:
//!
//! - `Transfer-Encoding: chunked` (as the final coding) selects chunked framing
//! - `Content-Encoding: deflate | gzip` selects the content-coding filter
//! - `Expect: 100-continue` arms the interim-response pause
//!
//! Metadata problems are surfaced here, eagerly: an unknown content coding or
//! a non-ASCII metadata value fails rendering, so a serializer is never
//! started on a silently-broken head.

use bytes::{BufMut, Bytes, BytesMut};
use http::{header, HeaderMap, Version};
use tracing::error;

use crate::protocol::{ContentCoding, HeadError, MessageHead, TransferEncoding};

const INIT_HEAD_SIZE: usize = 4 * 1024;

/// Render response parts into a [`MessageHead`].
pub fn encode_response(parts: &http::response::Parts) -> Result<MessageHead, HeadError> {
    let mut dst = BytesMut::with_capacity(INIT_HEAD_SIZE);

    match parts.version {
        Version::HTTP_11 => {
            dst.put_slice(b"HTTP/1.1 ");
            dst.put_slice(parts.status.as_str().as_bytes());
            dst.put_slice(b" ");
            dst.put_slice(parts.status.canonical_reason().unwrap_or("Unknown").as_bytes());
            dst.put_slice(b"\r\n");
        }
        v => {
            error!(http_version = ?v, "unsupported http version");
            return Err(HeadError::UnsupportedVersion(v));
        }
    }

    put_headers(&mut dst, &parts.headers);
    finish(dst, &parts.headers)
}

/// Render request parts into a [`MessageHead`].
pub fn encode_request(parts: &http::request::Parts) -> Result<MessageHead, HeadError> {
    let mut dst = BytesMut::with_capacity(INIT_HEAD_SIZE);

    match parts.version {
        Version::HTTP_11 => {
            dst.put_slice(parts.method.as_str().as_bytes());
            dst.put_slice(b" ");
            let target = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
            dst.put_slice(target.as_bytes());
            dst.put_slice(b" HTTP/1.1\r\n");
        }
        v => {
            error!(http_version = ?v, "unsupported http version");
            return Err(HeadError::UnsupportedVersion(v));
        }
    }

    put_headers(&mut dst, &parts.headers);
    finish(dst, &parts.headers)
}

fn put_headers(dst: &mut BytesMut, headers: &HeaderMap) {
    for (name, value) in headers.iter() {
        dst.put_slice(name.as_ref());
        dst.put_slice(b": ");
        dst.put_slice(value.as_ref());
        dst.put_slice(b"\r\n");
    }
    dst.put_slice(b"\r\n");
}

fn finish(dst: BytesMut, headers: &HeaderMap) -> Result<MessageHead, HeadError> {
    let transfer = derive_transfer(headers)?;
    let expect_continue = derive_expect(headers)?;
    Ok(MessageHead::new(dst.freeze(), transfer, expect_continue))
}

fn derive_transfer(headers: &HeaderMap) -> Result<TransferEncoding, HeadError> {
    let mut chunked = false;
    if let Some(value) = headers.get(header::TRANSFER_ENCODING) {
        let value = value.to_str().map_err(|_| HeadError::InvalidValue { name: "transfer-encoding" })?;
        chunked = value.split(',').any(|coding| coding.trim().eq_ignore_ascii_case("chunked"));
    }

    let mut coding = ContentCoding::Identity;
    if let Some(value) = headers.get(header::CONTENT_ENCODING) {
        let value = value.to_str().map_err(|_| HeadError::InvalidValue { name: "content-encoding" })?;
        coding = match value.trim() {
            v if v.eq_ignore_ascii_case("identity") => ContentCoding::Identity,
            v if v.eq_ignore_ascii_case("deflate") => ContentCoding::Deflate,
            v if v.eq_ignore_ascii_case("gzip") || v.eq_ignore_ascii_case("x-gzip") => ContentCoding::Gzip,
            other => {
                error!(coding = other, "unsupported content coding");
                return Err(HeadError::unsupported_coding(other));
            }
        };
    }

    Ok(TransferEncoding { chunked, coding })
}

fn derive_expect(headers: &HeaderMap) -> Result<bool, HeadError> {
    match headers.get(header::EXPECT) {
        None => Ok(false),
        Some(value) => {
            let value = value.to_str().map_err(|_| HeadError::InvalidValue { name: "expect" })?;
            Ok(value.trim().eq_ignore_ascii_case("100-continue"))
        }
    }
}

/// Render pre-built header octets unchanged, deriving metadata from `headers`.
///
/// For header producers that already have the serialized head but still want
/// the metadata derivation (and its eager validation) from this module.
pub fn with_rendered_bytes(bytes: Bytes, headers: &HeaderMap) -> Result<MessageHead, HeadError> {
    let transfer = derive_transfer(headers)?;
    let expect_continue = derive_expect(headers)?;
    Ok(MessageHead::new(bytes, transfer, expect_continue))
}
