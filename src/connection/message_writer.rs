use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::protocol::SerializeError;
use crate::serializer::Serializer;

/// Why [`MessageWriter::send`] returned control to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    /// The message has been fully written and flushed.
    Done,
    /// The header is on the wire; await the peer's 100-continue interim
    /// response, then call `send` again.
    AwaitContinue,
    /// The stream has no committed data; push more body bytes or close the
    /// stream, then call `send` again.
    NeedData,
}

/// Drives a [`Serializer`] session into an `AsyncWrite` with vectored writes.
///
/// The serializer stays the caller's: start a message on it, then hand it to
/// [`send`](Self::send), which loops prepare → write → consume until the
/// message is done or a sentinel hands control back.
#[derive(Debug)]
pub struct MessageWriter<W> {
    writer: W,
}

impl<W> MessageWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    #[inline]
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Write serialized bytes until the message completes or the session
    /// needs the caller (expect-continue synchronization, stream data).
    ///
    /// Upstream body failures and I/O errors are returned; the sentinel
    /// statuses become [`SendState`] values.
    pub async fn send(&mut self, serializer: &mut Serializer) -> Result<SendState, SerializeError> {
        loop {
            if serializer.is_done() {
                self.flush().await?;
                return Ok(SendState::Done);
            }

            let view = match serializer.prepare() {
                Ok(view) => view,
                Err(SerializeError::Expect100Continue) => {
                    self.flush().await?;
                    return Ok(SendState::AwaitContinue);
                }
                Err(SerializeError::NeedData) => return Ok(SendState::NeedData),
                Err(e) => return Err(e),
            };

            if view.is_empty() {
                // No progress was possible this cycle (e.g. a source returned
                // zero bytes without finishing); re-drive.
                serializer.consume(0);
                continue;
            }

            let (slices, count) = view.io_slices();
            let wrote = self.writer.write_vectored(&slices[..count]).await.map_err(io_to_body)?;
            if wrote == 0 {
                return Err(io_to_body(io::Error::new(io::ErrorKind::WriteZero, "writer accepted no bytes")));
            }
            trace!(bytes = wrote, ranges = count, "wrote message bytes");
            serializer.consume(wrote);
        }
    }

    pub async fn flush(&mut self) -> Result<(), SerializeError> {
        self.writer.flush().await.map_err(io_to_body)
    }
}

fn io_to_body(e: io::Error) -> SerializeError {
    SerializeError::Body { source: e }
}
