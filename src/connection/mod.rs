//! Transport seam: drive a serializer session into an `AsyncWrite`.

mod message_writer;

pub use message_writer::MessageWriter;
pub use message_writer::SendState;
