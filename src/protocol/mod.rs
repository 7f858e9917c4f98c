//! Message metadata consumed by the serializer.
//!
//! The serializer does not parse or build headers itself; it consumes a
//! [`MessageHead`], the rendered header octets plus the transfer metadata a
//! header producer derived from them. [`head`] provides renderers from `http`
//! crate request / response parts for callers that do not bring their own
//! header producer.

mod message;
pub use message::ContentCoding;
pub use message::MessageHead;
pub use message::TransferEncoding;

pub mod head;

mod error;
pub use error::HeadError;
pub use error::SerializeError;
