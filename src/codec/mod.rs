//! Wire-format building blocks.
//!
//! - [`chunk`]: chunked transfer framing: the fixed-width chunk-size line,
//!   the chunk terminator and the last-chunk marker
//! - [`Filter`] and the deflate / gzip filters: content-coding applied to the
//!   body bytes before chunk framing

pub mod chunk;

mod filter;

pub use filter::make_deflate_filter;
pub use filter::make_gzip_filter;
pub use filter::DeflateFilter;
pub use filter::Filter;
pub use filter::GzipFilter;
pub use filter::ProcessOutcome;

pub(crate) use filter::SYNC_FLUSH_OVERHEAD;
