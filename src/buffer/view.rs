use std::io::IoSlice;

/// Maximum number of byte ranges a single `prepare` call exposes.
pub const MAX_SLICES: usize = 8;

/// The flat output view returned by `Serializer::prepare`.
///
/// An ordered sequence of at most [`MAX_SLICES`] byte ranges; when the message
/// head has not been fully transmitted yet, the first range aliases the header
/// octets. Concatenated in order, the ranges are exactly the next bytes of the
/// serialized wire form. The view borrows the serializer and is rebuilt by
/// every `prepare` call; consumption is reported back through
/// `Serializer::consume`, never by mutating the view.
#[derive(Debug, Clone, Copy)]
pub struct BufferSlices<'a> {
    parts: [&'a [u8]; MAX_SLICES],
    count: usize,
}

impl<'a> BufferSlices<'a> {
    pub(crate) fn new() -> Self {
        BufferSlices { parts: [&[]; MAX_SLICES], count: 0 }
    }

    /// Append a range. Empty ranges are dropped; once all slots are taken,
    /// further ranges are silently deferred to a later `prepare`.
    pub(crate) fn push(&mut self, part: &'a [u8]) {
        if part.is_empty() || self.count == MAX_SLICES {
            return;
        }
        self.parts[self.count] = part;
        self.count += 1;
    }

    pub(crate) fn is_full(&self) -> bool {
        self.count == MAX_SLICES
    }

    /// Number of byte ranges in the view.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Sum of the range lengths: how many bytes may be consumed at most.
    pub fn total_len(&self) -> usize {
        self.parts[..self.count].iter().map(|p| p.len()).sum()
    }

    pub fn get(&self, index: usize) -> Option<&'a [u8]> {
        self.parts[..self.count].get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        self.parts[..self.count].iter().copied()
    }

    /// The view as `IoSlice`s for vectored writes. Only the first `usize`
    /// entries of the returned array are meaningful.
    pub fn io_slices(&self) -> ([IoSlice<'a>; MAX_SLICES], usize) {
        let mut slices = [IoSlice::new(&[]); MAX_SLICES];
        for (dst, part) in slices.iter_mut().zip(self.parts[..self.count].iter()) {
            *dst = IoSlice::new(part);
        }
        (slices, self.count)
    }

    /// Concatenate the ranges into one owned buffer. Intended for tests and
    /// diagnostics; transports should write the ranges directly.
    pub fn concat(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_len());
        for part in self.iter() {
            out.extend_from_slice(part);
        }
        out
    }
}
