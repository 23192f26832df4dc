use log::trace;
use program::AnchoredImage;
use types::{CHUNK_SIZE, WORD_BIT_SIZE, WORD_SIZE, Word};

use crate::{bits::RelocationBits, error::Result};

/// Streams an anchored image as chunks: one bitmap word followed by up to
/// `WORD_BIT_SIZE` payload words copied verbatim from the image.
pub struct ImageInputStream<'a> {
    words: &'a [Word],
    bits: RelocationBits,
    cursor: usize,
}

impl<'a> ImageInputStream<'a> {
    pub fn new<I: AnchoredImage + ?Sized>(image: &'a I) -> Result<Self> {
        Ok(Self {
            words: image.words(),
            bits: RelocationBits::build(image)?,
            cursor: 0,
        })
    }

    /// Payload words not yet emitted.
    pub fn words_to_read(&self) -> usize {
        self.words.len() - self.cursor
    }

    pub fn eos(&self) -> bool {
        self.cursor == self.words.len()
    }

    /// Byte size of the streamed image.
    pub fn program_size(&self) -> usize {
        self.words.len() * WORD_SIZE
    }

    pub fn relocation_bits(&self) -> &RelocationBits {
        &self.bits
    }

    /// Fills `buffer` with the next chunk and returns how many payload words
    /// it carries. Unused payload words and bitmap bits are zero.
    pub fn read(&mut self, buffer: &mut [Word; CHUNK_SIZE]) -> usize {
        let count = self.words_to_read().min(WORD_BIT_SIZE);
        buffer[0] = self.bits.chunk(self.cursor / WORD_BIT_SIZE);
        buffer[1..1 + count].copy_from_slice(&self.words[self.cursor..self.cursor + count]);
        buffer[1 + count..].fill(0);
        trace!(
            "chunk at word {}: {} words, bitmap 0x{:x}",
            self.cursor,
            count,
            buffer[0]
        );
        self.cursor += count;
        count
    }
}
