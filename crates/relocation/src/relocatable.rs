use log::debug;
use program::{AnchoredImage, Arena, HeapConfig, Program};
use types::{CHUNK_SIZE, WORD_BIT_SIZE, WORD_SIZE, Word};

use crate::{
    error::{RelocationError, Result},
    input::ImageInputStream,
    output::ImageOutputStream,
};

const CHUNK_BYTES: usize = CHUNK_SIZE * WORD_SIZE;

/// A position independent image: chunks of little-endian words, each a bitmap
/// followed by `WORD_BIT_SIZE` payload words. The last chunk is zero padded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocatableImage {
    image_size: usize,
    bytes: Vec<u8>,
}

impl RelocatableImage {
    /// Wraps a stream produced elsewhere. `image_size` is the byte size of
    /// the anchored image it encodes.
    pub fn from_bytes(bytes: Vec<u8>, image_size: usize) -> Result<Self> {
        if bytes.len() % CHUNK_BYTES != 0 {
            return Err(RelocationError::BadLength("stream is not a whole number of chunks"));
        }
        if image_size % WORD_SIZE != 0 {
            return Err(RelocationError::BadLength("image size is not a whole number of words"));
        }
        let words = image_size / WORD_SIZE;
        if words.div_ceil(WORD_BIT_SIZE) != bytes.len() / CHUNK_BYTES {
            return Err(RelocationError::BadLength("image size does not match chunk count"));
        }
        Ok(Self { image_size, bytes })
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn byte_size(&self) -> usize {
        self.bytes.len()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Splits the stream back into chunks, each with its payload word count.
    pub fn chunks(&self) -> impl Iterator<Item = ([Word; CHUNK_SIZE], usize)> + '_ {
        let mut remaining = self.image_size / WORD_SIZE;
        self.bytes.chunks_exact(CHUNK_BYTES).map(move |raw| {
            let mut chunk = [0 as Word; CHUNK_SIZE];
            for (word, bytes) in chunk.iter_mut().zip(raw.chunks_exact(WORD_SIZE)) {
                let mut le = [0u8; WORD_SIZE];
                le.copy_from_slice(bytes);
                *word = Word::from_le_bytes(le);
            }
            let size = remaining.min(WORD_BIT_SIZE);
            remaining -= size;
            (chunk, size)
        })
    }
}

/// Streams `image` into its position independent form.
pub fn to_relocatable<I: AnchoredImage + ?Sized>(image: &I) -> Result<RelocatableImage> {
    let mut stream = ImageInputStream::new(image)?;
    let image_size = stream.program_size();
    let mut bytes = Vec::with_capacity(image_size.div_ceil(WORD_BIT_SIZE * WORD_SIZE) * CHUNK_BYTES);
    let mut buffer = [0 as Word; CHUNK_SIZE];
    while !stream.eos() {
        stream.read(&mut buffer);
        for word in buffer {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
    }
    debug!(
        "relocatable image of 0x{:x}: {} image bytes, {} stream bytes",
        image.base(),
        image_size,
        bytes.len()
    );
    Ok(RelocatableImage { image_size, bytes })
}

/// Rebuilds `image` inside `arena` as a program anchored at `new_base`,
/// read-only when `config.protect` is set.
pub fn relocate(
    image: &RelocatableImage,
    arena: Arena,
    new_base: usize,
    config: &HeapConfig,
) -> Result<Program> {
    if image.image_size() > arena.byte_size() {
        return Err(RelocationError::ArenaTooSmall {
            needed: image.image_size(),
            available: arena.byte_size(),
        });
    }
    let mut stream = ImageOutputStream::new(arena, new_base);
    for (chunk, size) in image.chunks() {
        stream.write(&chunk, size)?;
    }
    stream.set_program_size(image.image_size());
    stream.into_program(config)
}
