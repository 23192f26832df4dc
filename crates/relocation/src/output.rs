use log::{debug, trace};
use program::{Arena, HeapConfig, Program, header::{HEADER_WORDS, ID}};
use types::{PROGRAM_ID_LEN, ProgramId, WORD_BIT_SIZE, WORD_SIZE, Word};

use crate::error::{RelocationError, Result};

/// Rebuilds an image from a chunk stream inside `arena`, moving every flagged
/// word from the stream's original base to `new_base`.
///
/// The original base is taken from the first payload word, the anchor.
pub struct ImageOutputStream {
    arena: Arena,
    new_base: usize,
    old_base: Option<usize>,
    cursor: usize,
    program_id: Option<ProgramId>,
    program_size: usize,
}

impl ImageOutputStream {
    pub fn new(arena: Arena, new_base: usize) -> Self {
        Self {
            arena,
            new_base,
            old_base: None,
            cursor: 0,
            program_id: None,
            program_size: 0,
        }
    }

    pub fn new_base(&self) -> usize {
        self.new_base
    }

    /// Base the stream was produced at, known once the anchor is written.
    pub fn old_base(&self) -> Option<usize> {
        self.old_base
    }

    pub fn words_written(&self) -> usize {
        self.cursor
    }

    /// Consumes one chunk: `buffer[0]` is the bitmap, `buffer[1..=size]` the
    /// payload.
    pub fn write(&mut self, buffer: &[Word], size: usize) -> Result<()> {
        if size > WORD_BIT_SIZE || buffer.len() <= size {
            return Err(RelocationError::BadLength("chunk payload too large"));
        }
        let needed = self.cursor + size;
        if needed > self.arena.len() {
            return Err(RelocationError::ArenaTooSmall {
                needed: needed * WORD_SIZE,
                available: self.arena.byte_size(),
            });
        }
        let bitmap = buffer[0];
        for (i, &word) in buffer[1..=size].iter().enumerate() {
            let flagged = bitmap & (1 << i) != 0;
            let word = match (flagged, self.old_base) {
                (false, _) if self.cursor + i == 0 => return Err(RelocationError::MissingAnchor),
                (false, _) => word,
                (true, None) => {
                    self.old_base = Some(word);
                    self.new_base
                }
                (true, Some(old_base)) => word
                    .checked_sub(old_base)
                    .and_then(|offset| self.new_base.checked_add(offset))
                    .ok_or(RelocationError::Overflow(word))?,
            };
            self.arena.words_mut()[self.cursor + i] = word;
        }
        trace!("wrote {} words at word {}", size, self.cursor);
        self.cursor += size;
        Ok(())
    }

    /// Stamped into the image header by [`RelocatedImage::into_program`].
    pub fn set_program_id(&mut self, id: ProgramId) {
        self.program_id = Some(id);
    }

    pub fn program_id(&self) -> Option<ProgramId> {
        self.program_id
    }

    /// Declared byte size of the image. Stored as given; nothing checks it
    /// against the words written.
    pub fn set_program_size(&mut self, size: usize) {
        self.program_size = size;
    }

    pub fn program_size(&self) -> usize {
        self.program_size
    }

    pub fn finish(self) -> RelocatedImage {
        debug!(
            "relocated {} words from 0x{:x} to 0x{:x}",
            self.cursor,
            self.old_base.unwrap_or_default(),
            self.new_base
        );
        RelocatedImage {
            arena: self.arena,
            base: self.new_base,
            len: self.cursor,
            program_id: self.program_id,
            program_size: self.program_size,
        }
    }

    pub fn into_program(self, config: &HeapConfig) -> Result<Program> {
        self.finish().into_program(config)
    }
}

/// The words written by an [`ImageOutputStream`], anchored at its new base.
pub struct RelocatedImage {
    arena: Arena,
    base: usize,
    len: usize,
    program_id: Option<ProgramId>,
    program_size: usize,
}

impl RelocatedImage {
    pub fn base(&self) -> usize {
        self.base
    }

    pub fn words(&self) -> &[Word] {
        &self.arena.words()[..self.len]
    }

    pub fn program_id(&self) -> Option<ProgramId> {
        self.program_id
    }

    pub fn program_size(&self) -> usize {
        self.program_size
    }

    pub fn into_arena(self) -> Arena {
        self.arena
    }

    /// Stamps the program id, if one was set, and validates the result as a
    /// program anchored at the new base. The arena is made read-only when
    /// `config.protect` is set.
    pub fn into_program(mut self, config: &HeapConfig) -> Result<Program> {
        if let Some(id) = self.program_id {
            if self.len >= HEADER_WORDS {
                let start = ID * WORD_SIZE;
                self.arena.bytes_mut()[start..start + PROGRAM_ID_LEN].copy_from_slice(&id.to_bytes());
            }
        }
        let mut program = Program::anchor(self.arena, self.base)?;
        if config.protect {
            program.protect()?;
        }
        Ok(program)
    }
}
