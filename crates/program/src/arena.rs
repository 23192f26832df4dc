use core::slice;

use region::{Allocation, Protection};
use types::{WORD_SIZE, Word, words_for};

use crate::error::Result;

/// Fixed-size, page aligned, zero filled block of words.
///
/// Images live in an arena. Once an image is published the arena is made
/// read-only with [`Arena::protect`], so an accidental write faults instead of
/// corrupting a program other processes are executing.
pub struct Arena {
    allocation: Allocation,
    len: usize,
    protected: bool,
}

// SAFETY: the arena exclusively owns its mapping and hands out references
// tied to `&self` / `&mut self`, so the usual borrow rules make it as thread
// safe as a `Vec<Word>`.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    /// Reserves at least `size_in_bytes` bytes, rounded up to whole words.
    pub fn new(size_in_bytes: usize) -> Result<Self> {
        let len = words_for(size_in_bytes).max(1);
        let allocation = region::alloc(len * WORD_SIZE, Protection::READ_WRITE)?;
        let mut arena = Self {
            allocation,
            len,
            protected: false,
        };
        arena.words_mut().fill(0);
        Ok(arena)
    }

    pub fn from_words(words: &[Word]) -> Result<Self> {
        let mut arena = Self::new(words.len() * WORD_SIZE)?;
        arena.words_mut()[..words.len()].copy_from_slice(words);
        Ok(arena)
    }

    /// Copies little-endian encoded words into a fresh arena. A partial
    /// trailing word is zero extended.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut arena = Self::new(bytes.len())?;
        for (word, chunk) in arena.words_mut().iter_mut().zip(bytes.chunks(WORD_SIZE)) {
            let mut raw = [0u8; WORD_SIZE];
            raw[..chunk.len()].copy_from_slice(chunk);
            *word = Word::from_le_bytes(raw);
        }
        Ok(arena)
    }

    /// Host address of word 0.
    pub fn address(&self) -> usize {
        self.allocation.as_ptr::<u8>() as usize
    }

    /// Length in words.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn byte_size(&self) -> usize {
        self.len * WORD_SIZE
    }

    pub fn words(&self) -> &[Word] {
        // SAFETY: the allocation is page aligned and at least `len` words long.
        unsafe { slice::from_raw_parts(self.allocation.as_ptr::<Word>(), self.len) }
    }

    pub fn words_mut(&mut self) -> &mut [Word] {
        assert!(!self.protected, "write to a read-only arena");
        // SAFETY: as in `words`; `&mut self` guarantees exclusive access.
        unsafe { slice::from_raw_parts_mut(self.allocation.as_mut_ptr::<Word>(), self.len) }
    }

    pub fn bytes(&self) -> &[u8] {
        // SAFETY: the same memory as `words`, viewed bytewise.
        unsafe { slice::from_raw_parts(self.allocation.as_ptr::<u8>(), self.byte_size()) }
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        assert!(!self.protected, "write to a read-only arena");
        let size = self.byte_size();
        // SAFETY: as in `bytes`; `&mut self` guarantees exclusive access.
        unsafe { slice::from_raw_parts_mut(self.allocation.as_mut_ptr::<u8>(), size) }
    }

    /// Makes the whole arena read-only. Irreversible for the arena's lifetime.
    pub fn protect(&mut self) -> Result<()> {
        if self.protected {
            return Ok(());
        }
        // SAFETY: the range is exactly the allocation owned by this arena.
        unsafe {
            region::protect(
                self.allocation.as_ptr::<u8>(),
                self.allocation.len(),
                Protection::READ,
            )?;
        }
        self.protected = true;
        Ok(())
    }

    pub fn is_protected(&self) -> bool {
        self.protected
    }
}

impl core::fmt::Debug for Arena {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Arena")
            .field("address", &format_args!("0x{:x}", self.address()))
            .field("len", &self.len)
            .field("protected", &self.protected)
            .finish()
    }
}
