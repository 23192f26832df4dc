//! Machine words and the sizes derived from them.

/// One heap word. Images, relocation chunks and extension headers are all
/// measured in these.
pub type Word = usize;

pub const WORD_SIZE: usize = core::mem::size_of::<Word>();
pub const WORD_SIZE_LOG2: u32 = WORD_SIZE.trailing_zeros();
pub const WORD_BIT_SIZE: usize = WORD_SIZE * 8;

/// One bitmap word followed by up to `WORD_BIT_SIZE` payload words.
pub const CHUNK_SIZE: usize = 1 + WORD_BIT_SIZE;

/// Payloads above this many bytes live in the external region of the arena.
pub const EXTERNAL_THRESHOLD: usize = 128;

/// Rounds `bytes` up to the next word boundary.
pub const fn round_up_to_word(bytes: usize) -> usize {
    (bytes + (WORD_SIZE - 1)) & !(WORD_SIZE - 1)
}

/// Number of words needed to hold `bytes`.
pub const fn words_for(bytes: usize) -> usize {
    round_up_to_word(bytes) / WORD_SIZE
}

pub const fn is_word_aligned(address: usize) -> bool {
    address & (WORD_SIZE - 1) == 0
}
