use log::debug;
use program::{AnchoredImage, Field, PointerCallback};
use types::{Value, WORD_BIT_SIZE, WORD_SIZE, Word, is_word_aligned};

use crate::error::{RelocationError, Result};

/// One bit per image word, set iff the word holds an address that has to move
/// with the image.
#[derive(Clone, PartialEq, Eq)]
pub struct RelocationBits {
    bits: Vec<Word>,
    len: usize,
}

impl RelocationBits {
    /// All clear, covering `len` words.
    pub fn new(len: usize) -> Self {
        Self {
            bits: vec![0; len.div_ceil(WORD_BIT_SIZE)],
            len,
        }
    }

    /// Classifies every word of `image` using the fields it reports.
    ///
    /// Object slots are flagged when they hold a heap reference; raw and
    /// sentinel addresses when they are not null. Each flagged word must point
    /// into the image, sentinels may also point one past its end.
    pub fn build<I: AnchoredImage + ?Sized>(image: &I) -> Result<Self> {
        let mut builder = Builder {
            base: image.base(),
            words: image.words(),
            bits: RelocationBits::new(image.words().len()),
            error: None,
        };
        image.do_pointers(&mut builder);
        if let Some(error) = builder.error {
            return Err(error);
        }
        debug!(
            "relocation bits for image at 0x{:x}: {} of {} words flagged",
            image.base(),
            builder.bits.count(),
            builder.bits.len()
        );
        Ok(builder.bits)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn set(&mut self, index: usize) {
        assert!(index < self.len, "bit {} out of range", index);
        self.bits[index / WORD_BIT_SIZE] |= 1 << (index % WORD_BIT_SIZE);
    }

    pub fn is_set(&self, index: usize) -> bool {
        index < self.len && self.bits[index / WORD_BIT_SIZE] & (1 << (index % WORD_BIT_SIZE)) != 0
    }

    /// Number of flagged words.
    pub fn count(&self) -> usize {
        self.bits.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Bitmap for the words `chunk * WORD_BIT_SIZE ..`; bit `i` covers word
    /// `chunk * WORD_BIT_SIZE + i`.
    pub fn chunk(&self, chunk: usize) -> Word {
        self.bits.get(chunk).copied().unwrap_or(0)
    }
}

impl core::fmt::Debug for RelocationBits {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "RelocationBits(")?;
        for index in 0..self.len {
            f.write_str(if self.is_set(index) { "1" } else { "0" })?;
        }
        write!(f, ")")
    }
}

/// Same as [`RelocationBits::build`].
pub fn build_relocation_bits<I: AnchoredImage + ?Sized>(image: &I) -> Result<RelocationBits> {
    RelocationBits::build(image)
}

struct Builder<'a> {
    base: usize,
    words: &'a [Word],
    bits: RelocationBits,
    error: Option<RelocationError>,
}

impl Builder<'_> {
    fn classify(&mut self, field: Field) -> Result<()> {
        let address = field.address();
        let end = self.base + self.words.len() * WORD_SIZE;
        if address < self.base || address >= end || !is_word_aligned(address) {
            return Err(RelocationError::FieldOutOfImage(address));
        }
        let index = (address - self.base) / WORD_SIZE;
        let word = self.words[index];
        let target = match field {
            Field::ObjectSlot(_) => match Value(word).as_address() {
                Some(target) => target,
                None => return Ok(()),
            },
            Field::RawAddress(_) | Field::SentinelAddress(_) if word == 0 => return Ok(()),
            Field::RawAddress(_) | Field::SentinelAddress(_) => word,
        };
        let inside = match field {
            Field::SentinelAddress(_) => (self.base..=end).contains(&target),
            _ => (self.base..end).contains(&target),
        };
        if !inside {
            return Err(RelocationError::TargetOutOfImage {
                field: address,
                target,
            });
        }
        self.bits.set(index);
        Ok(())
    }
}

impl PointerCallback for Builder<'_> {
    fn field(&mut self, field: Field) {
        if self.error.is_none() {
            self.error = self.classify(field).err();
        }
    }
}
