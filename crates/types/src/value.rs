use core::fmt;

use crate::word::{Word, is_word_aligned};

pub const SMI_TAG_SIZE: u32 = 1;
pub const SMI_TAG: Word = 0;
pub const HEAP_TAG: Word = 1;
pub const HEAP_TAG_MASK: Word = 1;

pub const SMI_MIN: isize = isize::MIN >> SMI_TAG_SIZE;
pub const SMI_MAX: isize = isize::MAX >> SMI_TAG_SIZE;

/// A tagged word: either a small integer (Smi) or a reference to a heap object.
///
/// The low bit decides which one. Smis are stored shifted left by one with a
/// clear tag bit; heap references are the (word aligned) object address with
/// the tag bit set.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(pub Word);

impl Value {
    pub const ZERO: Value = Value(0);

    /// Encodes `value` as a Smi. The caller guarantees the range; see
    /// [`Value::try_from_smi`] for a checked version.
    pub const fn from_smi(value: isize) -> Self {
        Value((value << SMI_TAG_SIZE) as Word)
    }

    pub fn try_from_smi(value: i64) -> Option<Self> {
        let value = isize::try_from(value).ok()?;
        if (SMI_MIN..=SMI_MAX).contains(&value) {
            Some(Self::from_smi(value))
        } else {
            None
        }
    }

    /// Tags a word aligned object address as a heap reference.
    pub fn from_address(address: usize) -> Self {
        debug_assert!(is_word_aligned(address), "unaligned object address 0x{:x}", address);
        Value(address | HEAP_TAG)
    }

    pub const fn raw(self) -> Word {
        self.0
    }

    pub const fn is_smi(self) -> bool {
        self.0 & HEAP_TAG_MASK == SMI_TAG
    }

    pub const fn is_heap_object(self) -> bool {
        self.0 & HEAP_TAG_MASK == HEAP_TAG
    }

    pub const fn as_smi(self) -> Option<isize> {
        if self.is_smi() {
            Some((self.0 as isize) >> SMI_TAG_SIZE)
        } else {
            None
        }
    }

    pub const fn as_address(self) -> Option<usize> {
        if self.is_heap_object() {
            Some(self.0 & !HEAP_TAG_MASK)
        } else {
            None
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.as_smi(), self.as_address()) {
            (Some(value), _) => write!(f, "Smi({})", value),
            (_, Some(address)) => write!(f, "Ref(0x{:x})", address),
            _ => unreachable!(),
        }
    }
}
