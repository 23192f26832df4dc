//! Object layouts: how big an object is and which of its words are values,
//! raw payload or external buffer addresses.

use core::ops::Range;

use log::warn;
use types::{ClassBits, TypeTag, Value, WORD_SIZE, Word, decode_header, round_up_to_word};

use crate::error::{HeapError, Result};

pub const LENGTH_OFFSET: usize = 1;
pub const ARRAY_ELEMENTS_OFFSET: usize = 2;
pub const BYTE_ARRAY_DATA_OFFSET: usize = 2;
pub const STRING_HASH_OFFSET: usize = 2;
pub const STRING_DATA_OFFSET: usize = 3;
pub const BOXED_PAYLOAD_OFFSET: usize = 1;

/// Byte size of doubles and large integers: header plus 8 payload bytes.
pub const BOXED_SIZE: usize = WORD_SIZE + round_up_to_word(8);

/// Size of the objects of one class, as described by its `class_bits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectSize {
    /// Every object of the class takes this many bytes.
    Fixed(usize),
    /// The length is read from the word at `length_offset` of each object.
    Variable { length_offset: usize },
}

impl ObjectSize {
    pub fn of(bits: ClassBits) -> Result<ObjectSize> {
        let tag = bits.tag().ok_or(HeapError::UnknownTypeTag(bits.tag_bits()))?;
        match tag {
            TypeTag::Array | TypeTag::String | TypeTag::ByteArray => Ok(ObjectSize::Variable {
                length_offset: LENGTH_OFFSET,
            }),
            TypeTag::Double | TypeTag::LargeInteger => Ok(ObjectSize::Fixed(BOXED_SIZE)),
            TypeTag::Instance | TypeTag::Oddball => {
                let size = bits.instance_size();
                if size < WORD_SIZE || size % WORD_SIZE != 0 {
                    return Err(HeapError::Malformed("instance class with invalid size"));
                }
                Ok(ObjectSize::Fixed(size))
            }
        }
    }
}

/// Where the payload of a string or byte array lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Inline,
    External,
}

impl Storage {
    pub fn for_payload(bytes: usize) -> Self {
        if bytes > types::EXTERNAL_THRESHOLD {
            Storage::External
        } else {
            Storage::Inline
        }
    }
}

/// Length word of a string or byte array: `Smi(length)` when the payload is
/// inline, `Smi(!length)` when it is external.
pub fn encode_length(length: usize, storage: Storage) -> Value {
    match storage {
        Storage::Inline => Value::from_smi(length as isize),
        Storage::External => Value::from_smi(!(length as isize)),
    }
}

pub fn decode_length(value: Value) -> Option<(usize, Storage)> {
    let raw = value.as_smi()?;
    if raw >= 0 {
        Some((raw as usize, Storage::Inline))
    } else {
        Some((!raw as usize, Storage::External))
    }
}

/// Word count of a variable-length object.
pub fn variable_words(tag: TypeTag, length: usize, storage: Storage) -> Option<usize> {
    match (tag, storage) {
        (TypeTag::Array, Storage::Inline) => ARRAY_ELEMENTS_OFFSET.checked_add(length),
        (TypeTag::ByteArray, Storage::Inline) => {
            BYTE_ARRAY_DATA_OFFSET.checked_add(checked_words(length)?)
        }
        (TypeTag::ByteArray, Storage::External) => Some(BYTE_ARRAY_DATA_OFFSET + 1),
        (TypeTag::String, Storage::Inline) => {
            STRING_DATA_OFFSET.checked_add(checked_words(length.checked_add(1)?)?)
        }
        (TypeTag::String, Storage::External) => Some(STRING_DATA_OFFSET + 1),
        _ => None,
    }
}

fn checked_words(bytes: usize) -> Option<usize> {
    Some(bytes.checked_add(WORD_SIZE - 1)? / WORD_SIZE)
}

/// Hash stored in every string: seeded with the length, 31 multiplier,
/// masked to 30 bits so it always fits a Smi.
pub fn string_hash(bytes: &[u8]) -> isize {
    let mut hash = bytes.len() as u32;
    for &byte in bytes {
        hash = hash.wrapping_mul(31).wrapping_add(byte as u32);
    }
    (hash & 0x3fff_ffff) as isize
}

/// A parsed object inside an image.
#[derive(Clone, Copy)]
pub struct HeapObject<'a> {
    words: &'a [Word],
    bytes: &'a [u8],
    base: usize,
    index: usize,
    class_id: u16,
    tag: TypeTag,
    size: usize,
}

impl<'a> HeapObject<'a> {
    /// Parses the object starting at word `index`. The object must end at or
    /// before word `limit`.
    pub(crate) fn parse(
        words: &'a [Word],
        bytes: &'a [u8],
        base: usize,
        index: usize,
        limit: usize,
        class_bits: &[u16],
    ) -> Result<Self> {
        let limit = limit.min(words.len());
        if index >= limit {
            return Err(HeapError::Malformed("object outside heap"));
        }
        let (class_id, tag_bits) =
            decode_header(Value(words[index])).ok_or(HeapError::Malformed("bad object header"))?;
        let bits = class_bits
            .get(class_id as usize)
            .map(|bits| ClassBits(*bits))
            .ok_or(HeapError::UnknownClass(class_id as usize))?;
        if bits.tag_bits() != tag_bits {
            return Err(HeapError::Malformed("header tag does not match class"));
        }
        let tag = TypeTag::from_bits(tag_bits).ok_or(HeapError::UnknownTypeTag(tag_bits))?;

        let size = match ObjectSize::of(bits)? {
            ObjectSize::Fixed(size) => size / WORD_SIZE,
            ObjectSize::Variable { length_offset } => {
                let field = index + length_offset;
                if field >= limit {
                    return Err(HeapError::Malformed("object overruns heap"));
                }
                let (length, storage) = decode_length(Value(words[field]))
                    .ok_or(HeapError::Malformed("length is not a small integer"))?;
                variable_words(tag, length, storage)
                    .ok_or(HeapError::Malformed("bad object length"))?
            }
        };
        match index.checked_add(size) {
            Some(end) if end <= limit => {}
            _ => return Err(HeapError::Malformed("object overruns heap")),
        }

        Ok(Self {
            words,
            bytes,
            base,
            index,
            class_id,
            tag,
            size,
        })
    }

    pub fn address(&self) -> usize {
        self.base + self.index * WORD_SIZE
    }

    pub fn value(&self) -> Value {
        Value::from_address(self.address())
    }

    /// Word index of the header inside the image.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn class_id(&self) -> u16 {
        self.class_id
    }

    pub fn tag(&self) -> TypeTag {
        self.tag
    }

    /// Size in bytes, header included.
    pub fn size(&self) -> usize {
        self.size * WORD_SIZE
    }

    pub fn size_in_words(&self) -> usize {
        self.size
    }

    /// Word at `offset` from the header.
    pub fn word(&self, offset: usize) -> Word {
        assert!(offset < self.size, "offset {} outside object", offset);
        self.words[self.index + offset]
    }

    /// Length and storage of strings and byte arrays, element count of arrays.
    pub fn length(&self) -> Option<(usize, Storage)> {
        match self.tag {
            TypeTag::Array | TypeTag::String | TypeTag::ByteArray => {
                decode_length(Value(self.word(LENGTH_OFFSET)))
            }
            _ => None,
        }
    }

    /// Image word indices holding tagged values.
    pub fn slots(&self) -> Range<usize> {
        let end = self.index + self.size;
        match self.tag {
            TypeTag::Array => self.index + ARRAY_ELEMENTS_OFFSET..end,
            TypeTag::Instance | TypeTag::Oddball => self.index + 1..end,
            _ => end..end,
        }
    }

    pub fn values(&self) -> impl Iterator<Item = Value> + use<'a> {
        let words = self.words;
        self.slots().map(move |index| Value(words[index]))
    }

    /// Image word index of the external buffer address, if any.
    pub fn external_buffer_index(&self) -> Option<usize> {
        match (self.tag, self.length()?.1) {
            (TypeTag::ByteArray, Storage::External) => Some(self.index + BYTE_ARRAY_DATA_OFFSET),
            (TypeTag::String, Storage::External) => Some(self.index + STRING_DATA_OFFSET),
            _ => None,
        }
    }

    /// Content bytes of a string (without the NUL) or byte array.
    pub fn payload(&self) -> Result<&'a [u8]> {
        let (length, storage) = self
            .length()
            .ok_or(HeapError::Malformed("object has no byte payload"))?;
        let start = match (self.tag, storage) {
            (TypeTag::Array, _) => return Err(HeapError::Malformed("object has no byte payload")),
            (TypeTag::ByteArray, Storage::Inline) => {
                (self.index + BYTE_ARRAY_DATA_OFFSET) * WORD_SIZE
            }
            (TypeTag::String, Storage::Inline) => (self.index + STRING_DATA_OFFSET) * WORD_SIZE,
            _ => {
                let buffer = self.external_buffer_index().map(|index| self.words[index]);
                buffer
                    .and_then(|address| address.checked_sub(self.base))
                    .ok_or(HeapError::Malformed("external buffer outside image"))?
            }
        };
        start
            .checked_add(length)
            .and_then(|end| self.bytes.get(start..end))
            .ok_or(HeapError::Malformed("payload outside image"))
    }

    /// The 8 raw payload bytes of a double or large integer.
    pub fn boxed_bytes(&self) -> Result<[u8; 8]> {
        if !matches!(self.tag, TypeTag::Double | TypeTag::LargeInteger) {
            return Err(HeapError::Malformed("object is not boxed"));
        }
        let start = (self.index + BOXED_PAYLOAD_OFFSET) * WORD_SIZE;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.bytes[start..start + 8]);
        Ok(raw)
    }
}

impl core::fmt::Debug for HeapObject<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HeapObject")
            .field("address", &format_args!("0x{:x}", self.address()))
            .field("class_id", &self.class_id)
            .field("tag", &self.tag)
            .field("size", &self.size())
            .finish()
    }
}

/// Walks a gapless heap from its first object to `top`. Stops early, with a
/// warning, at the first word that does not parse as an object.
pub struct Objects<'a> {
    words: &'a [Word],
    bytes: &'a [u8],
    base: usize,
    class_bits: &'a [u16],
    next: usize,
    top: usize,
}

impl<'a> Objects<'a> {
    pub(crate) fn new(
        words: &'a [Word],
        bytes: &'a [u8],
        base: usize,
        class_bits: &'a [u16],
        heap: Range<usize>,
    ) -> Self {
        Self {
            words,
            bytes,
            base,
            class_bits,
            next: heap.start,
            top: heap.end,
        }
    }
}

impl<'a> Iterator for Objects<'a> {
    type Item = HeapObject<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.top {
            return None;
        }
        match HeapObject::parse(
            self.words,
            self.bytes,
            self.base,
            self.next,
            self.top,
            self.class_bits,
        ) {
            Ok(object) => {
                self.next += object.size_in_words();
                Some(object)
            }
            Err(error) => {
                warn!(
                    "heap walk stopped at 0x{:x}: {}",
                    self.base + self.next * WORD_SIZE,
                    error
                );
                self.next = self.top;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use types::{ClassBits, TypeTag, WORD_SIZE, Word, encode_header};

    use super::Objects;

    #[test]
    fn test_walk_stops_at_unparsable_object() {
        let class_bits = [ClassBits::new(TypeTag::Instance, 2 * WORD_SIZE).0];
        let words: [Word; 4] = [
            encode_header(0, TypeTag::Instance).raw(),
            0,
            encode_header(5, TypeTag::Instance).raw(),
            0,
        ];
        let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_ne_bytes()).collect();

        let mut objects = Objects::new(&words, &bytes, 0x1000, &class_bits, 0..words.len());
        let first = objects.next().unwrap();
        assert_eq!(first.index(), 0);
        assert_eq!(first.size_in_words(), 2);
        assert!(objects.next().is_none());
        assert!(objects.next().is_none());
    }
}
