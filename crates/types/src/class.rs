//! Object headers, type tags and the per-class bits table entries.

use crate::value::Value;

pub const CLASS_TAG_BIT_SIZE: u32 = 4;
pub const CLASS_TAG_MASK: u16 = (1 << CLASS_TAG_BIT_SIZE) - 1;

/// Largest instance byte size a `class_bits` entry can describe.
pub const MAX_INSTANCE_SIZE: usize = (u16::MAX >> CLASS_TAG_BIT_SIZE) as usize;

/// Layout family of a heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    Array = 0,
    String = 1,
    Instance = 2,
    Oddball = 3,
    Double = 4,
    LargeInteger = 5,
    ByteArray = 6,
}

impl TypeTag {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(TypeTag::Array),
            1 => Some(TypeTag::String),
            2 => Some(TypeTag::Instance),
            3 => Some(TypeTag::Oddball),
            4 => Some(TypeTag::Double),
            5 => Some(TypeTag::LargeInteger),
            6 => Some(TypeTag::ByteArray),
            _ => None,
        }
    }

    /// Instances and oddballs are sized by their class, everything else by a
    /// length stored in the object (or a fixed payload).
    pub fn has_fields(self) -> bool {
        matches!(self, TypeTag::Instance | TypeTag::Oddball)
    }
}

/// Entry of the `class_bits` table: instance byte size in the upper bits, the
/// type tag in the lower `CLASS_TAG_BIT_SIZE` bits. A size of zero marks a
/// variable-length class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassBits(pub u16);

impl ClassBits {
    pub fn new(tag: TypeTag, instance_size: usize) -> Self {
        assert!(instance_size <= MAX_INSTANCE_SIZE, "instance size {} too large", instance_size);
        ClassBits(((instance_size as u16) << CLASS_TAG_BIT_SIZE) | tag as u16)
    }

    pub fn variable(tag: TypeTag) -> Self {
        Self::new(tag, 0)
    }

    pub fn tag_bits(self) -> u8 {
        (self.0 & CLASS_TAG_MASK) as u8
    }

    pub fn tag(self) -> Option<TypeTag> {
        TypeTag::from_bits(self.tag_bits())
    }

    pub fn instance_size(self) -> usize {
        (self.0 >> CLASS_TAG_BIT_SIZE) as usize
    }
}

/// Header word stamped at the start of every heap object.
pub fn encode_header(class_id: u16, tag: TypeTag) -> Value {
    Value::from_smi(((class_id as isize) << CLASS_TAG_BIT_SIZE) | tag as isize)
}

/// Splits a header word into `(class_id, raw tag bits)`. Returns `None` when
/// the word is not a Smi or the class id is out of range.
pub fn decode_header(header: Value) -> Option<(u16, u8)> {
    let bits = header.as_smi()?;
    let class_id = bits >> CLASS_TAG_BIT_SIZE;
    let class_id = u16::try_from(class_id).ok()?;
    Some((class_id, (bits & CLASS_TAG_MASK as isize) as u8))
}
