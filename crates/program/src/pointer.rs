use types::Word;

/// One relocatable word of an anchored image, named by the image address of
/// the word itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Holds a tagged value; relocatable only when it is a heap reference.
    ObjectSlot(usize),
    /// Holds an untagged address into the image, or null.
    RawAddress(usize),
    /// Like `RawAddress`, but may point one element past the end.
    SentinelAddress(usize),
}

impl Field {
    pub fn address(self) -> usize {
        match self {
            Field::ObjectSlot(address)
            | Field::RawAddress(address)
            | Field::SentinelAddress(address) => address,
        }
    }

    pub fn is_object_slot(self) -> bool {
        matches!(self, Field::ObjectSlot(_))
    }
}

/// Visitor over the relocatable fields of an image.
///
/// Producers call [`PointerCallback::field`]. Implementors override either
/// `field` to see the tagged variant, or the two narrower hooks.
pub trait PointerCallback {
    fn object_slot(&mut self, _slot: usize) {}

    fn c_address(&mut self, _field: usize, _is_sentinel: bool) {}

    fn field(&mut self, field: Field) {
        match field {
            Field::ObjectSlot(slot) => self.object_slot(slot),
            Field::RawAddress(address) => self.c_address(address, false),
            Field::SentinelAddress(address) => self.c_address(address, true),
        }
    }
}

/// Collects fields in visiting order.
impl PointerCallback for Vec<Field> {
    fn field(&mut self, field: Field) {
        self.push(field);
    }
}

/// A contiguous run of words living at `base` whose relocatable fields can be
/// enumerated. Word 0 is the anchor: the image's own base address.
pub trait AnchoredImage {
    fn base(&self) -> usize;

    /// Every word of the image, in order.
    fn words(&self) -> &[Word];

    /// Reports each relocatable field exactly once, in a stable order.
    fn do_pointers(&self, callback: &mut dyn PointerCallback);

    fn byte_size(&self) -> usize {
        core::mem::size_of_val(self.words())
    }

    /// Image address of word `index`.
    fn address_of(&self, index: usize) -> usize {
        self.base() + index * types::WORD_SIZE
    }
}
