use log::{debug, trace};
use snapshot::SnapshotAllocator;
use types::{
    BuiltinClass, ClassBits, InvokeBytecode, PROGRAM_ID_LEN, ProgramId, Root, TypeTag, Value,
    UNSET_OFFSET, WORD_SIZE, Word, decode_header, encode_header,
};

use crate::{
    arena::Arena,
    config::HeapConfig,
    error::{HeapError, Result},
    header::{
        ANCHOR, BUILTIN_CLASS_IDS, HEADER_SIZE, HEADER_WORDS, HEAP_BEGIN, HEAP_TOP, ID,
        INVOKE_BYTECODE_OFFSETS, PROGRAM_SIZE, ROOTS, Table, table_range,
    },
    layout::{
        ARRAY_ELEMENTS_OFFSET, BOXED_PAYLOAD_OFFSET, BOXED_SIZE, BYTE_ARRAY_DATA_OFFSET,
        HeapObject, LENGTH_OFFSET, ObjectSize, STRING_DATA_OFFSET, STRING_HASH_OFFSET, Storage,
        decode_length, encode_length, string_hash, variable_words,
    },
    program::Program,
};

/// Bump allocator that builds a program image inside one arena.
///
/// Heap objects grow up from the end of the header. Table data and large
/// string/byte array payloads grow down from the end of the arena.
/// [`ProgramHeap::finish`] closes the gap and hands out the anchored
/// [`Program`].
///
/// Allocation failures are reported as `None`; the heap never retries.
pub struct ProgramHeap {
    arena: Arena,
    config: HeapConfig,
    /// Word index of the next heap object.
    top: usize,
    /// Word index of the lowest external allocation.
    external: usize,
}

impl ProgramHeap {
    pub fn new(config: HeapConfig) -> Result<Self> {
        let mut arena = Arena::new(config.arena_size)?;
        if arena.len() < HEADER_WORDS {
            return Err(HeapError::OutOfMemory);
        }
        let base = arena.address();
        let external = arena.len();
        let words = arena.words_mut();
        words[ANCHOR] = base;
        words[HEAP_BEGIN] = base + HEADER_SIZE;
        words[HEAP_TOP] = base + HEADER_SIZE;
        for offset in &mut words[INVOKE_BYTECODE_OFFSETS..HEADER_WORDS] {
            *offset = UNSET_OFFSET as Word;
        }
        debug!(
            "program heap at 0x{:x}: {} bytes",
            base,
            arena.byte_size()
        );
        Ok(Self {
            arena,
            config,
            top: HEADER_WORDS,
            external,
        })
    }

    /// Address the image is being built at.
    pub fn base(&self) -> usize {
        self.arena.address()
    }

    /// Bytes left between the heap and the external region.
    pub fn available(&self) -> usize {
        (self.external - self.top) * WORD_SIZE
    }

    fn address_of(&self, index: usize) -> usize {
        self.base() + index * WORD_SIZE
    }

    fn index_of(&self, address: usize) -> usize {
        (address - self.base()) / WORD_SIZE
    }

    /// Reserves `count` bytes, rounded up to whole words, at the heap top.
    pub fn allocate_bytes(&mut self, count: usize) -> Option<usize> {
        let words = count.checked_add(WORD_SIZE - 1)? / WORD_SIZE;
        let end = self.top.checked_add(words)?;
        if end > self.external {
            trace!("heap exhausted allocating {} bytes", count);
            return None;
        }
        let address = self.address_of(self.top);
        self.top = end;
        Some(address)
    }

    /// Reserves `count` bytes, rounded up to whole words, below the external
    /// region.
    pub fn allocate_external(&mut self, count: usize) -> Option<usize> {
        let words = count.checked_add(WORD_SIZE - 1)? / WORD_SIZE;
        let start = self.external.checked_sub(words)?;
        if start < self.top {
            trace!("external region exhausted allocating {} bytes", count);
            return None;
        }
        self.external = start;
        Some(self.address_of(start))
    }

    fn class(&self, class_id: u16) -> ClassBits {
        let range = table_range(self.arena.words(), self.base(), Table::ClassBits).unwrap_or(0..0);
        let offset = range.start + class_id as usize * 2;
        match self.arena.bytes().get(offset..offset + 2) {
            Some(raw) if offset < range.end => ClassBits(u16::from_ne_bytes([raw[0], raw[1]])),
            _ => panic!("unknown class id {}", class_id),
        }
    }

    fn expect_tag(&self, class_id: u16, tag: TypeTag) -> ClassBits {
        let bits = self.class(class_id);
        assert_eq!(bits.tag(), Some(tag), "class {} has the wrong type", class_id);
        bits
    }

    fn write_header(&mut self, index: usize, class_id: u16, tag: TypeTag) {
        self.arena.words_mut()[index] = encode_header(class_id, tag).raw();
    }

    fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.arena.bytes_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn allocate_words(&mut self, words: usize) -> Option<usize> {
        let address = self.allocate_bytes(words.checked_mul(WORD_SIZE)?)?;
        Some(self.index_of(address))
    }

    /// Array of `length` elements, each set to `filler`.
    pub fn allocate_array(&mut self, class_id: u16, length: usize, filler: Value) -> Option<Value> {
        self.expect_tag(class_id, TypeTag::Array);
        let index = self.allocate_words(variable_words(TypeTag::Array, length, Storage::Inline)?)?;
        self.write_header(index, class_id, TypeTag::Array);
        let words = self.arena.words_mut();
        words[index + LENGTH_OFFSET] = encode_length(length, Storage::Inline).raw();
        words[index + ARRAY_ELEMENTS_OFFSET..index + ARRAY_ELEMENTS_OFFSET + length]
            .fill(filler.raw());
        Some(Value::from_address(self.address_of(index)))
    }

    pub fn allocate_byte_array(&mut self, class_id: u16, bytes: &[u8]) -> Option<Value> {
        self.expect_tag(class_id, TypeTag::ByteArray);
        let storage = Storage::for_payload(bytes.len());
        let buffer = match storage {
            Storage::Inline => None,
            Storage::External => Some(self.allocate_external(bytes.len())?),
        };
        let index =
            self.allocate_words(variable_words(TypeTag::ByteArray, bytes.len(), storage)?)?;
        self.write_header(index, class_id, TypeTag::ByteArray);
        self.arena.words_mut()[index + LENGTH_OFFSET] = encode_length(bytes.len(), storage).raw();
        let offset = match buffer {
            Some(address) => {
                self.arena.words_mut()[index + BYTE_ARRAY_DATA_OFFSET] = address;
                address - self.base()
            }
            None => (index + BYTE_ARRAY_DATA_OFFSET) * WORD_SIZE,
        };
        self.write_bytes(offset, bytes);
        Some(Value::from_address(self.address_of(index)))
    }

    /// String with its content hash. The payload is NUL terminated.
    pub fn allocate_string(&mut self, class_id: u16, bytes: &[u8]) -> Option<Value> {
        self.expect_tag(class_id, TypeTag::String);
        let storage = Storage::for_payload(bytes.len());
        let buffer = match storage {
            Storage::Inline => None,
            Storage::External => Some(self.allocate_external(bytes.len() + 1)?),
        };
        let index = self.allocate_words(variable_words(TypeTag::String, bytes.len(), storage)?)?;
        self.write_header(index, class_id, TypeTag::String);
        let base = self.base();
        let words = self.arena.words_mut();
        words[index + LENGTH_OFFSET] = encode_length(bytes.len(), storage).raw();
        words[index + STRING_HASH_OFFSET] = Value::from_smi(string_hash(bytes)).raw();
        let offset = match buffer {
            Some(address) => {
                words[index + STRING_DATA_OFFSET] = address;
                address - base
            }
            None => (index + STRING_DATA_OFFSET) * WORD_SIZE,
        };
        self.write_bytes(offset, bytes);
        Some(Value::from_address(self.address_of(index)))
    }

    /// Instance or oddball with every field set to Smi zero.
    pub fn allocate_instance(&mut self, class_id: u16) -> Option<Value> {
        let bits = self.class(class_id);
        let tag = match bits.tag() {
            Some(tag) if tag.has_fields() => tag,
            _ => panic!("class {} is not an instance class", class_id),
        };
        let Ok(ObjectSize::Fixed(size)) = ObjectSize::of(bits) else {
            panic!("class {} has no instance size", class_id);
        };
        let index = self.allocate_words(size / WORD_SIZE)?;
        self.write_header(index, class_id, tag);
        Some(Value::from_address(self.address_of(index)))
    }

    fn allocate_boxed(&mut self, class_id: u16, tag: TypeTag, payload: [u8; 8]) -> Option<Value> {
        self.expect_tag(class_id, tag);
        let index = self.allocate_words(BOXED_SIZE / WORD_SIZE)?;
        self.write_header(index, class_id, tag);
        self.write_bytes((index + BOXED_PAYLOAD_OFFSET) * WORD_SIZE, &payload);
        Some(Value::from_address(self.address_of(index)))
    }

    pub fn allocate_double(&mut self, class_id: u16, value: f64) -> Option<Value> {
        self.allocate_boxed(class_id, TypeTag::Double, value.to_ne_bytes())
    }

    pub fn allocate_large_integer(&mut self, class_id: u16, value: i64) -> Option<Value> {
        self.allocate_boxed(class_id, TypeTag::LargeInteger, value.to_ne_bytes())
    }

    /// Writes element `index` of an array or field `index` of an instance.
    pub fn store(&mut self, object: Value, index: usize, value: Value) {
        let address = match object.as_address() {
            Some(address) => address,
            None => panic!("store into a small integer"),
        };
        let start = self.index_of(address);
        let header = Value(self.arena.words()[start]);
        let (class_id, _) = match decode_header(header) {
            Some(decoded) => decoded,
            None => panic!("store into a non-object at 0x{:x}", address),
        };
        let bits = self.class(class_id);
        let (first, count) = match bits.tag() {
            Some(TypeTag::Array) => {
                let length = decode_length(Value(self.arena.words()[start + LENGTH_OFFSET]));
                (ARRAY_ELEMENTS_OFFSET, length.map_or(0, |(length, _)| length))
            }
            Some(TypeTag::Instance | TypeTag::Oddball) => {
                (1, bits.instance_size() / WORD_SIZE - 1)
            }
            _ => panic!("class {} has no slots", class_id),
        };
        assert!(index < count, "slot {} out of range ({})", index, count);
        self.arena.words_mut()[start + first + index] = value.raw();
    }

    fn set_table(&mut self, table: Table, bytes: &[u8], length: usize) -> Result<()> {
        let data = if length == 0 {
            0
        } else {
            let address = self.allocate_external(bytes.len()).ok_or(HeapError::OutOfMemory)?;
            let offset = address - self.base();
            self.write_bytes(offset, bytes);
            address
        };
        let words = self.arena.words_mut();
        words[table.data_index()] = data;
        words[table.length_index()] = length;
        Ok(())
    }

    /// Replaces the class table. Must precede any object allocation that
    /// uses the classes.
    pub fn set_class_bits(&mut self, class_bits: &[u16]) -> Result<()> {
        let bytes: Vec<u8> = class_bits.iter().flat_map(|bits| bits.to_ne_bytes()).collect();
        self.set_table(Table::ClassBits, &bytes, class_bits.len())
    }

    pub fn set_class_check_ids(&mut self, ids: &[u16]) -> Result<()> {
        let bytes: Vec<u8> = ids.iter().flat_map(|id| id.to_ne_bytes()).collect();
        self.set_table(Table::ClassCheckIds, &bytes, ids.len())
    }

    pub fn set_interface_check_offsets(&mut self, offsets: &[u16]) -> Result<()> {
        let bytes: Vec<u8> = offsets.iter().flat_map(|offset| offset.to_ne_bytes()).collect();
        self.set_table(Table::InterfaceCheckOffsets, &bytes, offsets.len())
    }

    pub fn set_dispatch_table(&mut self, dispatch_table: &[i32]) -> Result<()> {
        let bytes: Vec<u8> = dispatch_table.iter().flat_map(|entry| entry.to_ne_bytes()).collect();
        self.set_table(Table::DispatchTable, &bytes, dispatch_table.len())
    }

    pub fn set_bytecodes(&mut self, bytecodes: &[u8]) -> Result<()> {
        self.set_table(Table::Bytecodes, bytecodes, bytecodes.len())
    }

    pub fn set_global_variables(&mut self, values: &[Value]) -> Result<()> {
        let bytes: Vec<u8> = values.iter().flat_map(|value| value.raw().to_ne_bytes()).collect();
        self.set_table(Table::GlobalVariables, &bytes, values.len())
    }

    pub fn set_literals(&mut self, values: &[Value]) -> Result<()> {
        let bytes: Vec<u8> = values.iter().flat_map(|value| value.raw().to_ne_bytes()).collect();
        self.set_table(Table::Literals, &bytes, values.len())
    }

    pub fn set_root(&mut self, root: Root, value: Value) {
        self.arena.words_mut()[ROOTS + root.index()] = value.raw();
    }

    pub fn set_builtin_class_id(&mut self, class: BuiltinClass, value: Value) {
        self.arena.words_mut()[BUILTIN_CLASS_IDS + class.index()] = value.raw();
    }

    /// `offset` is a dispatch offset or `UNSET_OFFSET`.
    pub fn set_invoke_bytecode_offset(&mut self, bytecode: InvokeBytecode, offset: isize) {
        assert!(offset >= UNSET_OFFSET, "invoke offset {} out of range", offset);
        self.arena.words_mut()[INVOKE_BYTECODE_OFFSETS + bytecode.index()] = offset as Word;
    }

    pub fn set_id(&mut self, id: ProgramId) {
        let start = ID * WORD_SIZE;
        self.arena.bytes_mut()[start..start + PROGRAM_ID_LEN].copy_from_slice(&id.to_bytes());
    }

    /// Allocates the null/true/false oddballs, the empty array and the error
    /// strings, and fills in the builtin class ids.
    ///
    /// Expects the first classes of the class table to be [`core_class_bits`].
    pub fn install_core_roots(&mut self) -> Result<()> {
        let class_id = |class: BuiltinClass| class.index() as u16;
        let null = self
            .allocate_instance(class_id(BuiltinClass::Null))
            .ok_or(HeapError::OutOfMemory)?;
        let true_object = self
            .allocate_instance(class_id(BuiltinClass::True))
            .ok_or(HeapError::OutOfMemory)?;
        let false_object = self
            .allocate_instance(class_id(BuiltinClass::False))
            .ok_or(HeapError::OutOfMemory)?;
        let empty_array = self
            .allocate_array(class_id(BuiltinClass::Array), 0, null)
            .ok_or(HeapError::OutOfMemory)?;
        self.set_root(Root::Null, null);
        self.set_root(Root::True, true_object);
        self.set_root(Root::False, false_object);
        self.set_root(Root::EmptyArray, empty_array);

        for root in Root::ALL {
            if let Some(message) = root.error_message() {
                let string = self
                    .allocate_string(class_id(BuiltinClass::String), message.as_bytes())
                    .ok_or(HeapError::OutOfMemory)?;
                self.set_root(root, string);
            }
        }
        for class in BuiltinClass::ALL {
            self.set_builtin_class_id(class, Value::from_smi(class.index() as isize));
        }
        Ok(())
    }

    /// Closes the gap between heap and external region, stamps the heap top
    /// and program size, and anchors the image at the arena's address.
    pub fn finish(mut self) -> Result<Program> {
        let base = self.base();
        let len = self.arena.len();
        let moved = len - self.external;
        let gap = self.external - self.top;

        if gap > 0 && moved > 0 {
            let low = self.address_of(self.external);
            let high = self.address_of(len);
            let delta = gap * WORD_SIZE;
            let mut fields: Vec<usize> = Table::ALL.iter().map(|table| table.data_index()).collect();
            {
                let class_bits = self.class_bits();
                let words = self.arena.words();
                let bytes = self.arena.bytes();
                let mut index = HEADER_WORDS;
                while index < self.top {
                    let object = HeapObject::parse(words, bytes, base, index, self.top, &class_bits)?;
                    fields.extend(object.external_buffer_index());
                    index += object.size_in_words();
                }
            }
            let words = self.arena.words_mut();
            for index in fields {
                if (low..=high).contains(&words[index]) {
                    words[index] -= delta;
                }
            }
            words.copy_within(self.external..len, self.top);
            words[self.top + moved..].fill(0);
        }

        let size = (self.top + moved) * WORD_SIZE;
        let top = self.address_of(self.top);
        let words = self.arena.words_mut();
        words[HEAP_TOP] = top;
        words[PROGRAM_SIZE] = size;
        debug!(
            "finished program image at 0x{:x}: {} bytes, heap {} bytes",
            base,
            size,
            top - base - HEADER_SIZE
        );

        let protect = self.config.protect;
        let mut program = Program::anchor(self.arena, base)?;
        if protect {
            program.protect()?;
        }
        Ok(program)
    }

    fn class_bits(&self) -> Vec<u16> {
        let range = table_range(self.arena.words(), self.base(), Table::ClassBits).unwrap_or(0..0);
        self.arena.bytes()[range]
            .chunks_exact(2)
            .map(|raw| u16::from_ne_bytes([raw[0], raw[1]]))
            .collect()
    }
}

impl SnapshotAllocator for ProgramHeap {
    fn allocate_array(&mut self, class_id: u16, length: usize, filler: Value) -> Option<Value> {
        ProgramHeap::allocate_array(self, class_id, length, filler)
    }

    fn allocate_byte_array(&mut self, class_id: u16, bytes: &[u8]) -> Option<Value> {
        ProgramHeap::allocate_byte_array(self, class_id, bytes)
    }

    fn allocate_string(&mut self, class_id: u16, bytes: &[u8]) -> Option<Value> {
        ProgramHeap::allocate_string(self, class_id, bytes)
    }

    fn allocate_instance(&mut self, class_id: u16) -> Option<Value> {
        ProgramHeap::allocate_instance(self, class_id)
    }

    fn allocate_double(&mut self, class_id: u16, value: f64) -> Option<Value> {
        ProgramHeap::allocate_double(self, class_id, value)
    }

    fn allocate_large_integer(&mut self, class_id: u16, value: i64) -> Option<Value> {
        ProgramHeap::allocate_large_integer(self, class_id, value)
    }

    fn store(&mut self, object: Value, index: usize, value: Value) {
        ProgramHeap::store(self, object, index, value)
    }
}

/// Class table entries for the builtin classes, indexed by
/// [`BuiltinClass::index`].
pub fn core_class_bits() -> Vec<u16> {
    BuiltinClass::ALL
        .iter()
        .map(|class| {
            let bits = match class {
                BuiltinClass::Object | BuiltinClass::SmallInteger => {
                    ClassBits::new(TypeTag::Instance, WORD_SIZE)
                }
                BuiltinClass::Null | BuiltinClass::True | BuiltinClass::False => {
                    ClassBits::new(TypeTag::Oddball, WORD_SIZE)
                }
                BuiltinClass::Array => ClassBits::variable(TypeTag::Array),
                BuiltinClass::ByteArray => ClassBits::variable(TypeTag::ByteArray),
                BuiltinClass::String => ClassBits::variable(TypeTag::String),
                BuiltinClass::Double => ClassBits::new(TypeTag::Double, BOXED_SIZE),
                BuiltinClass::LargeInteger => ClassBits::new(TypeTag::LargeInteger, BOXED_SIZE),
            };
            bits.0
        })
        .collect()
}
