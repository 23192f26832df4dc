use core::{fmt, mem, ops::Range, slice};

use log::{debug, warn};
use types::{
    BUILTIN_CLASS_IDS_COUNT, BuiltinClass, INVOKE_BYTECODE_COUNT, InvokeBytecode, PROGRAM_ID_LEN,
    ProgramId, ROOT_COUNT, Root, TypeTag, UNSET_OFFSET, Value, WORD_SIZE, Word, is_word_aligned,
};

use crate::{
    arena::Arena,
    error::{HeapError, Result},
    header::{
        ANCHOR, BUILTIN_CLASS_IDS, HEADER_SIZE, HEADER_WORDS, HEAP_BEGIN, HEAP_TOP, ID,
        INVOKE_BYTECODE_OFFSETS, PROGRAM_SIZE, ROOTS, Table, table_range,
    },
    layout::{HeapObject, Objects},
    pointer::{AnchoredImage, Field, PointerCallback},
};

/// Element types a table can be viewed as. Every bit pattern is valid.
trait TableElement: Copy {}
impl TableElement for u16 {}
impl TableElement for i32 {}
impl TableElement for Value {}

/// An anchored, validated program image.
///
/// The image occupies the first `size` bytes of its arena and is addressed as
/// if word 0 lived at `base`. Values inside the image (heap references, table
/// addresses) are all relative to that base, so the same bytes can be
/// inspected at any host address.
pub struct Program {
    arena: Arena,
    base: usize,
    size: usize,
}

impl Program {
    /// Validates the image held by `arena` and anchors it at `base`.
    ///
    /// Checks the header, every table range, a gapless walk of the heap from
    /// begin to top, and that every relocatable field points inside the
    /// image (object slots at object starts).
    pub fn anchor(arena: Arena, base: usize) -> Result<Program> {
        let result = Self::check_header(arena, base).and_then(|program| {
            program.check_heap()?;
            Ok(program)
        });
        match &result {
            Ok(program) => debug!(
                "anchored program {} at 0x{:x}: {} bytes",
                program.id(),
                base,
                program.size
            ),
            Err(error) => warn!("rejected program image at 0x{:x}: {}", base, error),
        }
        result
    }

    fn check_header(arena: Arena, base: usize) -> Result<Program> {
        let words = arena.words();
        if words.len() < HEADER_WORDS {
            return Err(HeapError::Malformed("image shorter than header"));
        }
        if !is_word_aligned(base) || words[ANCHOR] != base {
            return Err(HeapError::Malformed("anchor does not match base"));
        }
        let size = words[PROGRAM_SIZE];
        if size % WORD_SIZE != 0 || size < HEADER_SIZE || size > arena.byte_size() {
            return Err(HeapError::Malformed("bad program size"));
        }
        let end = base
            .checked_add(size)
            .ok_or(HeapError::Malformed("image wraps the address space"))?;
        if words[HEAP_BEGIN] != base + HEADER_SIZE {
            return Err(HeapError::Malformed("heap does not follow header"));
        }
        let top = words[HEAP_TOP];
        if top < base + HEADER_SIZE || top > end || !is_word_aligned(top) {
            return Err(HeapError::Malformed("bad heap top"));
        }
        for table in Table::ALL {
            let range = table_range(words, base, table)
                .ok_or(HeapError::Malformed("bad table address"))?;
            if range.is_empty() {
                if words[table.data_index()] != 0 {
                    return Err(HeapError::Malformed("empty table with data"));
                }
                continue;
            }
            if range.start < top - base || range.end > size || range.start % WORD_SIZE != 0 {
                return Err(HeapError::Malformed("table outside external region"));
            }
        }
        let offsets = &words[INVOKE_BYTECODE_OFFSETS..INVOKE_BYTECODE_OFFSETS + INVOKE_BYTECODE_COUNT];
        if offsets.iter().any(|&offset| (offset as isize) < UNSET_OFFSET) {
            return Err(HeapError::Malformed("invoke offset out of range"));
        }
        Ok(Program { arena, base, size })
    }

    fn check_heap(&self) -> Result<()> {
        let heap = self.heap_indices();
        let class_bits = self.class_bits();
        let mut starts = vec![false; heap.len()];
        let mut index = heap.start;
        while index < heap.end {
            let object = HeapObject::parse(
                self.image_words(),
                self.bytes(),
                self.base,
                index,
                heap.end,
                class_bits,
            )?;
            if matches!(object.tag(), TypeTag::String | TypeTag::ByteArray) {
                object.payload()?;
            }
            starts[index - heap.start] = true;
            index += object.size_in_words();
        }

        let mut validator = Validator {
            program: self,
            starts: &starts,
            error: None,
        };
        self.do_pointers(&mut validator);
        match validator.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    /// Image size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn id(&self) -> ProgramId {
        let start = ID * WORD_SIZE;
        let mut bytes = [0u8; PROGRAM_ID_LEN];
        bytes.copy_from_slice(&self.bytes()[start..start + PROGRAM_ID_LEN]);
        ProgramId::new(bytes)
    }

    /// Image addresses of the first heap object and one past the last.
    pub fn heap_range(&self) -> Range<usize> {
        let words = self.image_words();
        words[HEAP_BEGIN]..words[HEAP_TOP]
    }

    fn heap_indices(&self) -> Range<usize> {
        HEADER_WORDS..(self.image_words()[HEAP_TOP] - self.base) / WORD_SIZE
    }

    fn image_words(&self) -> &[Word] {
        &self.arena.words()[..self.size / WORD_SIZE]
    }

    fn bytes(&self) -> &[u8] {
        &self.arena.bytes()[..self.size]
    }

    /// Image bytes, exactly `size()` of them.
    pub fn image_bytes(&self) -> &[u8] {
        self.bytes()
    }

    fn table<T: TableElement>(&self, table: Table) -> &[T] {
        debug_assert_eq!(mem::size_of::<T>(), table.element_size());
        let range = table_range(self.image_words(), self.base, table).unwrap_or(0..0);
        if range.is_empty() {
            return &[];
        }
        let bytes = &self.bytes()[range];
        assert_eq!(bytes.as_ptr() as usize % mem::align_of::<T>(), 0);
        // SAFETY: the range was validated to lie inside the image, starts word
        // aligned and is a whole number of elements; `T` accepts any bits.
        unsafe { slice::from_raw_parts(bytes.as_ptr().cast::<T>(), bytes.len() / mem::size_of::<T>()) }
    }

    pub fn class_bits(&self) -> &[u16] {
        self.table(Table::ClassBits)
    }

    pub fn class_check_ids(&self) -> &[u16] {
        self.table(Table::ClassCheckIds)
    }

    pub fn interface_check_offsets(&self) -> &[u16] {
        self.table(Table::InterfaceCheckOffsets)
    }

    pub fn dispatch_table(&self) -> &[i32] {
        self.table(Table::DispatchTable)
    }

    pub fn bytecodes(&self) -> &[u8] {
        let range = table_range(self.image_words(), self.base, Table::Bytecodes).unwrap_or(0..0);
        &self.bytes()[range]
    }

    pub fn global_variables(&self) -> &[Value] {
        self.table(Table::GlobalVariables)
    }

    pub fn literals(&self) -> &[Value] {
        self.table(Table::Literals)
    }

    pub fn root(&self, root: Root) -> Value {
        Value(self.image_words()[ROOTS + root.index()])
    }

    pub fn roots(&self) -> [Value; ROOT_COUNT] {
        core::array::from_fn(|index| Value(self.image_words()[ROOTS + index]))
    }

    pub fn builtin_class_id(&self, class: BuiltinClass) -> Value {
        Value(self.image_words()[BUILTIN_CLASS_IDS + class.index()])
    }

    pub fn builtin_class_ids(&self) -> [Value; BUILTIN_CLASS_IDS_COUNT] {
        core::array::from_fn(|index| Value(self.image_words()[BUILTIN_CLASS_IDS + index]))
    }

    /// Dispatch offset of an invoke bytecode, `-1` when unset.
    pub fn invoke_bytecode_offset(&self, bytecode: InvokeBytecode) -> isize {
        self.image_words()[INVOKE_BYTECODE_OFFSETS + bytecode.index()] as isize
    }

    /// Parses the heap object `value` refers to.
    pub fn object(&self, value: Value) -> Result<HeapObject<'_>> {
        let address = value
            .as_address()
            .ok_or(HeapError::Malformed("not a heap reference"))?;
        let heap = self.heap_range();
        if !heap.contains(&address) {
            return Err(HeapError::Malformed("reference outside heap"));
        }
        let index = (address - self.base) / WORD_SIZE;
        HeapObject::parse(
            self.image_words(),
            self.bytes(),
            self.base,
            index,
            self.heap_indices().end,
            self.class_bits(),
        )
    }

    /// Every heap object, in address order.
    pub fn objects(&self) -> Objects<'_> {
        Objects::new(
            self.image_words(),
            self.bytes(),
            self.base,
            self.class_bits(),
            self.heap_indices(),
        )
    }

    fn object_of(&self, value: Value, tag: TypeTag) -> Result<HeapObject<'_>> {
        let object = self.object(value)?;
        if object.tag() != tag {
            return Err(HeapError::Malformed("unexpected object type"));
        }
        Ok(object)
    }

    pub fn string_content(&self, value: Value) -> Result<&[u8]> {
        self.object_of(value, TypeTag::String)?.payload()
    }

    pub fn byte_array_content(&self, value: Value) -> Result<&[u8]> {
        self.object_of(value, TypeTag::ByteArray)?.payload()
    }

    pub fn double_value(&self, value: Value) -> Result<f64> {
        let bytes = self.object_of(value, TypeTag::Double)?.boxed_bytes()?;
        Ok(f64::from_ne_bytes(bytes))
    }

    pub fn large_integer_value(&self, value: Value) -> Result<i64> {
        let bytes = self.object_of(value, TypeTag::LargeInteger)?.boxed_bytes()?;
        Ok(i64::from_ne_bytes(bytes))
    }

    pub fn array_elements(&self, value: Value) -> Result<impl Iterator<Item = Value> + '_> {
        Ok(self.object_of(value, TypeTag::Array)?.values())
    }

    /// Fields of an instance or oddball.
    pub fn instance_fields(&self, value: Value) -> Result<impl Iterator<Item = Value> + '_> {
        let object = self.object(value)?;
        if !object.tag().has_fields() {
            return Err(HeapError::Malformed("unexpected object type"));
        }
        Ok(object.values())
    }

    /// Reports every relocatable field: header sentinels, roots and builtin
    /// class ids, object table entries, then the slots and external buffer
    /// addresses of each heap object in address order.
    pub fn do_pointers(&self, callback: &mut dyn PointerCallback) {
        let address = |index: usize| self.base + index * WORD_SIZE;
        for index in [ANCHOR, HEAP_BEGIN, HEAP_TOP] {
            callback.field(Field::SentinelAddress(address(index)));
        }
        for table in Table::ALL {
            callback.field(Field::SentinelAddress(address(table.data_index())));
        }
        for index in ROOTS..ROOTS + ROOT_COUNT + BUILTIN_CLASS_IDS_COUNT {
            callback.field(Field::ObjectSlot(address(index)));
        }
        for table in Table::ALL.into_iter().filter(|table| table.holds_values()) {
            let range = table_range(self.image_words(), self.base, table).unwrap_or(0..0);
            for offset in range.step_by(WORD_SIZE) {
                callback.field(Field::ObjectSlot(self.base + offset));
            }
        }
        for object in self.objects() {
            for index in object.slots() {
                callback.field(Field::ObjectSlot(address(index)));
            }
            if let Some(index) = object.external_buffer_index() {
                callback.field(Field::RawAddress(address(index)));
            }
        }
    }

    /// Makes the backing arena read-only.
    pub fn protect(&mut self) -> Result<()> {
        self.arena.protect()
    }

    pub fn is_protected(&self) -> bool {
        self.arena.is_protected()
    }

    pub fn into_arena(self) -> Arena {
        self.arena
    }
}

impl AnchoredImage for Program {
    fn base(&self) -> usize {
        self.base
    }

    fn words(&self) -> &[Word] {
        self.image_words()
    }

    fn do_pointers(&self, callback: &mut dyn PointerCallback) {
        Program::do_pointers(self, callback)
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("id", &self.id())
            .field("base", &format_args!("0x{:x}", self.base))
            .field("size", &self.size)
            .field("protected", &self.is_protected())
            .finish()
    }
}

/// Checks that every field reported by `do_pointers` refers into the image.
struct Validator<'a> {
    program: &'a Program,
    starts: &'a [bool],
    error: Option<HeapError>,
}

impl Validator<'_> {
    fn check(&self, field: Field) -> Result<()> {
        let program = self.program;
        let end = program.base + program.size;
        let word = program.image_words()[(field.address() - program.base) / WORD_SIZE];
        match field {
            Field::ObjectSlot(_) => {
                let Some(target) = Value(word).as_address() else {
                    return Ok(());
                };
                let heap = program.heap_range();
                let is_start = heap.contains(&target)
                    && is_word_aligned(target)
                    && self.starts[(target - heap.start) / WORD_SIZE];
                if !is_start {
                    return Err(HeapError::Malformed("reference to a non-object"));
                }
            }
            Field::RawAddress(_) => {
                if word != 0 && !(program.base..end).contains(&word) {
                    return Err(HeapError::Malformed("address outside image"));
                }
            }
            Field::SentinelAddress(_) => {
                if word != 0 && !(program.base..=end).contains(&word) {
                    return Err(HeapError::Malformed("address outside image"));
                }
            }
        }
        Ok(())
    }
}

impl PointerCallback for Validator<'_> {
    fn field(&mut self, field: Field) {
        if self.error.is_none() {
            self.error = self.check(field).err();
        }
    }
}
