//! Reading and writing programs in the snapshot format.

use log::{debug, warn};
use sha2::{Digest, Sha256};
use snapshot::{
    ObjectKind, ReadReferences, Result, SnapshotAllocator, SnapshotError, SnapshotReader,
    SnapshotWriter, WriteReferences,
};
use types::{
    BuiltinClass, ClassBits, InvokeBytecode, PROGRAM_ID_LEN, ProgramId, Root, TypeTag, Value,
    WORD_SIZE,
};

use crate::{config::HeapConfig, heap::ProgramHeap, layout::ObjectSize, program::Program};

impl Program {
    /// Writes the tables, the object graph reachable from the object tables
    /// and roots, and the invoke offsets.
    pub fn write(&self, writer: &mut SnapshotWriter) -> Result<()> {
        writer.write_u16_list(self.class_bits());
        writer.write_u16_list(self.class_check_ids());
        writer.write_u16_list(self.interface_check_offsets());
        writer.write_i32_list(self.dispatch_table());
        writer.write_byte_list(self.bytecodes());

        let mut objects = ObjectWriter::new(self);
        for table in [self.global_variables(), self.literals()] {
            writer.write_cardinal(table.len() as u64);
            for value in table {
                objects.write_object(writer, *value)?;
            }
        }
        for value in self.roots().into_iter().chain(self.builtin_class_ids()) {
            objects.write_object(writer, value)?;
        }
        for bytecode in InvokeBytecode::ALL {
            let biased = self
                .invoke_bytecode_offset(bytecode)
                .checked_add(1)
                .and_then(|offset| u64::try_from(offset).ok())
                .ok_or(SnapshotError::Format("invoke offset out of range"))?;
            writer.write_cardinal(biased);
        }
        Ok(())
    }

    /// Reads a program written by [`Program::write`] into `heap`, leaving it
    /// ready for [`ProgramHeap::finish`]. The snapshot must be consumed
    /// exactly.
    pub fn read(reader: &mut SnapshotReader<'_>, heap: &mut ProgramHeap) -> Result<()> {
        let class_bits = reader.read_u16_list()?;
        heap.set_class_bits(&class_bits)?;
        heap.set_class_check_ids(&reader.read_u16_list()?)?;
        heap.set_interface_check_offsets(&reader.read_u16_list()?)?;
        heap.set_dispatch_table(&reader.read_i32_list()?)?;
        heap.set_bytecodes(reader.read_byte_list()?)?;

        let mut objects = ObjectReader::new(&class_bits);
        let globals = objects.read_table(reader, heap)?;
        heap.set_global_variables(&globals)?;
        let literals = objects.read_table(reader, heap)?;
        heap.set_literals(&literals)?;

        for root in Root::ALL {
            let value = objects.read_object(reader, heap)?;
            heap.set_root(root, value);
        }
        for class in BuiltinClass::ALL {
            let value = objects.read_object(reader, heap)?;
            heap.set_builtin_class_id(class, value);
        }
        for bytecode in InvokeBytecode::ALL {
            let offset = reader
                .read_cardinal()?
                .checked_sub(1)
                .map_or(Some(-1), |offset| isize::try_from(offset).ok())
                .ok_or(SnapshotError::Format("invoke offset out of range"))?;
            heap.set_invoke_bytecode_offset(bytecode, offset);
        }
        reader.expect_eos()?;
        debug!(
            "read program snapshot: {} bytes, {} objects",
            reader.position(),
            objects.references.len()
        );
        Ok(())
    }
}

/// Writes object graphs depth first without recursion. Every heap object is
/// written once; later occurrences become back references.
struct ObjectWriter<'a> {
    program: &'a Program,
    references: WriteReferences,
    stack: Vec<Value>,
}

impl<'a> ObjectWriter<'a> {
    fn new(program: &'a Program) -> Self {
        Self {
            program,
            references: WriteReferences::new(),
            stack: Vec::new(),
        }
    }

    fn write_object(&mut self, writer: &mut SnapshotWriter, root: Value) -> Result<()> {
        self.stack.push(root);
        while let Some(value) = self.stack.pop() {
            let Some(address) = value.as_address() else {
                writer.write_cardinal(ObjectKind::Smi as u64);
                writer.write_int(value.as_smi().unwrap_or_default() as i64);
                continue;
            };
            if let Some(index) = self.references.lookup(address) {
                writer.write_cardinal(ObjectKind::BackReference as u64);
                writer.write_cardinal(index);
                continue;
            }
            self.references.register(address);

            let object = self.program.object(value)?;
            writer.write_cardinal(ObjectKind::HeapObject as u64);
            writer.write_cardinal(object.class_id() as u64);
            match object.tag() {
                TypeTag::Array => {
                    let start = self.stack.len();
                    self.stack.extend(object.values());
                    writer.write_cardinal((self.stack.len() - start) as u64);
                    self.stack[start..].reverse();
                }
                TypeTag::Instance | TypeTag::Oddball => {
                    let start = self.stack.len();
                    self.stack.extend(object.values());
                    self.stack[start..].reverse();
                }
                TypeTag::String | TypeTag::ByteArray => writer.write_byte_list(object.payload()?),
                TypeTag::Double => writer.write_double(f64::from_ne_bytes(object.boxed_bytes()?)),
                TypeTag::LargeInteger => {
                    writer.write_i64(i64::from_ne_bytes(object.boxed_bytes()?))
                }
            }
        }
        Ok(())
    }
}

/// Children still to be read into an array or instance.
struct Frame {
    object: Value,
    next: usize,
    count: usize,
}

/// Mirror of [`ObjectWriter`]: allocates each object as soon as its header is
/// read, then fills its slots in order.
struct ObjectReader<'c> {
    class_bits: &'c [u16],
    references: ReadReferences,
    frames: Vec<Frame>,
}

impl<'c> ObjectReader<'c> {
    fn new(class_bits: &'c [u16]) -> Self {
        Self {
            class_bits,
            references: ReadReferences::new(),
            frames: Vec::new(),
        }
    }

    fn read_table<A: SnapshotAllocator>(
        &mut self,
        reader: &mut SnapshotReader<'_>,
        allocator: &mut A,
    ) -> Result<Vec<Value>> {
        let length = reader.read_length()?;
        if length > reader.remaining() {
            return Err(SnapshotError::Format("table length exceeds snapshot"));
        }
        let mut values = Vec::with_capacity(length);
        for _ in 0..length {
            values.push(self.read_object(reader, allocator)?);
        }
        Ok(values)
    }

    fn read_object<A: SnapshotAllocator>(
        &mut self,
        reader: &mut SnapshotReader<'_>,
        allocator: &mut A,
    ) -> Result<Value> {
        let root = self.read_item(reader, allocator)?;
        while let Some(frame) = self.frames.last_mut() {
            if frame.next == frame.count {
                self.frames.pop();
                continue;
            }
            let (object, index) = (frame.object, frame.next);
            frame.next += 1;
            let value = self.read_item(reader, allocator)?;
            allocator.store(object, index, value);
        }
        Ok(root)
    }

    /// Reads one object. Arrays and instances with slots push a frame that
    /// the caller drains.
    fn read_item<A: SnapshotAllocator>(
        &mut self,
        reader: &mut SnapshotReader<'_>,
        allocator: &mut A,
    ) -> Result<Value> {
        match ObjectKind::from_cardinal(reader.read_cardinal()?)? {
            ObjectKind::Smi => Value::try_from_smi(reader.read_int()?)
                .ok_or(SnapshotError::Format("small integer out of range")),
            ObjectKind::BackReference => self.references.get(reader.read_cardinal()?),
            ObjectKind::HeapObject => {
                let class_id = u16::try_from(reader.read_cardinal()?)
                    .map_err(|_| SnapshotError::Format("class id out of range"))?;
                let bits = self
                    .class_bits
                    .get(class_id as usize)
                    .map(|bits| ClassBits(*bits))
                    .ok_or(SnapshotError::Format("unknown class id"))?;
                let tag = bits.tag().ok_or(SnapshotError::Format("unknown type tag"))?;

                let (object, count) = match tag {
                    TypeTag::Array => {
                        let length = reader.read_length()?;
                        if length > reader.remaining() {
                            return Err(SnapshotError::Format("array length exceeds snapshot"));
                        }
                        (allocator.allocate_array(class_id, length, Value::ZERO), length)
                    }
                    TypeTag::Instance | TypeTag::Oddball => {
                        let Ok(ObjectSize::Fixed(size)) = ObjectSize::of(bits) else {
                            return Err(SnapshotError::Format("instance class without size"));
                        };
                        (allocator.allocate_instance(class_id), size / WORD_SIZE - 1)
                    }
                    TypeTag::String => {
                        let bytes = reader.read_byte_list()?;
                        (allocator.allocate_string(class_id, bytes), 0)
                    }
                    TypeTag::ByteArray => {
                        let bytes = reader.read_byte_list()?;
                        (allocator.allocate_byte_array(class_id, bytes), 0)
                    }
                    TypeTag::Double => {
                        let value = reader.read_double()?;
                        (allocator.allocate_double(class_id, value), 0)
                    }
                    TypeTag::LargeInteger => {
                        let value = reader.read_i64()?;
                        (allocator.allocate_large_integer(class_id, value), 0)
                    }
                };
                let object = object.ok_or(SnapshotError::OutOfMemory)?;
                self.references.register(object);
                if count > 0 {
                    self.frames.push(Frame {
                        object,
                        next: 0,
                        count,
                    });
                }
                Ok(object)
            }
        }
    }
}

/// Owned snapshot bytes, the hand-off between a writer and a loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    bytes: Vec<u8>,
}

impl Snapshot {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Name-based UUID (version 5 layout) derived from the SHA-256 of the
    /// snapshot bytes.
    pub fn compute_id(&self) -> ProgramId {
        let digest = Sha256::digest(&self.bytes);
        let mut bytes = [0u8; PROGRAM_ID_LEN];
        bytes.copy_from_slice(&digest[..PROGRAM_ID_LEN]);
        bytes[6] = (bytes[6] & 0x0f) | 0x50;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        ProgramId::new(bytes)
    }

    /// Reads the snapshot into a fresh heap and returns the anchored program
    /// stamped with `id`.
    pub fn read_image(&self, config: HeapConfig, id: ProgramId) -> Result<Program> {
        let result = (|| -> Result<Program> {
            let mut heap = ProgramHeap::new(config)?;
            let mut reader = SnapshotReader::new(&self.bytes);
            Program::read(&mut reader, &mut heap)?;
            heap.set_id(id);
            Ok(heap.finish()?)
        })();
        if let Err(error) = &result {
            warn!("rejected snapshot of {} bytes: {}", self.bytes.len(), error);
        }
        result
    }
}

impl From<Vec<u8>> for Snapshot {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

/// Serializes a program in two passes: a counting pass that sizes the
/// buffer, then the real write into a buffer of exactly that size.
pub struct SnapshotGenerator<'a> {
    program: &'a Program,
}

impl<'a> SnapshotGenerator<'a> {
    pub fn new(program: &'a Program) -> Self {
        Self { program }
    }

    /// Byte length of the snapshot, without producing it.
    pub fn size(&self) -> Result<usize> {
        let mut counter = SnapshotWriter::counting();
        self.program.write(&mut counter)?;
        Ok(counter.len())
    }

    pub fn generate(&self) -> Result<Snapshot> {
        let size = self.size()?;
        let mut writer = SnapshotWriter::with_capacity(size);
        self.program.write(&mut writer)?;
        debug_assert_eq!(writer.len(), size);
        debug!(
            "generated snapshot of program {}: {} bytes",
            self.program.id(),
            size
        );
        Ok(Snapshot::new(writer.into_bytes()))
    }
}
