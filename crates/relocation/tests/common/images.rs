#![allow(dead_code)]

use program::{AnchoredImage, Arena, Field, HeapConfig, PointerCallback, Program, ProgramHeap, SnapshotGenerator, core_class_bits};
use types::{BuiltinClass, Value, Word};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Hand-built image whose only relocatable word is the anchor at word 0.
pub struct WordImage {
    pub arena: Arena,
    pub len: usize,
    pub extra_fields: Vec<Field>,
}

impl WordImage {
    /// `words[0]` is replaced by the arena address.
    pub fn new(words: &[Word]) -> Self {
        let mut arena = Arena::from_words(words).unwrap();
        let base = arena.address();
        arena.words_mut()[0] = base;
        Self {
            arena,
            len: words.len(),
            extra_fields: Vec::new(),
        }
    }
}

impl AnchoredImage for WordImage {
    fn base(&self) -> usize {
        self.arena.address()
    }

    fn words(&self) -> &[Word] {
        &self.arena.words()[..self.len]
    }

    fn do_pointers(&self, callback: &mut dyn PointerCallback) {
        callback.field(Field::SentinelAddress(self.base()));
        for field in &self.extra_fields {
            callback.field(*field);
        }
    }
}

fn class_id(class: BuiltinClass) -> u16 {
    class.index() as u16
}

/// A program with inline and external payloads, shared objects and a cycle.
pub fn sample_program() -> Program {
    let mut heap = ProgramHeap::new(HeapConfig::default()).unwrap();
    heap.set_class_bits(&core_class_bits()).unwrap();
    heap.install_core_roots().unwrap();

    let short = heap.allocate_string(class_id(BuiltinClass::String), b"short").unwrap();
    let long_text = vec![b'x'; 1000];
    let long = heap.allocate_string(class_id(BuiltinClass::String), &long_text).unwrap();
    let blob = heap
        .allocate_byte_array(class_id(BuiltinClass::ByteArray), &[7; 513])
        .unwrap();
    let number = heap.allocate_double(class_id(BuiltinClass::Double), -0.25).unwrap();
    let list = heap
        .allocate_array(class_id(BuiltinClass::Array), 5, Value::from_smi(3))
        .unwrap();
    heap.store(list, 0, short);
    heap.store(list, 1, long);
    heap.store(list, 2, list);
    heap.store(list, 4, number);

    heap.set_global_variables(&[list, blob]).unwrap();
    heap.set_literals(&[short, Value::from_smi(-9)]).unwrap();
    heap.set_bytecodes(&(0..=255).collect::<Vec<u8>>()).unwrap();
    heap.set_dispatch_table(&[4, 8, 15, 16, 23, 42]).unwrap();
    heap.finish().unwrap()
}

pub fn snapshot_bytes(program: &Program) -> Vec<u8> {
    SnapshotGenerator::new(program).generate().unwrap().into_bytes()
}
