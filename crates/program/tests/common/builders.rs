#![allow(dead_code)]

use program::{HeapConfig, Program, ProgramHeap, core_class_bits};
use types::{BuiltinClass, ClassBits, InvokeBytecode, TypeTag, Value, WORD_SIZE};

/// Instance class with two fields, appended after the core classes.
pub const POINT_CLASS: u16 = 10;

pub const LONG_TEXT_LEN: usize = 200;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn class_id(class: BuiltinClass) -> u16 {
    class.index() as u16
}

pub fn class_bits() -> Vec<u16> {
    let mut bits = core_class_bits();
    bits.push(ClassBits::new(TypeTag::Instance, 3 * WORD_SIZE).0);
    bits
}

pub fn long_text() -> Vec<u8> {
    (0..LONG_TEXT_LEN).map(|i| b'a' + (i % 26) as u8).collect()
}

/// A heap with the core classes, roots and a point class installed.
pub fn core_heap(config: HeapConfig) -> ProgramHeap {
    let mut heap = ProgramHeap::new(config).expect("heap");
    heap.set_class_bits(&class_bits()).expect("class bits");
    heap.install_core_roots().expect("core roots");
    heap
}

/// A program exercising every object type, inline and external payloads,
/// shared objects and a cycle.
pub fn sample_program(config: HeapConfig) -> Program {
    let mut heap = core_heap(config);

    let hello = heap.allocate_string(class_id(BuiltinClass::String), b"hello").unwrap();
    let long = heap.allocate_string(class_id(BuiltinClass::String), &long_text()).unwrap();
    let small_bytes = heap
        .allocate_byte_array(class_id(BuiltinClass::ByteArray), &[1, 2, 3])
        .unwrap();
    let big_bytes = heap
        .allocate_byte_array(class_id(BuiltinClass::ByteArray), &[0xab; 300])
        .unwrap();
    let pi = heap.allocate_double(class_id(BuiltinClass::Double), 3.5).unwrap();
    let large = heap
        .allocate_large_integer(class_id(BuiltinClass::LargeInteger), i64::MIN + 7)
        .unwrap();

    let point = heap.allocate_instance(POINT_CLASS).unwrap();
    heap.store(point, 0, point);
    heap.store(point, 1, hello);

    let list = heap
        .allocate_array(class_id(BuiltinClass::Array), 4, Value::from_smi(0))
        .unwrap();
    heap.store(list, 0, Value::from_smi(-42));
    heap.store(list, 1, hello);
    heap.store(list, 2, long);
    heap.store(list, 3, point);

    heap.set_global_variables(&[list, Value::from_smi(7), pi]).unwrap();
    heap.set_literals(&[hello, small_bytes, big_bytes, large]).unwrap();
    heap.set_bytecodes(&[0x01, 0x02, 0x03, 0x04, 0x05]).unwrap();
    heap.set_dispatch_table(&[0, 12, -5, 40]).unwrap();
    heap.set_class_check_ids(&[0, 3, 3, 9]).unwrap();
    heap.set_interface_check_offsets(&[7]).unwrap();
    heap.set_invoke_bytecode_offset(InvokeBytecode::Add, 12);
    heap.set_invoke_bytecode_offset(InvokeBytecode::Size, 0);
    heap.finish().expect("finish")
}

/// Arrays nested `depth` levels deep, innermost holding a Smi.
pub fn deep_program(config: HeapConfig, depth: usize) -> Program {
    let mut heap = core_heap(config);
    let mut inner = Value::from_smi(1);
    for _ in 0..depth {
        let array = heap
            .allocate_array(class_id(BuiltinClass::Array), 1, inner)
            .unwrap();
        inner = array;
    }
    heap.set_global_variables(&[inner]).unwrap();
    heap.finish().expect("finish")
}
