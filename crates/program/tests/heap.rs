#[path = "common/builders.rs"]
mod builders;

use builders::{LONG_TEXT_LEN, POINT_CLASS, class_id, core_heap, init_logger, long_text, sample_program};
use program::{
    Field, HeapConfig, HeapError, Program, ProgramHeap, Storage,
    header::{HEADER_SIZE, HEADER_WORDS, INVOKE_BYTECODE_OFFSETS, Table},
    layout::string_hash,
};
use types::{BuiltinClass, InvokeBytecode, Root, TypeTag, Value, WORD_SIZE};

fn unprotected() -> HeapConfig {
    HeapConfig::default().unprotected()
}

#[test]
fn test_default_config() {
    let config = HeapConfig::default();
    assert_eq!(config.arena_size, 64 * 1024);
    assert!(config.protect);
}

#[test]
fn test_empty_heap_finishes_to_header_only_image() {
    init_logger();
    let heap = ProgramHeap::new(unprotected()).unwrap();
    let base = heap.base();
    let program = heap.finish().unwrap();

    assert_eq!(program.base(), base);
    assert_eq!(program.size(), HEADER_SIZE);
    assert_eq!(program.heap_range(), base + HEADER_SIZE..base + HEADER_SIZE);
    assert_eq!(program.objects().count(), 0);
    assert!(program.bytecodes().is_empty());
    assert!(program.class_bits().is_empty());
    assert!(program.global_variables().is_empty());
    assert!(program.roots().iter().all(|root| *root == Value::from_smi(0)));
    assert_eq!(program.invoke_bytecode_offset(InvokeBytecode::Eq), -1);
    assert!(program.id().is_nil());
}

#[test]
fn test_core_roots_are_installed() {
    let program = core_heap(unprotected()).finish().unwrap();

    let null = program.object(program.root(Root::Null)).unwrap();
    assert_eq!(null.tag(), TypeTag::Oddball);
    assert_eq!(null.class_id(), class_id(BuiltinClass::Null));

    let empty = program.root(Root::EmptyArray);
    assert_eq!(program.array_elements(empty).unwrap().count(), 0);

    let message = program.string_content(program.root(Root::OutOfMemory)).unwrap();
    assert_eq!(message, b"OUT_OF_MEMORY");

    for class in BuiltinClass::ALL {
        assert_eq!(
            program.builtin_class_id(class),
            Value::from_smi(class.index() as isize)
        );
    }
    println!("✅ core roots installed: {:?}", program);
}

#[test]
fn test_sample_program_contents() {
    init_logger();
    let program = sample_program(HeapConfig::default());
    assert!(program.is_protected());

    assert_eq!(program.bytecodes(), &[0x01, 0x02, 0x03, 0x04, 0x05]);
    assert_eq!(program.dispatch_table(), &[0, 12, -5, 40]);
    assert_eq!(program.class_check_ids(), &[0, 3, 3, 9]);
    assert_eq!(program.interface_check_offsets(), &[7]);
    assert_eq!(program.invoke_bytecode_offset(InvokeBytecode::Add), 12);
    assert_eq!(program.invoke_bytecode_offset(InvokeBytecode::Size), 0);
    assert_eq!(program.invoke_bytecode_offset(InvokeBytecode::Mul), -1);

    let globals = program.global_variables();
    assert_eq!(globals.len(), 3);
    assert_eq!(globals[1], Value::from_smi(7));
    assert_eq!(program.double_value(globals[2]).unwrap(), 3.5);

    let elements: Vec<Value> = program.array_elements(globals[0]).unwrap().collect();
    assert_eq!(elements.len(), 4);
    assert_eq!(elements[0].as_smi(), Some(-42));
    assert_eq!(program.string_content(elements[1]).unwrap(), b"hello");
    assert_eq!(program.string_content(elements[2]).unwrap(), long_text().as_slice());

    let point = elements[3];
    let fields: Vec<Value> = program.instance_fields(point).unwrap().collect();
    assert_eq!(fields, vec![point, elements[1]]);
    assert_eq!(program.object(point).unwrap().class_id(), POINT_CLASS);

    let literals = program.literals();
    assert_eq!(literals[0], elements[1]);
    assert_eq!(program.byte_array_content(literals[1]).unwrap(), &[1, 2, 3]);
    assert_eq!(program.byte_array_content(literals[2]).unwrap(), &[0xab; 300][..]);
    assert_eq!(program.large_integer_value(literals[3]).unwrap(), i64::MIN + 7);
}

#[test]
fn test_strings_carry_their_hash() {
    let program = sample_program(unprotected());
    let hello = program.literals()[0];
    let object = program.object(hello).unwrap();
    assert_eq!(Value(object.word(2)), Value::from_smi(string_hash(b"hello")));
    assert_eq!(object.length(), Some((5, Storage::Inline)));
}

#[test]
fn test_large_payloads_are_external() {
    let program = sample_program(unprotected());
    let long = program.array_elements(program.global_variables()[0]).unwrap().nth(2).unwrap();
    let object = program.object(long).unwrap();
    assert_eq!(object.length(), Some((LONG_TEXT_LEN, Storage::External)));
    assert_eq!(object.size(), 4 * WORD_SIZE);

    let buffer = object.word(3);
    assert!(buffer >= program.heap_range().end);
    assert!(buffer < program.base() + program.size());
    // NUL terminated
    let offset = buffer - program.base();
    assert_eq!(program.image_bytes()[offset + LONG_TEXT_LEN], 0);
}

#[test]
fn test_heap_walk_is_gapless() {
    let program = sample_program(unprotected());
    let heap = program.heap_range();
    let mut next = heap.start;
    for object in program.objects() {
        assert_eq!(object.address(), next);
        next += object.size();
    }
    assert_eq!(next, heap.end);
}

#[test]
fn test_external_region_is_compacted() {
    let config = unprotected();
    let program = sample_program(config.clone());
    assert!(program.size() < config.arena_size);
    let image = program.image_bytes().as_ptr() as usize;
    let offset = program.bytecodes().as_ptr() as usize - image;
    assert!(offset >= program.heap_range().end - program.base());
    assert!(offset < program.size());
}

#[test]
fn test_do_pointers_order_and_kinds() {
    let program = sample_program(unprotected());
    let mut fields: Vec<Field> = Vec::new();
    program.do_pointers(&mut fields);

    let base = program.base();
    assert_eq!(fields[0], Field::SentinelAddress(base));
    assert!(fields[..3 + Table::ALL.len()].iter().all(|f| matches!(f, Field::SentinelAddress(_))));
    assert_eq!(
        fields[3 + Table::ALL.len()],
        Field::ObjectSlot(base + program::header::ROOTS * WORD_SIZE)
    );

    let raw: Vec<&Field> = fields.iter().filter(|f| matches!(f, Field::RawAddress(_))).collect();
    assert_eq!(raw.len(), 2, "one long string and one big byte array");

    let mut again: Vec<Field> = Vec::new();
    program.do_pointers(&mut again);
    assert_eq!(fields, again);
}

#[test]
fn test_allocate_bytes_reports_exhaustion() {
    let mut heap = ProgramHeap::new(unprotected().with_arena_size(HEADER_SIZE + 8 * WORD_SIZE)).unwrap();
    assert_eq!(heap.available(), 8 * WORD_SIZE);
    assert!(heap.allocate_bytes(5 * WORD_SIZE).is_some());
    assert!(heap.allocate_external(2 * WORD_SIZE).is_some());
    assert!(heap.allocate_bytes(2 * WORD_SIZE).is_none());
    assert!(heap.allocate_external(2 * WORD_SIZE).is_none());
    assert!(heap.allocate_bytes(WORD_SIZE).is_some());
    assert_eq!(heap.available(), 0);
}

#[test]
fn test_table_allocation_failure_is_out_of_memory() {
    let mut heap = ProgramHeap::new(unprotected().with_arena_size(HEADER_SIZE + 16)).unwrap();
    assert!(matches!(heap.set_bytecodes(&[0; 64]), Err(HeapError::OutOfMemory)));
}

#[test]
fn test_tiny_arena_is_rejected() {
    assert!(matches!(
        ProgramHeap::new(unprotected().with_arena_size(HEADER_WORDS)),
        Err(HeapError::OutOfMemory)
    ));
}

#[test]
#[should_panic(expected = "slot 2 out of range")]
fn test_store_out_of_range_panics() {
    let mut heap = core_heap(unprotected());
    let point = heap.allocate_instance(POINT_CLASS).unwrap();
    heap.store(point, 2, Value::from_smi(1));
}

#[test]
#[should_panic(expected = "has the wrong type")]
fn test_allocate_with_wrong_class_panics() {
    let mut heap = core_heap(unprotected());
    heap.allocate_string(class_id(BuiltinClass::Array), b"nope");
}

#[test]
fn test_anchor_rejects_wrong_base() {
    let program = sample_program(unprotected());
    let base = program.base();
    let arena = program.into_arena();
    assert!(matches!(
        Program::anchor(arena, base + WORD_SIZE),
        Err(HeapError::Malformed(_))
    ));
}

#[test]
fn test_anchor_accepts_unchanged_image() {
    let program = sample_program(unprotected());
    let base = program.base();
    let program = Program::anchor(program.into_arena(), base).unwrap();
    assert_eq!(program.literals().len(), 4);
}

#[test]
fn test_anchor_rejects_unknown_type_tag() {
    init_logger();
    let mut heap = ProgramHeap::new(unprotected()).unwrap();
    heap.set_class_bits(&[types::ClassBits::new(TypeTag::Instance, WORD_SIZE).0]).unwrap();
    heap.allocate_instance(0).unwrap();
    let program = heap.finish().unwrap();
    let base = program.base();
    let class_bits = program.class_bits().as_ptr() as usize - program.image_bytes().as_ptr() as usize;

    let mut arena = program.into_arena();
    let bogus_tag = 0x0f_u16;
    arena.bytes_mut()[class_bits..class_bits + 2].copy_from_slice(&bogus_tag.to_ne_bytes());
    arena.words_mut()[HEADER_WORDS] = Value::from_smi(bogus_tag as isize).raw();

    assert!(matches!(
        Program::anchor(arena, base),
        Err(HeapError::UnknownTypeTag(0x0f))
    ));
}

#[test]
fn test_anchor_rejects_reference_into_object_middle() {
    let mut heap = core_heap(unprotected());
    let hello = heap.allocate_string(class_id(BuiltinClass::String), b"hello").unwrap();
    heap.set_literals(&[hello]).unwrap();
    let program = heap.finish().unwrap();
    let base = program.base();
    let slot = program.literals().as_ptr() as usize - program.image_bytes().as_ptr() as usize;

    let mut arena = program.into_arena();
    arena.words_mut()[slot / WORD_SIZE] = hello.raw() + WORD_SIZE;
    assert!(matches!(Program::anchor(arena, base), Err(HeapError::Malformed(_))));
}

#[test]
#[should_panic(expected = "write to a read-only arena")]
fn test_protected_arena_refuses_writes() {
    let program = sample_program(HeapConfig::default());
    let mut arena = program.into_arena();
    arena.words_mut()[0] = 0;
}

#[test]
#[should_panic(expected = "invoke offset -5 out of range")]
fn test_negative_invoke_offset_panics() {
    let mut heap = core_heap(unprotected());
    heap.set_invoke_bytecode_offset(InvokeBytecode::Add, -5);
}

#[test]
fn test_anchor_rejects_negative_invoke_offset() {
    let mut heap = core_heap(unprotected());
    heap.set_invoke_bytecode_offset(InvokeBytecode::Add, 12);
    let program = heap.finish().unwrap();
    let base = program.base();

    let mut arena = program.into_arena();
    arena.words_mut()[INVOKE_BYTECODE_OFFSETS + InvokeBytecode::Add.index()] = -5_isize as usize;
    assert!(matches!(
        Program::anchor(arena, base),
        Err(HeapError::Malformed("invoke offset out of range"))
    ));
}
