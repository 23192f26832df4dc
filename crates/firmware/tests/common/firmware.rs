#![allow(dead_code)]

use firmware::extension::{EmbeddedDataExtension, ENTRY_WORDS, HEADER_BYTES};
use object::{
    elf,
    write::elf::{FileHeader, SectionHeader, Writer},
    Endianness,
};
use program::{core_class_bits, Arena, HeapConfig, Program, ProgramHeap};
use types::{BuiltinClass, Value, WORD_SIZE};

pub const FIRMWARE_BASE: usize = 0x4000_0000;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn small_program() -> Program {
    let mut heap = ProgramHeap::new(HeapConfig::default().with_arena_size(16 * 1024)).unwrap();
    heap.set_class_bits(&core_class_bits()).unwrap();
    heap.install_core_roots().unwrap();
    let string_class = BuiltinClass::String.index() as u16;
    let array_class = BuiltinClass::Array.index() as u16;
    let greeting = heap.allocate_string(string_class, b"hello from flash").unwrap();
    let banner = heap.allocate_string(string_class, &[b'='; 300]).unwrap();
    let list = heap.allocate_array(array_class, 3, Value::from_smi(0)).unwrap();
    heap.store(list, 0, greeting);
    heap.store(list, 1, banner);
    heap.set_global_variables(&[list, Value::from_smi(11)]).unwrap();
    heap.set_bytecodes(&[1, 2, 3, 5, 8, 13]).unwrap();
    heap.finish().unwrap()
}

/// Byte offsets of each image from the extension header.
pub fn image_offsets(sizes: &[usize]) -> Vec<usize> {
    let mut offset = HEADER_BYTES + sizes.len() * ENTRY_WORDS * WORD_SIZE;
    sizes
        .iter()
        .map(|size| {
            let start = offset;
            offset += size.next_multiple_of(WORD_SIZE);
            start
        })
        .collect()
}

/// Re-anchors `program` where image `index` of an extension at
/// `FIRMWARE_BASE` holding images of `sizes` will live.
pub fn anchor_for_slot(program: &Program, sizes: &[usize], index: usize) -> Program {
    let base = FIRMWARE_BASE + image_offsets(sizes)[index];
    let stream = relocation::to_relocatable(program).unwrap();
    let arena = Arena::new(program.size()).unwrap();
    relocation::relocate(&stream, arena, base, &HeapConfig::default()).unwrap()
}

/// What a firmware patching tool would write: header, image table, images,
/// then a length-prefixed config blob.
pub fn extension_bytes(address: usize, images: &[&[u8]], config: &[u8]) -> Vec<u8> {
    let sizes: Vec<usize> = images.iter().map(|image| image.len()).collect();
    let offsets = image_offsets(&sizes);
    let end = match (offsets.last(), sizes.last()) {
        (Some(offset), Some(size)) => offset + size.next_multiple_of(WORD_SIZE),
        _ => HEADER_BYTES,
    };
    let used = end - HEADER_BYTES;
    let free = 4 + config.len();

    let mut bytes = Vec::new();
    for word in EmbeddedDataExtension::header(used, free, images.len()) {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    for (offset, size) in offsets.iter().zip(&sizes) {
        bytes.extend_from_slice(&(address + offset).to_le_bytes());
        bytes.extend_from_slice(&size.to_le_bytes());
    }
    for (offset, image) in offsets.iter().zip(images) {
        bytes.resize(*offset, 0);
        bytes.extend_from_slice(image);
    }
    bytes.resize(end, 0);
    bytes.extend_from_slice(&(config.len() as u32).to_le_bytes());
    bytes.extend_from_slice(config);
    bytes
}

/// Rewrites header word `index` and leaves the checksum alone.
pub fn patch_word(bytes: &mut [u8], index: usize, word: usize) {
    bytes[index * WORD_SIZE..(index + 1) * WORD_SIZE].copy_from_slice(&word.to_le_bytes());
}

/// Little-endian ELF64 executable with a single named, allocated section.
pub fn elf_with_section(name: &str, address: u64, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut writer = Writer::new(Endianness::Little, true, &mut out);

        writer.reserve_file_header();
        writer.reserve_null_section_index();
        let section_name = writer.add_section_name(name.as_bytes());
        writer.reserve_section_index();
        let offset = writer.reserve(data.len(), 8);
        writer.reserve_shstrtab_section_index();
        writer.reserve_shstrtab();
        writer.reserve_section_headers();

        writer
            .write_file_header(&FileHeader {
                os_abi: elf::ELFOSABI_NONE,
                abi_version: 0,
                e_type: elf::ET_EXEC,
                e_machine: elf::EM_X86_64,
                e_entry: 0,
                e_flags: 0,
            })
            .unwrap();
        writer.write_align(8);
        writer.write(data);
        writer.write_shstrtab();

        writer.write_null_section_header();
        writer.write_section_header(&SectionHeader {
            name: Some(section_name),
            sh_type: elf::SHT_PROGBITS,
            sh_flags: elf::SHF_ALLOC.into(),
            sh_addr: address,
            sh_offset: offset as u64,
            sh_size: data.len() as u64,
            sh_link: 0,
            sh_info: 0,
            sh_addralign: 8,
            sh_entsize: 0,
        });
        writer.write_shstrtab_section_header();
    }
    out
}
