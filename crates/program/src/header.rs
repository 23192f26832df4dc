//! Word indices of the fixed image header.
//!
//! ```text
//! ANCHOR | PROGRAM_SIZE | ID.. | HEAP_BEGIN | HEAP_TOP | TABLES.. | ROOTS.. |
//! BUILTIN_CLASS_IDS.. | INVOKE_BYTECODE_OFFSETS..
//! ```

use types::{
    BUILTIN_CLASS_IDS_COUNT, INVOKE_BYTECODE_COUNT, PROGRAM_ID_LEN, ROOT_COUNT, WORD_SIZE, words_for,
};

pub const ANCHOR: usize = 0;
pub const PROGRAM_SIZE: usize = 1;
pub const ID: usize = 2;
pub const ID_WORDS: usize = words_for(PROGRAM_ID_LEN);
pub const HEAP_BEGIN: usize = ID + ID_WORDS;
pub const HEAP_TOP: usize = HEAP_BEGIN + 1;
pub const TABLES: usize = HEAP_TOP + 1;
pub const TABLE_COUNT: usize = 7;
pub const ROOTS: usize = TABLES + 2 * TABLE_COUNT;
pub const BUILTIN_CLASS_IDS: usize = ROOTS + ROOT_COUNT;
pub const INVOKE_BYTECODE_OFFSETS: usize = BUILTIN_CLASS_IDS + BUILTIN_CLASS_IDS_COUNT;
pub const HEADER_WORDS: usize = INVOKE_BYTECODE_OFFSETS + INVOKE_BYTECODE_COUNT;
pub const HEADER_SIZE: usize = HEADER_WORDS * WORD_SIZE;

/// The flat tables of a program. Each one is a `(data, length)` pair in the
/// header with its elements stored in the external region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    ClassBits = 0,
    ClassCheckIds,
    InterfaceCheckOffsets,
    DispatchTable,
    Bytecodes,
    GlobalVariables,
    Literals,
}

impl Table {
    pub const ALL: [Table; TABLE_COUNT] = [
        Table::ClassBits,
        Table::ClassCheckIds,
        Table::InterfaceCheckOffsets,
        Table::DispatchTable,
        Table::Bytecodes,
        Table::GlobalVariables,
        Table::Literals,
    ];

    /// Header word holding the data address (null for an empty table).
    pub fn data_index(self) -> usize {
        TABLES + 2 * self as usize
    }

    /// Header word holding the element count.
    pub fn length_index(self) -> usize {
        self.data_index() + 1
    }

    pub fn element_size(self) -> usize {
        match self {
            Table::ClassBits | Table::ClassCheckIds | Table::InterfaceCheckOffsets => 2,
            Table::DispatchTable => 4,
            Table::Bytecodes => 1,
            Table::GlobalVariables | Table::Literals => WORD_SIZE,
        }
    }

    /// Object tables hold tagged values; the rest are pointer-free lists.
    pub fn holds_values(self) -> bool {
        matches!(self, Table::GlobalVariables | Table::Literals)
    }
}

/// Byte range of a table's elements relative to the image base. Empty tables
/// yield `0..0`; `None` when the header words do not describe a range.
pub(crate) fn table_range(
    header: &[types::Word],
    base: usize,
    table: Table,
) -> Option<core::ops::Range<usize>> {
    let length = header[table.length_index()];
    if length == 0 {
        return Some(0..0);
    }
    let start = header[table.data_index()].checked_sub(base)?;
    let end = start.checked_add(length.checked_mul(table.element_size())?)?;
    Some(start..end)
}
