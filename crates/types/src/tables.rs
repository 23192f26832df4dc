//! Fixed-size tables every program carries: roots, builtin class ids and the
//! operator dispatch offsets.

pub const ROOT_COUNT: usize = 10;
pub const BUILTIN_CLASS_IDS_COUNT: usize = 10;
pub const INVOKE_BYTECODE_COUNT: usize = 19;

/// Marks an invoke bytecode without a dispatch offset.
pub const UNSET_OFFSET: isize = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Root {
    Null = 0,
    True,
    False,
    EmptyArray,
    OutOfBounds,
    OutOfMemory,
    WrongObjectType,
    InvalidArgument,
    Uninitialized,
    AllocationFailed,
}

impl Root {
    pub const ALL: [Root; ROOT_COUNT] = [
        Root::Null,
        Root::True,
        Root::False,
        Root::EmptyArray,
        Root::OutOfBounds,
        Root::OutOfMemory,
        Root::WrongObjectType,
        Root::InvalidArgument,
        Root::Uninitialized,
        Root::AllocationFailed,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Text of the builtin error string roots.
    pub fn error_message(self) -> Option<&'static str> {
        match self {
            Root::OutOfBounds => Some("OUT_OF_BOUNDS"),
            Root::OutOfMemory => Some("OUT_OF_MEMORY"),
            Root::WrongObjectType => Some("WRONG_OBJECT_TYPE"),
            Root::InvalidArgument => Some("INVALID_ARGUMENT"),
            Root::Uninitialized => Some("UNINITIALIZED"),
            Root::AllocationFailed => Some("ALLOCATION_FAILED"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum BuiltinClass {
    Object = 0,
    Null,
    True,
    False,
    Array,
    ByteArray,
    String,
    Double,
    LargeInteger,
    SmallInteger,
}

impl BuiltinClass {
    pub const ALL: [BuiltinClass; BUILTIN_CLASS_IDS_COUNT] = [
        BuiltinClass::Object,
        BuiltinClass::Null,
        BuiltinClass::True,
        BuiltinClass::False,
        BuiltinClass::Array,
        BuiltinClass::ByteArray,
        BuiltinClass::String,
        BuiltinClass::Double,
        BuiltinClass::LargeInteger,
        BuiltinClass::SmallInteger,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Bytecodes whose implementation is looked up through the dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum InvokeBytecode {
    Eq = 0,
    Lt,
    Gt,
    Lte,
    Gte,
    Lsl,
    Lsr,
    Ashr,
    BitAnd,
    BitOr,
    BitXor,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    At,
    AtPut,
    Size,
}

impl InvokeBytecode {
    pub const ALL: [InvokeBytecode; INVOKE_BYTECODE_COUNT] = [
        InvokeBytecode::Eq,
        InvokeBytecode::Lt,
        InvokeBytecode::Gt,
        InvokeBytecode::Lte,
        InvokeBytecode::Gte,
        InvokeBytecode::Lsl,
        InvokeBytecode::Lsr,
        InvokeBytecode::Ashr,
        InvokeBytecode::BitAnd,
        InvokeBytecode::BitOr,
        InvokeBytecode::BitXor,
        InvokeBytecode::Add,
        InvokeBytecode::Sub,
        InvokeBytecode::Mul,
        InvokeBytecode::Div,
        InvokeBytecode::Mod,
        InvokeBytecode::At,
        InvokeBytecode::AtPut,
        InvokeBytecode::Size,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}
