use program::HeapError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelocationError {
    #[error("relocatable field 0x{0:x} lies outside the image")]
    FieldOutOfImage(usize),
    #[error("field 0x{field:x} points outside the image (0x{target:x})")]
    TargetOutOfImage { field: usize, target: usize },
    /// The first word of a stream must be the flagged anchor.
    #[error("stream does not start with an anchor")]
    MissingAnchor,
    #[error("relocated word 0x{0:x} does not fit the address space")]
    Overflow(usize),
    #[error("malformed relocatable stream: {0}")]
    BadLength(&'static str),
    #[error("image of {needed} bytes does not fit arena of {available} bytes")]
    ArenaTooSmall { needed: usize, available: usize },
    #[error(transparent)]
    Heap(#[from] HeapError),
}

pub type Result<T> = core::result::Result<T, RelocationError>;
