use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeapError {
    /// The arena has no room left. Never retried internally.
    #[error("program arena exhausted")]
    OutOfMemory,
    #[error("malformed program image: {0}")]
    Malformed(&'static str),
    #[error("unknown class id {0}")]
    UnknownClass(usize),
    #[error("unknown type tag {0}")]
    UnknownTypeTag(u8),
    #[error("memory protection failed: {0}")]
    Region(#[from] region::Error),
}

pub type Result<T> = core::result::Result<T, HeapError>;

impl From<HeapError> for snapshot::SnapshotError {
    fn from(error: HeapError) -> Self {
        match error {
            HeapError::OutOfMemory => snapshot::SnapshotError::OutOfMemory,
            error => snapshot::SnapshotError::Heap(error.to_string()),
        }
    }
}
