use thiserror::Error;

/// Failures while producing or consuming a snapshot.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// Truncated or malformed input.
    #[error("malformed snapshot: {0}")]
    Format(&'static str),
    /// The allocator returned nothing; the read was aborted.
    #[error("allocation failed while reading snapshot")]
    OutOfMemory,
    /// Reading finished with bytes left over.
    #[error("{0} trailing bytes after snapshot")]
    TrailingBytes(usize),
    /// The program assembled from the snapshot did not validate.
    #[error("snapshot produced an invalid image: {0}")]
    Heap(String),
}

pub type Result<T> = core::result::Result<T, SnapshotError>;
