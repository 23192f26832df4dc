//! Portable, self-delimiting snapshot encoding.
//!
//! This crate holds the byte-level codec shared by the program writer and
//! reader: cardinals, zigzag integers, fixed-width 64-bit values, verbatim
//! lists, the object kind prefix and the write-once back-reference tables.
//! The snapshot is produced and consumed only by this VM, so there is no
//! version negotiation; malformed input is rejected, not repaired.

pub mod allocator;
pub mod error;
pub mod reader;
pub mod references;
pub mod writer;

pub use allocator::SnapshotAllocator;
pub use error::{Result, SnapshotError};
pub use reader::SnapshotReader;
pub use references::{ObjectKind, ReadReferences, WriteReferences};
pub use writer::SnapshotWriter;
