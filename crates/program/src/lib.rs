//! Program images: a packed heap of self-describing objects plus flat
//! metadata tables, living at a fixed address inside one arena.
//!
//! [`ProgramHeap`] builds images, [`Program`] validates and inspects them, and
//! the snapshot functions in [`serialize`] move them in and out of the
//! portable snapshot format.

pub mod arena;
pub mod config;
pub mod error;
pub mod header;
pub mod heap;
pub mod layout;
pub mod pointer;
pub mod program;
pub mod serialize;

pub use arena::Arena;
pub use config::HeapConfig;
pub use error::{HeapError, Result};
pub use header::Table;
pub use heap::{ProgramHeap, core_class_bits};
pub use layout::{HeapObject, ObjectSize, Storage};
pub use pointer::{AnchoredImage, Field, PointerCallback};
pub use program::Program;
pub use serialize::{Snapshot, SnapshotGenerator};
