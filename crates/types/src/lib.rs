#![no_std]
//! Shared vocabulary of the image runtime: words, tagged values, object
//! headers and the fixed program tables.
//!
//! Everything here is plain data with no allocation so that the host tools
//! and the device side agree on layout.

pub mod word;
pub use word::*;

pub mod value;
pub use value::*;

pub mod class;
pub use class::*;

pub mod tables;
pub use tables::*;

pub mod program_id;
pub use program_id::{PROGRAM_ID_LEN, ProgramId};
