//! Moving anchored images between addresses.
//!
//! An anchored image holds absolute addresses. [`RelocationBits`] marks which
//! words those are, [`ImageInputStream`] turns the image into a chunked,
//! position independent stream, and [`ImageOutputStream`] rebuilds it at a new
//! base, rewriting only the marked words. Everything else is copied verbatim.

pub mod bits;
pub mod error;
pub mod input;
pub mod output;
pub mod relocatable;

pub use bits::{RelocationBits, build_relocation_bits};
pub use error::{RelocationError, Result};
pub use input::ImageInputStream;
pub use output::{ImageOutputStream, RelocatedImage};
pub use relocatable::{RelocatableImage, relocate, to_relocatable};
