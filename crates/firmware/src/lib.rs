//! Program images baked into firmware.
//!
//! A firmware patching tool appends an [`EmbeddedDataExtension`] to a
//! dedicated section after linking. At start-up a [`FirmwareInfoProvider`]
//! hands that section to the VM, which looks up its images and configuration
//! from there.

pub mod config;
pub mod error;
pub mod extension;
pub mod provider;

pub use config::FirmwareConfig;
pub use error::{FirmwareError, Result};
pub use extension::{EmbeddedDataExtension, HEADER_CHECKSUM, HEADER_MARKER, ImageEntry};
pub use provider::{FirmwareInfoProvider, HostFirmware, StaticFirmware};
