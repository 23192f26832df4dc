use std::path::Path;

use goblin::elf::{header::ELFMAG, Elf};
use log::{debug, warn};

use crate::{
    config::FirmwareConfig,
    error::{FirmwareError, Result},
    extension::EmbeddedDataExtension,
};

/// Source of the firmware's embedded data, resolved once at start-up and
/// passed to whoever needs it.
pub trait FirmwareInfoProvider {
    /// Raw bytes of the embedded data section.
    fn data(&self) -> &[u8];

    /// Address the section lives at on the target.
    fn address(&self) -> usize;

    fn extension(&self) -> Option<EmbeddedDataExtension<'_>> {
        EmbeddedDataExtension::cast(self.data(), self.address())
    }
}

/// Embedded build: the linker section is mapped into the running image.
#[derive(Debug, Clone, Copy)]
pub struct StaticFirmware {
    data: &'static [u8],
    address: usize,
}

impl StaticFirmware {
    pub fn new(data: &'static [u8]) -> Self {
        Self {
            data,
            address: data.as_ptr() as usize,
        }
    }

    /// Section whose images were anchored for `address` rather than for
    /// where `data` happens to be mapped.
    pub fn at(data: &'static [u8], address: usize) -> Self {
        Self { data, address }
    }
}

impl FirmwareInfoProvider for StaticFirmware {
    fn data(&self) -> &[u8] {
        self.data
    }

    fn address(&self) -> usize {
        self.address
    }
}

/// Host build: the firmware is a file, either an ELF carrying the section
/// or the raw section bytes.
#[derive(Debug, Clone)]
pub struct HostFirmware {
    data: Vec<u8>,
    address: usize,
}

impl HostFirmware {
    /// Loads the file named by `config.env_var`, or `None` when the variable
    /// is not set.
    pub fn from_env(config: &FirmwareConfig) -> Result<Option<Self>> {
        match std::env::var_os(&config.env_var) {
            Some(path) => Self::from_path(path, config).map(Some),
            None => {
                debug!("{} not set, running without firmware data", config.env_var);
                Ok(None)
            }
        }
    }

    pub fn from_path(path: impl AsRef<Path>, config: &FirmwareConfig) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        debug!("read firmware {}: {} bytes", path.display(), bytes.len());
        Self::from_bytes(bytes, config)
    }

    pub fn from_bytes(bytes: Vec<u8>, config: &FirmwareConfig) -> Result<Self> {
        if !bytes.starts_with(ELFMAG) {
            return Ok(Self {
                data: bytes,
                address: config.raw_base,
            });
        }

        let elf = Elf::parse(&bytes)?;
        let section = elf
            .section_headers
            .iter()
            .find(|header| elf.shdr_strtab.get_at(header.sh_name) == Some(config.section.as_str()));
        let Some(section) = section else {
            warn!("firmware ELF has no {} section", config.section);
            return Err(FirmwareError::MissingSection(config.section.clone()));
        };

        let range = section.file_range().filter(|range| range.end <= bytes.len());
        let Some(range) = range else {
            return Err(goblin::error::Error::Malformed(format!(
                "section {} lies outside the file",
                config.section
            ))
            .into());
        };
        let address = section.sh_addr as usize;
        debug!(
            "firmware section {} at 0x{:x}: {} bytes",
            config.section,
            address,
            range.len()
        );
        Ok(Self {
            data: bytes[range].to_vec(),
            address,
        })
    }
}

impl FirmwareInfoProvider for HostFirmware {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn address(&self) -> usize {
        self.address
    }
}
