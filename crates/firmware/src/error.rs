use program::HeapError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FirmwareError {
    #[error("cannot read firmware image: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse firmware ELF: {0}")]
    Elf(#[from] goblin::error::Error),
    #[error("firmware has no {0} section")]
    MissingSection(String),
    #[error("{0}")]
    Heap(#[from] HeapError),
}

pub type Result<T> = core::result::Result<T, FirmwareError>;
