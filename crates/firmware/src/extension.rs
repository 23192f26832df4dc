use log::{debug, trace};
use program::{Arena, HeapConfig, HeapError, Program};
use types::{WORD_SIZE, Word};

use crate::error::Result;

pub const HEADER_MARKER: Word = 0x98dfc301;
pub const HEADER_CHECKSUM: Word = 0xb3147ee9;

const MARKER: usize = 0;
const USED: usize = 1;
const FREE: usize = 2;
const IMAGES: usize = 3;
const CHECKSUM: usize = 4;

pub const HEADER_WORDS: usize = 5;
pub const HEADER_BYTES: usize = HEADER_WORDS * WORD_SIZE;
/// Words per image table entry: address, then byte size.
pub const ENTRY_WORDS: usize = 2;

const CONFIG_LENGTH_BYTES: usize = 4;

/// One row of the image table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageEntry {
    pub address: usize,
    pub size: usize,
}

/// Directory of program images and configuration baked into firmware.
///
/// Layout, in little-endian words starting at `address`:
///
/// ```text
/// marker | used | free | images | checksum
/// (address, size) * images
/// ... used bytes past the header ...
/// u32 config length | config bytes        (within free)
/// ```
#[derive(Clone, Copy)]
pub struct EmbeddedDataExtension<'a> {
    data: &'a [u8],
    address: usize,
}

impl<'a> EmbeddedDataExtension<'a> {
    /// Probes `data`, which lives at `address`, for an extension header.
    /// Returns `None` for erased flash, a foreign marker, a checksum that does
    /// not add up, or a slice too short for the image table.
    pub fn cast(data: &'a [u8], address: usize) -> Option<Self> {
        if data.len() < HEADER_BYTES {
            trace!("no extension at 0x{:x}: {} bytes", address, data.len());
            return None;
        }
        let extension = Self { data, address };
        if extension.word(MARKER) != HEADER_MARKER {
            trace!("no extension at 0x{:x}: marker 0x{:x}", address, extension.word(MARKER));
            return None;
        }
        let checksum = (0..HEADER_WORDS).fold(0, |sum, index| sum ^ extension.word(index));
        if checksum != HEADER_CHECKSUM {
            debug!("extension at 0x{:x} fails its checksum", address);
            return None;
        }
        let table = extension
            .word(IMAGES)
            .checked_mul(ENTRY_WORDS * WORD_SIZE)
            .and_then(|bytes| bytes.checked_add(HEADER_BYTES))?;
        if table > data.len() {
            debug!("extension at 0x{:x} truncated inside its image table", address);
            return None;
        }
        debug!(
            "extension at 0x{:x}: {} images, {} bytes used, {} free",
            address,
            extension.images(),
            extension.used(),
            extension.free()
        );
        Some(extension)
    }

    /// Header words for an extension with the given contents, checksum
    /// included.
    pub fn header(used: usize, free: usize, images: usize) -> [Word; HEADER_WORDS] {
        let mut header = [HEADER_MARKER, used, free, images, 0];
        header[CHECKSUM] = header.iter().fold(HEADER_CHECKSUM, |sum, word| sum ^ word);
        header
    }

    fn word(&self, index: usize) -> Word {
        let start = index * WORD_SIZE;
        let mut bytes = [0u8; WORD_SIZE];
        bytes.copy_from_slice(&self.data[start..start + WORD_SIZE]);
        Word::from_le_bytes(bytes)
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn used(&self) -> usize {
        self.word(USED)
    }

    pub fn free(&self) -> usize {
        self.word(FREE)
    }

    pub fn images(&self) -> usize {
        self.word(IMAGES)
    }

    pub fn image(&self, n: usize) -> ImageEntry {
        assert!(n < self.images(), "image {} out of range ({})", n, self.images());
        let entry = HEADER_WORDS + n * ENTRY_WORDS;
        ImageEntry {
            address: self.word(entry),
            size: self.word(entry + 1),
        }
    }

    /// Configuration blob stored after the used bytes. Empty when fewer than
    /// four free bytes remain for the length prefix; otherwise the declared
    /// length is clamped to the free byte count and to the end of the data.
    pub fn config(&self) -> &'a [u8] {
        self.config_range()
            .map(|range| &self.data[range])
            .unwrap_or_default()
    }

    fn config_range(&self) -> Option<core::ops::Range<usize>> {
        let free = self.free();
        if free < CONFIG_LENGTH_BYTES {
            return None;
        }
        let start = self.used().checked_add(HEADER_BYTES)?;
        let body = start.checked_add(CONFIG_LENGTH_BYTES)?;
        let mut length = [0u8; CONFIG_LENGTH_BYTES];
        length.copy_from_slice(self.data.get(start..body)?);
        let length = (u32::from_le_bytes(length) as usize)
            .min(free)
            .min(self.data.len() - body);
        Some(body..body + length)
    }

    /// Offset of `program` from the extension header.
    pub fn offset(&self, program: usize) -> Option<usize> {
        program.checked_sub(self.address)
    }

    /// Address of the program stored `offset` bytes past the header.
    pub fn program(&self, offset: usize) -> Option<usize> {
        self.address.checked_add(offset)
    }

    /// Bytes of image `n`, when it lies inside the extension itself.
    pub fn image_bytes(&self, n: usize) -> Option<&'a [u8]> {
        let entry = self.image(n);
        let start = self.offset(entry.address)?;
        let end = start.checked_add(entry.size)?;
        self.data.get(start..end)
    }

    /// Copies image `n` into a fresh arena and anchors it at its firmware
    /// address.
    pub fn load_image(&self, n: usize, config: &HeapConfig) -> Result<Program> {
        let entry = self.image(n);
        let bytes = self
            .image_bytes(n)
            .ok_or(HeapError::Malformed("image lies outside the extension"))?;
        let arena = Arena::from_bytes(bytes)?;
        let mut program = Program::anchor(arena, entry.address)?;
        if config.protect {
            program.protect()?;
        }
        debug!("loaded image {} at 0x{:x}: {} bytes", n, entry.address, entry.size);
        Ok(program)
    }
}

impl core::fmt::Debug for EmbeddedDataExtension<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EmbeddedDataExtension")
            .field("address", &format_args!("0x{:x}", self.address))
            .field("used", &self.used())
            .field("free", &self.free())
            .field("images", &self.images())
            .finish()
    }
}
