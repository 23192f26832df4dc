use std::io;

/// Where written bytes go. The counting sink only measures, so a generator can
/// size its buffer exactly before the real pass.
#[derive(Debug)]
enum Sink {
    Counting(usize),
    Buffer(Vec<u8>),
}

/// Appends snapshot primitives to a buffer.
///
/// Counts and lengths are cardinals (unsigned LEB128), signed integers are
/// zigzag cardinals, 64-bit integers and doubles are fixed 8 bytes
/// little-endian.
#[derive(Debug)]
pub struct SnapshotWriter {
    sink: Sink,
}

impl Default for SnapshotWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotWriter {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sink: Sink::Buffer(Vec::with_capacity(capacity)),
        }
    }

    /// A writer that discards everything and only tracks the length.
    pub fn counting() -> Self {
        Self {
            sink: Sink::Counting(0),
        }
    }

    pub fn is_counting(&self) -> bool {
        matches!(self.sink, Sink::Counting(_))
    }

    pub fn len(&self) -> usize {
        match &self.sink {
            Sink::Counting(count) => *count,
            Sink::Buffer(buffer) => buffer.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the written bytes. A counting writer yields an empty buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        match self.sink {
            Sink::Counting(_) => Vec::new(),
            Sink::Buffer(buffer) => buffer,
        }
    }

    pub fn write_byte(&mut self, byte: u8) {
        match &mut self.sink {
            Sink::Counting(count) => *count += 1,
            Sink::Buffer(buffer) => buffer.push(byte),
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        match &mut self.sink {
            Sink::Counting(count) => *count += bytes.len(),
            Sink::Buffer(buffer) => buffer.extend_from_slice(bytes),
        }
    }

    pub fn write_cardinal(&mut self, value: u64) {
        // Writes to io::sink and Vec never fail.
        match &mut self.sink {
            Sink::Counting(count) => {
                *count += leb128::write::unsigned(&mut io::sink(), value).unwrap_or_default();
            }
            Sink::Buffer(buffer) => {
                let _ = leb128::write::unsigned(buffer, value);
            }
        }
    }

    pub fn write_int(&mut self, value: i64) {
        self.write_cardinal(zigzag_encode(value));
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_double(&mut self, value: f64) {
        self.write_u64(value.to_bits());
    }

    /// Length-prefixed raw bytes.
    pub fn write_byte_list(&mut self, bytes: &[u8]) {
        self.write_cardinal(bytes.len() as u64);
        self.write_bytes(bytes);
    }

    /// Length-prefixed, each element as two little-endian bytes.
    pub fn write_u16_list(&mut self, list: &[u16]) {
        self.write_cardinal(list.len() as u64);
        for element in list {
            self.write_bytes(&element.to_le_bytes());
        }
    }

    /// Length-prefixed, each element as four little-endian bytes.
    pub fn write_i32_list(&mut self, list: &[i32]) {
        self.write_cardinal(list.len() as u64);
        for element in list {
            self.write_bytes(&element.to_le_bytes());
        }
    }
}

pub(crate) fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}
