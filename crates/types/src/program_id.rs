use core::fmt;

pub const PROGRAM_ID_LEN: usize = 16;

/// 16-byte UUID identifying a program image.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(C)]
pub struct ProgramId(pub [u8; PROGRAM_ID_LEN]);

impl ProgramId {
    pub const NIL: ProgramId = ProgramId([0; PROGRAM_ID_LEN]);

    pub fn new(bytes: [u8; PROGRAM_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let bytes: [u8; PROGRAM_ID_LEN] = slice.get(..PROGRAM_ID_LEN)?.try_into().ok()?;
        Some(ProgramId::new(bytes))
    }

    pub fn to_bytes(&self) -> [u8; PROGRAM_ID_LEN] {
        self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0 == [0; PROGRAM_ID_LEN]
    }
}

impl fmt::Debug for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProgramId({})", self)
    }
}

// Canonical 8-4-4-4-12 UUID text.
impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
