use std::collections::HashMap;

use types::Value;

use crate::error::{Result, SnapshotError};

/// Kind prefix written in front of every object in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectKind {
    Smi = 0,
    BackReference = 1,
    HeapObject = 2,
}

impl ObjectKind {
    pub fn from_cardinal(value: u64) -> Result<Self> {
        match value {
            0 => Ok(ObjectKind::Smi),
            1 => Ok(ObjectKind::BackReference),
            2 => Ok(ObjectKind::HeapObject),
            _ => Err(SnapshotError::Format("unknown object kind")),
        }
    }
}

/// Writer side of the write-once table: object address to index.
#[derive(Debug, Default)]
pub struct WriteReferences {
    indices: HashMap<usize, u64>,
}

impl WriteReferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, address: usize) -> Option<u64> {
        self.indices.get(&address).copied()
    }

    /// Assigns the next index to `address`. Must be called before the
    /// object's children are written.
    pub fn register(&mut self, address: usize) -> u64 {
        let index = self.indices.len() as u64;
        let previous = self.indices.insert(address, index);
        debug_assert!(previous.is_none(), "object 0x{:x} registered twice", address);
        index
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Reader side: index to freshly allocated object, in allocation order.
#[derive(Debug, Default)]
pub struct ReadReferences {
    objects: Vec<Value>,
}

impl ReadReferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, object: Value) {
        self.objects.push(object);
    }

    pub fn get(&self, index: u64) -> Result<Value> {
        usize::try_from(index)
            .ok()
            .and_then(|index| self.objects.get(index).copied())
            .ok_or(SnapshotError::Format("back reference out of range"))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
