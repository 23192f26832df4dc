/// Settings for building and anchoring program images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapConfig {
    /// Bytes reserved for the arena a `ProgramHeap` builds into.
    pub arena_size: usize,
    /// Mark finished images read-only so stray writes fault.
    pub protect: bool,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            arena_size: 64 * 1024,
            protect: true,
        }
    }
}

impl HeapConfig {
    pub fn with_arena_size(mut self, arena_size: usize) -> Self {
        self.arena_size = arena_size;
        self
    }

    pub fn unprotected(mut self) -> Self {
        self.protect = false;
        self
    }
}
