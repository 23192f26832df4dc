use types::Value;

/// Allocation seam used while reading a snapshot.
///
/// Every method returns `None` when the backing memory is exhausted. The
/// reader stops at the first `None` and reports
/// [`SnapshotError::OutOfMemory`](crate::SnapshotError::OutOfMemory).
pub trait SnapshotAllocator {
    /// Array of `length` elements, each set to `filler`.
    fn allocate_array(&mut self, class_id: u16, length: usize, filler: Value) -> Option<Value>;
    fn allocate_byte_array(&mut self, class_id: u16, bytes: &[u8]) -> Option<Value>;
    fn allocate_string(&mut self, class_id: u16, bytes: &[u8]) -> Option<Value>;
    /// Instance with every field set to Smi zero.
    fn allocate_instance(&mut self, class_id: u16) -> Option<Value>;
    fn allocate_double(&mut self, class_id: u16, value: f64) -> Option<Value>;
    fn allocate_large_integer(&mut self, class_id: u16, value: i64) -> Option<Value>;

    /// Stores `value` into field/element `index` of an array or instance
    /// returned by this allocator.
    fn store(&mut self, object: Value, index: usize, value: Value);
}
