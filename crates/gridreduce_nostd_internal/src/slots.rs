/// Global (device) memory that a kernel body writes its results to.
///
/// Every slot is meant to be written at most once during a launch. Kernel
/// bodies can't signal errors mid-flight, so a rejected store is simply
/// reported through the return value; types that implement this trait are
/// expected to keep track of rejected stores so that the host can surface
/// them after the launch completes.
///
/// Kernel bodies receive their output as `&dyn DeviceSlots<T>`, so this trait
/// must stay object-safe.
pub trait DeviceSlots<T>: Sync {
    /// the number of slots
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes `value` into the slot at `index`.
    ///
    /// Returns `false` (and drops `value`) if `index` is out of bounds or if
    /// the slot was already written.
    fn store(&self, index: usize, value: T) -> bool;
}
