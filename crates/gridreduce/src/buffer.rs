//! Device-side buffers
//!
//! Our host backends share an address space with the host, but we still
//! model the transfers explicitly: the source data is mirrored into a
//! [`DeviceMirror`] before a launch and results are written into a
//! [`DeviceBuffer`] that gets copied back afterwards. A launch never aliases
//! the caller's data.

use crate::error::{Error, Result};
use gridreduce_nostd_internal::DeviceSlots;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Reserves room for `len` elements of type `T`, respecting the device's
/// allocation limit
fn try_alloc_vec<T>(len: usize, max_allocation: Option<usize>) -> Result<Vec<T>> {
    let bytes = len
        .checked_mul(size_of::<T>())
        .ok_or_else(|| Error::resource_exhausted(usize::MAX, max_allocation))?;
    if max_allocation.is_some_and(|limit| bytes > limit) {
        return Err(Error::resource_exhausted(bytes, max_allocation));
    }

    let mut out = Vec::new();
    out.try_reserve_exact(len)
        .map_err(|_| Error::resource_exhausted(bytes, max_allocation))?;
    debug!(len, bytes, "allocated device buffer");
    Ok(out)
}

/// A read-only copy of host data that a kernel reads from
#[derive(Clone, Debug)]
pub struct DeviceMirror<T> {
    data: Vec<T>,
}

impl<T: Clone> DeviceMirror<T> {
    /// allocates the mirror and copies `source` into it
    pub fn from_host(source: &[T], max_allocation: Option<usize>) -> Result<Self> {
        let mut data = try_alloc_vec(source.len(), max_allocation)?;
        data.extend_from_slice(source);
        Ok(DeviceMirror { data })
    }
}

impl<T> DeviceMirror<T> {
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A buffer of write-once slots that kernels store their results in.
///
/// Every slot may be written at most once per launch. Stores that would
/// overwrite a slot (or that are out of bounds) are rejected and counted, so
/// the executor can report them once the launch completes.
#[derive(Debug)]
pub struct DeviceBuffer<T> {
    slots: Box<[OnceLock<T>]>,
    rejected: AtomicUsize,
}

impl<T> DeviceBuffer<T> {
    /// allocates a buffer with `len` empty slots
    pub fn alloc(len: usize, max_allocation: Option<usize>) -> Result<Self> {
        let mut slots = try_alloc_vec(len, max_allocation)?;
        slots.resize_with(len, OnceLock::new);
        Ok(DeviceBuffer {
            slots: slots.into_boxed_slice(),
            rejected: AtomicUsize::new(0),
        })
    }

    /// the number of stores that were rejected so far
    pub fn rejected_stores(&self) -> usize {
        self.rejected.load(Ordering::Acquire)
    }

    /// the number of slots that hold a value
    pub fn n_written(&self) -> usize {
        self.slots.iter().filter(|slot| slot.get().is_some()).count()
    }

    /// Copies the contents back to the host (unwritten slots are `None`)
    pub fn copy_to_host(self) -> Vec<Option<T>> {
        self.slots
            .into_vec()
            .into_iter()
            .map(OnceLock::into_inner)
            .collect()
    }
}

impl<T: Send + Sync> DeviceSlots<T> for DeviceBuffer<T> {
    fn len(&self) -> usize {
        self.slots.len()
    }

    fn store(&self, index: usize, value: T) -> bool {
        let stored = match self.slots.get(index) {
            Some(slot) => slot.set(value).is_ok(),
            None => false,
        };
        if !stored {
            self.rejected.fetch_add(1, Ordering::AcqRel);
        }
        stored
    }
}
