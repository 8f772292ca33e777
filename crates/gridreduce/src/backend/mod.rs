//! Accelerator backends
//!
//! A backend is represented by a type that implements [`Accelerator`]. That
//! type is the handle of the accelerator device and it knows how to launch a
//! [`KernelBody`] over a [`LaunchGeometry`].
//!
//! **NOTE:** Types that implement [`Accelerator`] live entirely on the host.
//! A GPU backend would implement this trait in order to execute the host-side
//! calls needed for launching the kernel.

mod host_rayon;
mod serial;

pub use host_rayon::{CpuBlocks, CpuThreads};
pub use serial::CpuSerial;

use crate::error::{Error, Result};
use gridreduce_nostd_internal::{DeviceSlots, KernelBody, LaunchGeometry};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// The handle to the host device.
///
/// The host device is where the source data lives and where partial results
/// are copied back to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostDevice {
    name: String,
}

impl HostDevice {
    /// Resolve the handle of the host device
    pub fn get() -> Self {
        HostDevice {
            name: String::from("host"),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The handle to an accelerator device (and the mechanism for launching
/// kernels on it).
pub trait Accelerator: Send + Sync + core::fmt::Debug {
    /// A short name identifying the backend (used in logs and errors)
    fn name(&self) -> &'static str;

    /// The largest allocation (in bytes) that the device accepts, if any.
    fn max_allocation(&self) -> Option<usize> {
        None
    }

    /// Executes `kernel` once for every block described by `geometry`.
    ///
    /// Implementations may execute blocks in any order, or concurrently.
    /// This returns once every block is done.
    fn run_blocks<I, O, K>(
        &self,
        geometry: &LaunchGeometry,
        kernel: &K,
        input: &[I],
        output: &dyn DeviceSlots<O>,
        n: usize,
    ) where
        I: Sync,
        K: KernelBody<I, O>;

    /// Launches `kernel` and reports failures.
    ///
    /// The default implementation validates that the geometry matches the
    /// block size that the kernel was written for and turns a panic escaping
    /// from any block into a [`Error`] (the rest of the grid may or may not
    /// have run).
    fn launch<I, O, K>(
        &self,
        geometry: &LaunchGeometry,
        kernel: &K,
        input: &[I],
        output: &dyn DeviceSlots<O>,
        n: usize,
    ) -> Result<()>
    where
        I: Sync,
        K: KernelBody<I, O>,
    {
        if geometry.block_size() != K::BLOCK_SIZE {
            return Err(Error::backend_execution(
                self.name(),
                format!(
                    "the kernel was written for blocks of {} threads, but the \
                     launch uses blocks of {} threads",
                    K::BLOCK_SIZE,
                    geometry.block_size()
                ),
            ));
        }
        panic::catch_unwind(AssertUnwindSafe(|| {
            self.run_blocks(geometry, kernel, input, output, n)
        }))
        .map_err(|payload| Error::backend_execution(self.name(), panic_message(payload.as_ref())))
    }
}

/// extracts the message from a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        format!("a kernel body panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("a kernel body panicked: {msg}")
    } else {
        String::from("a kernel body panicked")
    }
}
