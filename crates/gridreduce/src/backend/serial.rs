//! Implements the "serial" backend

use crate::backend::Accelerator;
use gridreduce_nostd_internal::{DeviceSlots, KernelBody, LaunchGeometry, SerialBlock};

/// The sequential host backend.
///
/// Blocks are executed one after another on the calling thread and the
/// members of each block are simulated serially (see [`SerialBlock`]). This
/// is mostly useful for testing: every other backend should produce bitwise
/// identical results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuSerial {
    max_allocation: Option<usize>,
}

impl CpuSerial {
    pub fn new() -> Self {
        CpuSerial::default()
    }

    /// Limit the size of a single allocation on this device (this emulates a
    /// device with a finite amount of memory)
    pub fn with_max_allocation(mut self, bytes: usize) -> Self {
        self.max_allocation = Some(bytes);
        self
    }
}

impl Accelerator for CpuSerial {
    fn name(&self) -> &'static str {
        "cpu-serial"
    }

    fn max_allocation(&self) -> Option<usize> {
        self.max_allocation
    }

    fn run_blocks<I, O, K>(
        &self,
        geometry: &LaunchGeometry,
        kernel: &K,
        input: &[I],
        output: &dyn DeviceSlots<O>,
        n: usize,
    ) where
        I: Sync,
        K: KernelBody<I, O>,
    {
        let grid_size = geometry.grid_size();
        for block_index in 0..grid_size {
            let mut unit = SerialBlock::new(block_index, grid_size, geometry.block_size());
            kernel.run(&mut unit, block_index, input, output, n);
        }
    }
}
