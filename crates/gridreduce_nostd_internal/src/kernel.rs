//! The generic launch interface for kernel bodies
//!
//! Every algorithm that runs on an accelerator provides a kernel body: a type
//! that implements [`KernelBody`]. Backends only ever know how to launch a
//! [`KernelBody`], so adding an algorithm never requires a new entry point in
//! any backend.

use crate::geometry::DEFAULT_BLOCK_SIZE;
use crate::slots::DeviceSlots;
use crate::team::ExecutionUnit;

/// The capability of being launched by a backend.
///
/// A backend calls [`KernelBody::run`] once per block of the grid, with an
/// execution unit describing that block.
pub trait KernelBody<I, O>: Sync {
    /// the number of logical threads per block that the body was written for
    const BLOCK_SIZE: usize;

    /// the number of bytes of block-shared memory used by a single block
    fn shared_bytes(&self) -> usize {
        0
    }

    /// The entry point.
    ///
    /// - `unit`: the execution unit of the block being executed
    /// - `block_index`: the index of that block within the grid
    /// - `input`: the device-side copy of the source data
    /// - `output`: the device-side destination buffer
    /// - `n`: the problem size
    fn run<U: ExecutionUnit>(
        &self,
        unit: &mut U,
        block_index: usize,
        input: &[I],
        output: &dyn DeviceSlots<O>,
        n: usize,
    );
}

/// A functor shaped as `(execution-unit, block-index, output, input)`.
///
/// Implement this to write an algorithm body without worrying about the
/// entry-point signature that the backends expect; wrap it in a
/// [`UniversalKernel`] to launch it.
pub trait BlockFn<I, O>: Sync {
    fn call<U: ExecutionUnit>(
        &self,
        unit: &mut U,
        block_index: usize,
        output: &dyn DeviceSlots<O>,
        input: &[I],
    );
}

/// Adapts any [`BlockFn`] to the [`KernelBody`] entry point.
///
/// The call is forwarded unchanged (the problem size is dropped since a
/// [`BlockFn`] sees the full input slice).
#[derive(Clone, Copy, Debug)]
pub struct UniversalKernel<F, const BLOCK_SIZE: usize = DEFAULT_BLOCK_SIZE> {
    func: F,
}

impl<F, const BLOCK_SIZE: usize> UniversalKernel<F, BLOCK_SIZE> {
    pub fn new(func: F) -> Self {
        UniversalKernel { func }
    }

    pub fn inner(&self) -> &F {
        &self.func
    }
}

impl<I, O, F, const B: usize> KernelBody<I, O> for UniversalKernel<F, B>
where
    F: BlockFn<I, O>,
{
    const BLOCK_SIZE: usize = B;

    #[inline]
    fn run<U: ExecutionUnit>(
        &self,
        unit: &mut U,
        block_index: usize,
        input: &[I],
        output: &dyn DeviceSlots<O>,
        _n: usize,
    ) {
        self.func.call(unit, block_index, output, input)
    }
}
