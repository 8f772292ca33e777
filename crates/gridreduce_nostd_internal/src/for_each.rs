use crate::geometry::DEFAULT_BLOCK_SIZE;
use crate::grid_stride::GridStride;
use crate::kernel::KernelBody;
use crate::slots::DeviceSlots;
use crate::team::ExecutionUnit;

/// An element-wise kernel: every member grid-strides over the input and
/// stores `func(&input[i])` into output slot `i`.
///
/// This doesn't use any block-shared memory.
#[derive(Clone, Copy, Debug)]
pub struct ForEachKernel<F, const BLOCK_SIZE: usize = DEFAULT_BLOCK_SIZE> {
    func: F,
}

impl<F, const BLOCK_SIZE: usize> ForEachKernel<F, BLOCK_SIZE> {
    pub fn new(func: F) -> Self {
        ForEachKernel { func }
    }
}

impl<I, O, F, const B: usize> KernelBody<I, O> for ForEachKernel<F, B>
where
    I: Sync,
    F: Fn(&I) -> O + Sync,
{
    const BLOCK_SIZE: usize = B;

    fn run<U: ExecutionUnit>(
        &self,
        unit: &mut U,
        _block_index: usize,
        input: &[I],
        output: &dyn DeviceSlots<O>,
        n: usize,
    ) {
        let n = n.min(input.len()).min(output.len());
        let first_linear_index = unit.linear_index(0);
        let stride = unit.n_threads();
        unit.for_each_member(|thread| {
            for i in GridStride::new(first_linear_index + thread, stride, n) {
                output.store(i, (self.func)(&input[i]));
            }
        });
    }
}
