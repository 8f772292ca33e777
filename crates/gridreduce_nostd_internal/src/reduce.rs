//! The block-parallel reduction kernel
//!
//! Each block reduces the elements its members load into a single partial
//! result, which the root member publishes to `output[block_index]`. Folding
//! the partial results together is left to the host.
//!
//! # Phases
//! 1. **load**: every member grid-strides over the input and folds the
//!    transformed elements into its own slot of the block-shared buffer.
//! 2. **collapse**: the active width of the shared buffer is repeatedly
//!    halved (with ceiling division) until a single slot remains; see
//!    [`CollapseSteps`].
//! 3. **publish**: the root member stores the block's partial result.
//!
//! Every phase is a collective operation of the [`ExecutionUnit`], so the
//! barrier between phases (and between collapse steps) is implicit.
//!
//! # Unpopulated slots
//! A member whose grid-stride sequence is empty never writes its slot. We
//! track this explicitly: a shared slot holds `None` until something was
//! folded into it, and the collapse only ever combines populated slots (an
//! unpopulated slot adopts the value it is paired with). This means a block
//! never reads a slot that wasn't written, regardless of where the block
//! sits in the grid or how the problem size relates to the block size.
//!
//! The combine function is assumed to be associative and commutative. The
//! order of evaluation depends on the launch geometry, so the result will
//! generally differ from a left-to-right sequential fold otherwise.

use crate::geometry::{CollapseStep, CollapseSteps, DEFAULT_BLOCK_SIZE};
use crate::grid_stride::GridStride;
use crate::kernel::KernelBody;
use crate::slots::DeviceSlots;
use crate::team::ExecutionUnit;

/// A reduction kernel built from a `transform` applied to every element and
/// a `combine` function used to fold the transformed values together.
///
/// # Stack usage
/// The block-shared buffer lives on the stack of whichever thread runs the
/// block and takes up [`KernelBody::shared_bytes`] bytes
/// (`BLOCK_SIZE * size_of::<A>()`). A stack overflow aborts the process (it
/// can't be reported as an error), so an accumulator of more than a few
/// hundred bytes with the default block size needs threads with a larger
/// stack, or a smaller `BLOCK_SIZE`.
#[derive(Clone, Copy, Debug)]
pub struct ReduceKernel<Tr, Co, const BLOCK_SIZE: usize = DEFAULT_BLOCK_SIZE> {
    transform: Tr,
    combine: Co,
}

impl<Tr, Co, const BLOCK_SIZE: usize> ReduceKernel<Tr, Co, BLOCK_SIZE> {
    pub fn new(transform: Tr, combine: Co) -> Self {
        ReduceKernel { transform, combine }
    }

    /// Applies the combine function (the host uses this to fold together the
    /// partial results of each block)
    #[inline]
    pub fn combine<A>(&self, lhs: A, rhs: A) -> A
    where
        Co: Fn(A, A) -> A,
    {
        (self.combine)(lhs, rhs)
    }

    /// folds `value` into an accumulator slot that may not be populated yet
    #[inline]
    fn fold_into<A>(&self, slot: &mut Option<A>, value: A)
    where
        Co: Fn(A, A) -> A,
    {
        *slot = Some(match slot.take() {
            Some(accum) => (self.combine)(accum, value),
            None => value,
        });
    }
}

impl<I, A, Tr, Co, const B: usize> KernelBody<I, A> for ReduceKernel<Tr, Co, B>
where
    I: Sync,
    A: Clone + Send + Sync,
    Tr: Fn(&I) -> A + Sync,
    Co: Fn(A, A) -> A + Sync,
{
    const BLOCK_SIZE: usize = B;

    fn shared_bytes(&self) -> usize {
        B * core::mem::size_of::<A>()
    }

    fn run<U: ExecutionUnit>(
        &self,
        unit: &mut U,
        block_index: usize,
        input: &[I],
        output: &dyn DeviceSlots<A>,
        n: usize,
    ) {
        debug_assert_eq!(unit.block_index(), block_index);
        debug_assert_eq!(unit.block_size(), B);

        // never read past the end of the input, even if n was overstated
        let n = n.min(input.len());
        let first_linear_index = unit.linear_index(0);
        let stride = unit.n_threads();

        // the block-shared buffer lives on the stack for the duration of the
        // block and never escapes this function
        let mut shared: [Option<A>; B] = core::array::from_fn(|_| None);

        // load phase
        unit.for_each_thread(&mut shared, |thread, slot| {
            for i in GridStride::new(first_linear_index + thread, stride, n) {
                self.fold_into(slot, (self.transform)(&input[i]));
            }
        });

        // collapse phase
        for CollapseStep { width, width_up } in CollapseSteps::new(B) {
            let (lower, upper) = shared[..width].split_at_mut(width_up);
            unit.for_each_pair(lower, upper, |_, left, right| {
                if let Some(right) = right {
                    self.fold_into(left, right.clone());
                }
            });
        }

        // publish phase
        let shared = &mut shared;
        unit.exec_once(|| {
            if let Some(partial) = shared.first_mut().and_then(Option::take) {
                output.store(block_index, partial);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::team::SerialBlock;
    use std::sync::Mutex;
    use std::vec;
    use std::vec::Vec;

    struct TestSlots<T>(Mutex<Vec<Option<T>>>);

    impl<T> TestSlots<T> {
        fn new(len: usize) -> Self {
            TestSlots(Mutex::new((0..len).map(|_| None).collect()))
        }

        fn into_inner(self) -> Vec<Option<T>> {
            self.0.into_inner().unwrap()
        }
    }

    impl<T: Send> DeviceSlots<T> for TestSlots<T> {
        fn len(&self) -> usize {
            self.0.lock().unwrap().len()
        }

        fn store(&self, index: usize, value: T) -> bool {
            let mut slots = self.0.lock().unwrap();
            match slots.get_mut(index) {
                Some(slot @ None) => {
                    *slot = Some(value);
                    true
                }
                _ => false,
            }
        }
    }

    // launches every block of the grid one after another
    fn launch_serial<I, A, K>(kernel: &K, input: &[I], grid_size: usize) -> Vec<Option<A>>
    where
        K: KernelBody<I, A>,
        A: Send,
    {
        let output = TestSlots::new(grid_size);
        for block_index in 0..grid_size {
            let mut unit = SerialBlock::new(block_index, grid_size, K::BLOCK_SIZE);
            kernel.run(&mut unit, block_index, input, &output, input.len());
        }
        output.into_inner()
    }

    #[test]
    fn single_block_transform_sum() {
        let kernel =
            ReduceKernel::<_, _, DEFAULT_BLOCK_SIZE>::new(|x: &i64| x + 13, |a: i64, b: i64| a + b);
        let input = vec![42_i64; 25];
        assert_eq!(launch_serial(&kernel, &input, 1), vec![Some(1375)]);
    }

    #[test]
    fn single_block_max() {
        let kernel =
            ReduceKernel::<_, _, DEFAULT_BLOCK_SIZE>::new(|x: &i32| *x, |a: i32, b: i32| a.max(b));
        assert_eq!(launch_serial(&kernel, &[1, 2, 3, 4, 5], 1), vec![Some(5)]);
    }

    #[test]
    fn partial_results_per_block() {
        let kernel = ReduceKernel::<_, _, 4>::new(|x: &u32| *x, |a: u32, b: u32| a + b);
        let input: Vec<u32> = (1..=10).collect();
        // blocks cover [1..=4], [5..=8], [9, 10]
        assert_eq!(
            launch_serial(&kernel, &input, 3),
            vec![Some(10), Some(26), Some(19)]
        );
    }

    #[test]
    fn grid_stride_covers_large_problems() {
        // 2 blocks of 4 members each have to cover 100 elements
        let kernel = ReduceKernel::<_, _, 4>::new(|x: &u64| *x, |a: u64, b: u64| a + b);
        let input: Vec<u64> = (0..100).collect();
        let partials = launch_serial(&kernel, &input, 2);
        let total: u64 = partials.iter().flatten().sum();
        assert_eq!(total, 4950);
    }

    #[test]
    fn blocks_without_elements_publish_nothing() {
        let kernel = ReduceKernel::<_, _, 4>::new(|x: &u32| *x, |a: u32, b: u32| a + b);
        assert_eq!(launch_serial(&kernel, &[7, 8], 2), vec![Some(15), None]);
    }

    #[test]
    fn non_power_of_two_tree_order() {
        // concatenating digits is associative, but not commutative. This
        // lets us observe the exact order of the collapse (5 -> 3 -> 2 -> 1)
        let concat = |(lhs, lhs_len): (u64, u32), (rhs, rhs_len): (u64, u32)| {
            (lhs * 10_u64.pow(rhs_len) + rhs, lhs_len + rhs_len)
        };
        let kernel = ReduceKernel::<_, _, 5>::new(|x: &u64| (*x, 1_u32), concat);
        let partials = launch_serial(&kernel, &[1, 2, 3, 4, 5], 1);
        // step 1: [1 4, 2 5, 3]; step 2: [1 4 3, 2 5]; step 3: [1 4 3 2 5]
        assert_eq!(partials, vec![Some((14325, 5))]);
    }

    #[test]
    fn non_power_of_two_sum_matches_fold() {
        let kernel = ReduceKernel::<_, _, 5>::new(|x: &i32| *x, |a: i32, b: i32| a + b);
        let input = [3, -1, 4, -1, 5];
        assert_eq!(launch_serial(&kernel, &input, 1), vec![Some(10)]);
        // fewer elements than members
        assert_eq!(launch_serial(&kernel, &input[..2], 1), vec![Some(2)]);
    }

    #[test]
    fn shared_bytes_scale_with_block_size() {
        let kernel =
            ReduceKernel::<_, _, DEFAULT_BLOCK_SIZE>::new(|x: &f64| *x, |a: f64, b: f64| a + b);
        assert_eq!(KernelBody::<f64, f64>::shared_bytes(&kernel), 256 * 8);
    }
}
