//! Implements the multi-core host backends (built on top of rayon)
//!
//! There are 2 natural ways to map a grid onto CPU cores:
//! - [`CpuBlocks`] hands whole blocks to the worker threads; a single worker
//!   simulates every member of its block (the way we would normally want to
//!   run on a CPU)
//! - [`CpuThreads`] executes blocks one at a time, but the members of a block
//!   are spread across the worker threads. The end of each collective
//!   operation is a real barrier in this case, which makes this the closest
//!   analog of a GPU that we have on the host.

use crate::backend::Accelerator;
use crate::error::{Error, Result};
use gridreduce_nostd_internal::{
    DeviceSlots, ExecutionUnit, KernelBody, LaunchGeometry, SerialBlock,
};
use rayon::prelude::*;
use std::sync::Arc;

/// Either a dedicated rayon thread pool or rayon's global pool
#[derive(Clone, Debug, Default)]
struct WorkerPool(Option<Arc<rayon::ThreadPool>>);

impl WorkerPool {
    fn with_threads(
        n_threads: usize,
        stack_bytes: Option<usize>,
        backend: &'static str,
    ) -> Result<Self> {
        let mut builder = rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .thread_name(move |i| format!("{backend}-worker-{i}"));
        if let Some(stack_bytes) = stack_bytes {
            builder = builder.stack_size(stack_bytes);
        }
        builder
            .build()
            .map(|pool| WorkerPool(Some(Arc::new(pool))))
            .map_err(|err| Error::backend_execution(backend, err.to_string()))
    }

    fn install<R, OP>(&self, op: OP) -> R
    where
        R: Send,
        OP: FnOnce() -> R + Send,
    {
        match &self.0 {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    fn n_threads(&self) -> usize {
        match &self.0 {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }
}

/// The multi-core host backend where blocks are distributed among worker
/// threads.
#[derive(Clone, Debug, Default)]
pub struct CpuBlocks {
    pool: WorkerPool,
    max_allocation: Option<usize>,
}

impl CpuBlocks {
    /// Use rayon's global thread pool
    pub fn new() -> Self {
        CpuBlocks::default()
    }

    /// Use a dedicated pool of `n_threads` worker threads (0 lets rayon pick)
    pub fn with_threads(n_threads: usize) -> Result<Self> {
        Ok(CpuBlocks {
            pool: WorkerPool::with_threads(n_threads, None, "cpu-blocks")?,
            max_allocation: None,
        })
    }

    /// Like [`CpuBlocks::with_threads`], but every worker gets a stack of
    /// `stack_bytes` bytes. Kernels keep their block-shared buffer on the
    /// stack of the worker that runs the block, so large accumulators need
    /// this (see [`KernelBody::shared_bytes`]).
    pub fn with_worker_stack(n_threads: usize, stack_bytes: usize) -> Result<Self> {
        Ok(CpuBlocks {
            pool: WorkerPool::with_threads(n_threads, Some(stack_bytes), "cpu-blocks")?,
            max_allocation: None,
        })
    }

    /// Limit the size of a single allocation on this device
    pub fn with_max_allocation(mut self, bytes: usize) -> Self {
        self.max_allocation = Some(bytes);
        self
    }

    /// the number of worker threads that blocks are distributed among
    pub fn n_workers(&self) -> usize {
        self.pool.n_threads()
    }
}

impl Accelerator for CpuBlocks {
    fn name(&self) -> &'static str {
        "cpu-blocks"
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
        let block_size = geometry.block_size();
        self.pool.install(|| {
            (0..grid_size).into_par_iter().for_each(|block_index| {
                let mut unit = SerialBlock::new(block_index, grid_size, block_size);
                kernel.run(&mut unit, block_index, input, output, n);
            })
        });
    }
}

/// The host backend where the members of a block run concurrently.
#[derive(Clone, Debug, Default)]
pub struct CpuThreads {
    pool: WorkerPool,
    max_allocation: Option<usize>,
}

impl CpuThreads {
    /// Use rayon's global thread pool
    pub fn new() -> Self {
        CpuThreads::default()
    }

    /// Use a dedicated pool of `n_threads` worker threads (0 lets rayon pick)
    pub fn with_threads(n_threads: usize) -> Result<Self> {
        Ok(CpuThreads {
            pool: WorkerPool::with_threads(n_threads, None, "cpu-threads")?,
            max_allocation: None,
        })
    }

    /// Like [`CpuThreads::with_threads`], but every worker gets a stack of
    /// `stack_bytes` bytes. Kernels keep their block-shared buffer on the
    /// stack of the worker that runs the block, so large accumulators need
    /// this (see [`KernelBody::shared_bytes`]).
    pub fn with_worker_stack(n_threads: usize, stack_bytes: usize) -> Result<Self> {
        Ok(CpuThreads {
            pool: WorkerPool::with_threads(n_threads, Some(stack_bytes), "cpu-threads")?,
            max_allocation: None,
        })
    }

    /// Limit the size of a single allocation on this device
    pub fn with_max_allocation(mut self, bytes: usize) -> Self {
        self.max_allocation = Some(bytes);
        self
    }

    /// the number of worker threads that the members of a block are
    /// distributed among
    pub fn n_workers(&self) -> usize {
        self.pool.n_threads()
    }
}

impl Accelerator for CpuThreads {
    fn name(&self) -> &'static str {
        "cpu-threads"
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
        let block_size = geometry.block_size();
        self.pool.install(|| {
            for block_index in 0..grid_size {
                let mut unit = ThreadedBlock {
                    block_index,
                    grid_width: grid_size,
                    block_size,
                };
                kernel.run(&mut unit, block_index, input, output, n);
            }
        });
    }
}

/// An execution unit whose members are executed by rayon's worker threads.
///
/// Every collective operation is a parallel fork-join, so the join at the end
/// of each operation acts as the block-wide barrier.
#[derive(Clone, Copy, Debug)]
struct ThreadedBlock {
    block_index: usize,
    grid_width: usize,
    block_size: usize,
}

impl ExecutionUnit for ThreadedBlock {
    fn block_index(&self) -> usize {
        self.block_index
    }

    fn grid_width(&self) -> usize {
        self.grid_width
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn for_each_member<F>(&mut self, f: F)
    where
        F: Fn(usize) + Sync,
    {
        (0..self.block_size)
            .into_par_iter()
            .for_each(|thread| f(thread));
    }

    fn for_each_thread<T, F>(&mut self, shared: &mut [T], f: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync,
    {
        shared
            .par_iter_mut()
            .take(self.block_size)
            .enumerate()
            .for_each(|(thread, slot)| f(thread, slot));
    }

    fn for_each_pair<T, F>(&mut self, lower: &mut [T], upper: &[T], f: F)
    where
        T: Send + Sync,
        F: Fn(usize, &mut T, &T) + Sync,
    {
        lower
            .par_iter_mut()
            .zip(upper.par_iter())
            .enumerate()
            .for_each(|(thread, (left, right))| f(thread, left, right));
    }

    fn exec_once<F>(&mut self, f: F)
    where
        F: FnOnce(),
    {
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn threaded_block_runs_every_member() {
        let mut unit = ThreadedBlock {
            block_index: 1,
            grid_width: 2,
            block_size: 64,
        };
        let counter = AtomicUsize::new(0);
        unit.for_each_member(|_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(counter.load(Ordering::Relaxed), 64);

        let mut shared = vec![0_usize; 64];
        unit.for_each_thread(&mut shared, |thread, slot| *slot = thread);
        assert!(shared.iter().enumerate().all(|(i, &v)| i == v));

        let (lower, upper) = shared.split_at_mut(32);
        unit.for_each_pair(lower, upper, |_, left, right| *left += *right);
        assert!(shared[..32].iter().enumerate().all(|(t, &v)| v == 2 * t + 32));
    }

    #[test]
    fn worker_stack_fits_large_accumulators() {
        use gridreduce_nostd_internal::{DEFAULT_BLOCK_SIZE, ReduceKernel};

        // a 16 KiB histogram per member adds up to 4 MiB of block-shared
        // memory, more than a default thread stack holds
        const N_BINS: usize = 2048;
        let kernel = ReduceKernel::<_, _, DEFAULT_BLOCK_SIZE>::new(
            |x: &u64| {
                let mut hist = [0_u64; N_BINS];
                hist[*x as usize % N_BINS] += 1;
                hist
            },
            |mut a: [u64; N_BINS], b: [u64; N_BINS]| {
                a.iter_mut().zip(b.iter()).for_each(|(a, b)| *a += b);
                a
            },
        );
        assert!(KernelBody::<u64, [u64; N_BINS]>::shared_bytes(&kernel) > 2 << 20);

        let input: Vec<u64> = (0..3000).collect();
        let geometry = LaunchGeometry::new(input.len(), DEFAULT_BLOCK_SIZE, 0, None)
            .unwrap()
            .unwrap();
        let output =
            crate::buffer::DeviceBuffer::<[u64; N_BINS]>::alloc(geometry.grid_size(), None)
                .unwrap();

        let device = CpuBlocks::with_worker_stack(2, 64 << 20).unwrap();
        device
            .launch(
                &geometry,
                &kernel,
                &input,
                &output as &dyn DeviceSlots<[u64; N_BINS]>,
                input.len(),
            )
            .unwrap();
        let total = output
            .copy_to_host()
            .into_iter()
            .flatten()
            .reduce(|mut a, b| {
                a.iter_mut().zip(b.iter()).for_each(|(a, b)| *a += b);
                a
            })
            .unwrap();
        assert_eq!(total.iter().sum::<u64>(), 3000);
        assert_eq!(total[5], 2);
        assert_eq!(total[2047], 1);
    }

    #[test]
    fn dedicated_pool() {
        let device = CpuBlocks::with_threads(2).unwrap();
        assert_eq!(device.n_workers(), 2);
        let device = CpuThreads::with_threads(3).unwrap();
        assert_eq!(device.n_workers(), 3);
        let device = CpuThreads::with_worker_stack(1, 8 << 20).unwrap();
        assert_eq!(device.n_workers(), 1);
    }
}
