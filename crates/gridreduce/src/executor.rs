//! The executor owns every launch: it derives the launch geometry, moves data
//! to and from the device, submits the kernel and finishes the reduction on
//! the host.

use crate::backend::Accelerator;
use crate::buffer::{DeviceBuffer, DeviceMirror};
use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use gridreduce_nostd_internal::{
    DEFAULT_BLOCK_SIZE, ForEachKernel, KernelBody, LaunchGeometry, ReduceKernel,
};
use std::num::NonZeroUsize;
use tracing::{debug, instrument};

/// Configures an [`Executor`]
///
/// By default, a launch uses `ceil(n / block_size)` blocks. Capping the
/// grid size makes every logical thread visit several elements instead.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecutorConfig {
    max_grid_size: Option<NonZeroUsize>,
}

impl ExecutorConfig {
    pub fn new() -> Self {
        ExecutorConfig::default()
    }

    /// caps the number of blocks in a single launch
    pub fn with_max_grid_size(mut self, max_grid_size: NonZeroUsize) -> Self {
        self.max_grid_size = Some(max_grid_size);
        self
    }

    pub fn max_grid_size(&self) -> Option<NonZeroUsize> {
        self.max_grid_size
    }
}

/// Describes how many output slots a launch needs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputExtent {
    /// one slot per block
    PerBlock,
    /// one slot per element of the input
    PerElement,
    /// an exact number of slots
    Exact(usize),
}

impl OutputExtent {
    fn len(&self, geometry: &LaunchGeometry, n: usize) -> usize {
        match *self {
            OutputExtent::PerBlock => geometry.grid_size(),
            OutputExtent::PerElement => n,
            OutputExtent::Exact(len) => len,
        }
    }
}

/// Executes algorithms on the accelerator of an [`ExecutionContext`].
///
/// An executor doesn't hold any state besides its configuration, so
/// independently constructed executors always produce identical results.
#[derive(Debug)]
pub struct Executor<'c, 'd, A: Accelerator> {
    context: &'c ExecutionContext<'d, A>,
    config: ExecutorConfig,
}

impl<'c, 'd, A: Accelerator> Executor<'c, 'd, A> {
    pub fn new(context: &'c ExecutionContext<'d, A>) -> Self {
        Executor::with_config(context, ExecutorConfig::default())
    }

    pub fn with_config(context: &'c ExecutionContext<'d, A>, config: ExecutorConfig) -> Self {
        Executor { context, config }
    }

    pub fn context(&self) -> &'c ExecutionContext<'d, A> {
        self.context
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Computes the geometry used to launch `kernel` over `n` elements.
    ///
    /// Returns `Ok(None)` when there is nothing to launch.
    pub fn geometry_for<I, O, K>(&self, kernel: &K, n: usize) -> Result<Option<LaunchGeometry>>
    where
        K: KernelBody<I, O>,
    {
        let geometry = LaunchGeometry::new(
            n,
            K::BLOCK_SIZE,
            kernel.shared_bytes(),
            self.config.max_grid_size.map(NonZeroUsize::get),
        )?;
        Ok(geometry)
    }

    /// Launches an arbitrary kernel body over `input`.
    ///
    /// Returns the contents of the output buffer (slots the kernel didn't
    /// write are `None`). An empty `input` doesn't launch anything and
    /// produces an empty output.
    #[instrument(level = "debug", skip_all, fields(n = input.len(), device = self.context.device().name()))]
    pub fn launch<I, O, K>(
        &self,
        kernel: &K,
        input: &[I],
        extent: OutputExtent,
    ) -> Result<Vec<Option<O>>>
    where
        I: Clone + Sync,
        O: Send + Sync,
        K: KernelBody<I, O>,
    {
        Ok(self.run(kernel, input, extent)?.unwrap_or_default())
    }

    /// Computes the transform-reduce of `source`.
    ///
    /// Every element is passed through `transform` and the results are
    /// folded together with `combine`, which must be associative and
    /// commutative. The fold starts from `seed`, which is returned as is
    /// when `source` is empty (no kernel is launched in that case).
    #[instrument(level = "debug", skip_all, fields(n = source.len(), device = self.context.device().name()))]
    pub fn reduce<I, Acc, Tr, Co>(&self, source: &[I], seed: Acc, combine: Co, transform: Tr) -> Result<Acc>
    where
        I: Clone + Sync,
        Acc: Clone + Send + Sync,
        Tr: Fn(&I) -> Acc + Sync,
        Co: Fn(Acc, Acc) -> Acc + Sync,
    {
        let kernel = ReduceKernel::<_, _, DEFAULT_BLOCK_SIZE>::new(transform, combine);
        self.reduce_with_kernel(&kernel, source, seed)
    }

    /// Like [`Executor::reduce`], but with a preconfigured kernel (e.g. one
    /// instantiated with a custom block size).
    pub fn reduce_with_kernel<I, Acc, Tr, Co, const B: usize>(
        &self,
        kernel: &ReduceKernel<Tr, Co, B>,
        source: &[I],
        seed: Acc,
    ) -> Result<Acc>
    where
        I: Clone + Sync,
        Acc: Clone + Send + Sync,
        Tr: Fn(&I) -> Acc + Sync,
        Co: Fn(Acc, Acc) -> Acc + Sync,
    {
        let Some(partials) = self.run(kernel, source, OutputExtent::PerBlock)? else {
            return Ok(seed);
        };
        // the final fold always proceeds in order of ascending block index.
        // Blocks that didn't load any elements don't publish a result.
        Ok(partials
            .into_iter()
            .flatten()
            .fold(seed, |accum, partial| kernel.combine(accum, partial)))
    }

    /// Applies `func` to every element of `data`, in place.
    #[instrument(level = "debug", skip_all, fields(n = data.len(), device = self.context.device().name()))]
    pub fn for_each<T, F>(&self, data: &mut [T], func: F) -> Result<()>
    where
        T: Clone + Send + Sync,
        F: Fn(&T) -> T + Sync,
    {
        let transformed = self.transform(&*data, func)?;
        data.clone_from_slice(&transformed);
        Ok(())
    }

    /// Applies `func` to every element of `source` and collects the results.
    pub fn transform<I, O, F>(&self, source: &[I], func: F) -> Result<Vec<O>>
    where
        I: Clone + Sync,
        O: Send + Sync,
        F: Fn(&I) -> O + Sync,
    {
        let kernel = ForEachKernel::<_, DEFAULT_BLOCK_SIZE>::new(func);
        let Some(out) = self.run(&kernel, source, OutputExtent::PerElement)? else {
            return Ok(Vec::new());
        };
        let n_missing = out.iter().filter(|slot| slot.is_none()).count();
        if n_missing > 0 {
            return Err(Error::backend_execution(
                self.context.device().name(),
                format!("the kernel never wrote {n_missing} of the output elements"),
            ));
        }
        Ok(out.into_iter().flatten().collect())
    }

    /// Performs a single launch: returns `Ok(None)` if `input` is empty.
    fn run<I, O, K>(
        &self,
        kernel: &K,
        input: &[I],
        extent: OutputExtent,
    ) -> Result<Option<Vec<Option<O>>>>
    where
        I: Clone + Sync,
        O: Send + Sync,
        K: KernelBody<I, O>,
    {
        let n = input.len();
        let Some(geometry) = self.geometry_for(kernel, n)? else {
            debug!("empty input, skipping the launch");
            return Ok(None);
        };
        debug!(
            grid_size = geometry.grid_size(),
            block_size = geometry.block_size(),
            covers = geometry.covers(n),
            "computed launch geometry"
        );

        let device = self.context.device();
        let mirror = DeviceMirror::from_host(input, device.max_allocation())?;
        let output = DeviceBuffer::alloc(extent.len(&geometry, n), device.max_allocation())?;

        let queue = self.context.queue();
        queue.enqueue::<I, O, K>(&geometry, kernel, mirror.as_slice(), &output, n)?;

        let rejected = output.rejected_stores();
        if rejected > 0 {
            return Err(Error::backend_execution(
                device.name(),
                format!("{rejected} stores to the output buffer were rejected"),
            ));
        }
        Ok(Some(output.copy_to_host()))
    }
}
