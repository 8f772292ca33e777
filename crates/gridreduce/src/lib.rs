/*!
Runs per-partition reductions and element-wise updates on block-parallel
accelerators, through one uniform interface.

<div class="warning">

Only host backends are implemented so far. They exist to make sure that the
kernels behave exactly like they would on a GPU.

</div>

# High-Level: Transform-Reduce

A higher-level collective algorithm (a distributed transform-reduce or
for-each) hands us one local partition at a time. The per-partition work is
expressed through an [`ExecutionPolicy`]:

```
use gridreduce::{CpuBlocks, ExecutionContext, Executor, HostDevice};
use gridreduce::{algorithm, make_parallel_policy};
use ndarray::Array1;

let host = HostDevice::get();
let device = CpuBlocks::new();
let ctx = ExecutionContext::new(&host, &device);
let executor = Executor::new(&ctx);
let policy = make_parallel_policy(&executor);

let partition = Array1::from_elem(25, 42_i64);
let total =
    algorithm::transform_reduce(&policy, partition.view(), 0, |a, b| a + b, |x| x + 13)
        .unwrap();
assert_eq!(total, 1375);
```

# Developer Guide

The pieces fit together as follows:
- an [`ExecutionContext`] bundles the [`HostDevice`], an [`Accelerator`] and
  the [`Queue`] that kernels are submitted to
- an [`Executor`] computes the [`LaunchGeometry`] of every launch, moves data
  between the host and the device, and finishes reductions on the host
- kernels are types implementing [`KernelBody`] (see [`ReduceKernel`],
  [`ForEachKernel`] and [`UniversalKernel`])

The device-side half is documented in [`gridreduce_nostd_internal`].

*/

#![deny(rustdoc::broken_intra_doc_links)]

// modules of this crate
pub mod algorithm;
mod backend;
mod buffer;
mod context;
mod error;
mod executor;
mod policy;
mod queue;

// the public interface
pub use backend::{Accelerator, CpuBlocks, CpuSerial, CpuThreads, HostDevice};
pub use buffer::{DeviceBuffer, DeviceMirror};
pub use context::ExecutionContext;
pub use error::{Error, Result};
pub use executor::{Executor, ExecutorConfig, OutputExtent};
pub use gridreduce_nostd_internal::{
    BlockFn, CollapseStep, CollapseSteps, DEFAULT_BLOCK_SIZE, DeviceSlots, ExecutionUnit,
    ForEachKernel, GeometryError, GridStride, KernelBody, LaunchGeometry, ReduceKernel,
    SerialBlock, UniversalKernel, collapse_widths,
};
pub use policy::{
    ExecutionPolicy, ParallelPolicy, SequentialPolicy, make_parallel_policy,
    make_sequential_policy,
};
pub use queue::Queue;
