/*!
The device-side half of `gridreduce`.

Everything in this crate is written so that it could run "on the device"
(it is `no_std` and never allocates). It describes:
- how a launch is shaped ([`LaunchGeometry`]) and how a single logical
  thread traverses the problem ([`GridStride`])
- the execution-unit handed to a kernel body for one block
  ([`ExecutionUnit`]), along with a serial implementation ([`SerialBlock`])
- the launch interface shared by every kernel body ([`KernelBody`]) and an
  adapter for arbitrary block functors ([`UniversalKernel`])
- the kernel bodies themselves ([`ReduceKernel`], [`ForEachKernel`])

The host-side half (backends, buffers, queues, executors and policies) lives
in the `gridreduce` crate.
*/

#![no_std]
#![deny(rustdoc::broken_intra_doc_links)]

mod for_each;
mod geometry;
mod grid_stride;
mod kernel;
mod reduce;
mod slots;
mod team;

pub use for_each::ForEachKernel;
pub use geometry::{
    CollapseStep, CollapseSteps, DEFAULT_BLOCK_SIZE, GeometryError, LaunchGeometry,
    collapse_widths,
};
pub use grid_stride::GridStride;
pub use kernel::{BlockFn, KernelBody, UniversalKernel};
pub use reduce::ReduceKernel;
pub use slots::DeviceSlots;
pub use team::{ExecutionUnit, SerialBlock};
