use crate::backend::Accelerator;
use crate::error::Result;
use gridreduce_nostd_internal::{DeviceSlots, KernelBody, LaunchGeometry};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

/// A command queue bound to a single accelerator device.
///
/// The queue is synchronous: a launch runs to completion inside
/// [`Queue::enqueue`], which returns the status of that launch (and only that
/// launch) to the submitter. A queue may be shared by several threads.
/// [`Queue::wait`] blocks until every launch that was in flight has
/// finished; it is meant for teardown.
#[derive(Debug)]
pub struct Queue<'d, A: Accelerator> {
    device: &'d A,
    launches: AtomicUsize,
    failures: AtomicUsize,
    in_flight: Mutex<usize>,
    idle: Condvar,
}

/// Marks a submission as finished when dropped (even if the launch unwinds)
struct InFlight<'q> {
    count: &'q Mutex<usize>,
    idle: &'q Condvar,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut count = self.count.lock();
        *count -= 1;
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

impl<'d, A: Accelerator> Queue<'d, A> {
    pub(crate) fn new(device: &'d A) -> Self {
        Queue {
            device,
            launches: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            in_flight: Mutex::new(0),
            idle: Condvar::new(),
        }
    }

    /// the device that launches are submitted to
    pub fn device(&self) -> &'d A {
        self.device
    }

    /// the number of kernels submitted to this queue so far
    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::Acquire)
    }

    /// the number of submitted kernels that failed
    pub fn failure_count(&self) -> usize {
        self.failures.load(Ordering::Acquire)
    }

    /// Submits a launch of `kernel` over `geometry` and reports how that
    /// launch went.
    pub fn enqueue<I, O, K>(
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
        *self.in_flight.lock() += 1;
        let _in_flight = InFlight {
            count: &self.in_flight,
            idle: &self.idle,
        };

        let launch_id = self.launches.fetch_add(1, Ordering::AcqRel);
        debug!(
            launch_id,
            grid_size = geometry.grid_size(),
            block_size = geometry.block_size(),
            shared_bytes = geometry.shared_bytes(),
            "submitting kernel"
        );
        let status = self.device.launch(geometry, kernel, input, output, n);
        if let Err(err) = &status {
            self.failures.fetch_add(1, Ordering::AcqRel);
            warn!(launch_id, %err, "kernel launch failed");
        }
        status
    }

    /// Blocks until no launch is in flight.
    pub fn wait(&self) {
        let mut in_flight = self.in_flight.lock();
        while *in_flight > 0 {
            self.idle.wait(&mut in_flight);
        }
    }
}
