use crate::backend::{Accelerator, HostDevice};
use crate::queue::Queue;
use tracing::{info, warn};

/// Bundles the host device, the accelerator device and the queue that an
/// executor needs.
///
/// The device handles are borrowed (they are resolved once, before the
/// context is built) while the queue is owned by the context. All work on
/// the queue is drained when the context is torn down.
///
/// ```
/// use gridreduce::{CpuSerial, ExecutionContext, Executor, HostDevice};
///
/// let host = HostDevice::get();
/// let device = CpuSerial::new();
/// let ctx = ExecutionContext::new(&host, &device);
/// let executor = Executor::new(&ctx);
/// let total = executor
///     .reduce(&[1, 2, 3, 4], 0, |a, b| a + b, |x: &i32| *x)
///     .unwrap();
/// assert_eq!(total, 10);
/// ```
#[derive(Debug)]
pub struct ExecutionContext<'d, A: Accelerator> {
    host: &'d HostDevice,
    device: &'d A,
    queue: Queue<'d, A>,
}

impl<'d, A: Accelerator> ExecutionContext<'d, A> {
    /// Creates a context with a new queue bound to `device`
    pub fn new(host: &'d HostDevice, device: &'d A) -> Self {
        info!(
            host = host.name(),
            device = device.name(),
            "creating execution context"
        );
        ExecutionContext {
            host,
            device,
            queue: Queue::new(device),
        }
    }

    pub fn host(&self) -> &'d HostDevice {
        self.host
    }

    pub fn device(&self) -> &'d A {
        self.device
    }

    pub fn queue(&self) -> &Queue<'d, A> {
        &self.queue
    }

    /// Waits for all submitted work to finish
    pub fn drain(&self) {
        self.queue.wait()
    }
}

impl<A: Accelerator> Drop for ExecutionContext<'_, A> {
    fn drop(&mut self) {
        self.drain();
        let failures = self.queue.failure_count();
        if failures > 0 {
            warn!(device = self.device.name(), failures, "some launches failed");
        }
        info!(
            device = self.device.name(),
            launches = self.queue.launch_count(),
            "tearing down execution context"
        );
    }
}
