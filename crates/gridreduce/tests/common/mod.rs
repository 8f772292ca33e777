// the reason this is named mod.rs has to do with how integration tests are
// compiled: every file directly inside tests/ is its own crate, so shared
// helpers live in a subdirectory
//
// https://doc.rust-lang.org/book/ch11-03-test-organization.html#submodules-in-integration-tests

#![allow(dead_code)]

use gridreduce::{Accelerator, CpuSerial, DeviceSlots, KernelBody, LaunchGeometry};
use rand::distr::{Distribution, Uniform};
use rand_xoshiro::Xoshiro256PlusPlus;
use rand_xoshiro::rand_core::SeedableRng;
use std::sync::atomic::{AtomicUsize, Ordering};

/// the problem sizes that every backend gets checked against (these straddle
/// the default block size)
pub const PROBLEM_SIZES: [usize; 6] = [1, 255, 256, 257, 1000, 5000];

/// installs a subscriber so that `RUST_LOG`-style output shows up when a test
/// fails (calling this more than once is harmless)
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// draws `len` integers from `[-1000, 1000)`
pub fn random_ints(seed: u64, len: usize) -> Vec<i64> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let dist = Uniform::try_from(-1000_i64..1000).unwrap();
    (0..len).map(|_| dist.sample(&mut rng)).collect()
}

/// draws `len` floats from `[-1, 1)`
pub fn random_floats(seed: u64, len: usize) -> Vec<f64> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let dist = Uniform::try_from(-1.0..1.0).unwrap();
    (0..len).map(|_| dist.sample(&mut rng)).collect()
}

/// the reference result: a left-to-right fold
pub fn sequential_fold<I, T>(
    source: &[I],
    seed: T,
    combine: impl Fn(T, T) -> T,
    transform: impl Fn(&I) -> T,
) -> T {
    source
        .iter()
        .fold(seed, |accum, x| combine(accum, transform(x)))
}

/// Wraps the serial backend and counts how often it executes a grid
#[derive(Debug, Default)]
pub struct CountingAccelerator {
    inner: CpuSerial,
    grids: AtomicUsize,
}

impl CountingAccelerator {
    pub fn grids_executed(&self) -> usize {
        self.grids.load(Ordering::SeqCst)
    }
}

impl Accelerator for CountingAccelerator {
    fn name(&self) -> &'static str {
        "counting"
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
        self.grids.fetch_add(1, Ordering::SeqCst);
        self.inner.run_blocks(geometry, kernel, input, output, n)
    }
}

/// A backend whose device faults on every launch
#[derive(Debug, Default)]
pub struct FaultyAccelerator;

impl Accelerator for FaultyAccelerator {
    fn name(&self) -> &'static str {
        "faulty"
    }

    fn run_blocks<I, O, K>(
        &self,
        _geometry: &LaunchGeometry,
        _kernel: &K,
        _input: &[I],
        _output: &dyn DeviceSlots<O>,
        _n: usize,
    ) where
        I: Sync,
        K: KernelBody<I, O>,
    {
        panic!("simulated device fault")
    }
}
