//! Execution policies
//!
//! A policy is chosen at the call site of a higher-level algorithm (see
//! [`crate::algorithm`]) and decides where the per-partition work runs:
//! - [`ParallelPolicy`] dispatches through an [`Executor`] (relaxed
//!   ordering, runs on the accelerator)
//! - [`SequentialPolicy`] falls back to plain loops on the calling thread
//!   and never touches an accelerator
//!
//! Both are tiny `Copy` types, so passing them around is free.

use crate::backend::Accelerator;
use crate::error::Result;
use crate::executor::Executor;

/// The interface shared by every execution policy.
pub trait ExecutionPolicy {
    /// whether work is dispatched to an accelerator
    fn is_parallel(&self) -> bool;

    /// Folds `transform(x)` for every element `x` of `source` into `init`
    /// using `combine`.
    ///
    /// The order in which elements are combined is only specified for the
    /// sequential policy; `combine` should be associative and commutative.
    fn transform_reduce<I, T, Tr, Co>(
        &self,
        source: &[I],
        init: T,
        combine: Co,
        transform: Tr,
    ) -> Result<T>
    where
        I: Clone + Sync,
        T: Clone + Send + Sync,
        Tr: Fn(&I) -> T + Sync,
        Co: Fn(T, T) -> T + Sync;

    /// Replaces every element `x` of `data` with `func(x)`.
    fn for_each<T, F>(&self, data: &mut [T], func: F) -> Result<()>
    where
        T: Clone + Send + Sync,
        F: Fn(&T) -> T + Sync;
}

/// Strictly sequential execution on the calling thread
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SequentialPolicy;

impl ExecutionPolicy for SequentialPolicy {
    fn is_parallel(&self) -> bool {
        false
    }

    fn transform_reduce<I, T, Tr, Co>(
        &self,
        source: &[I],
        init: T,
        combine: Co,
        transform: Tr,
    ) -> Result<T>
    where
        I: Clone + Sync,
        T: Clone + Send + Sync,
        Tr: Fn(&I) -> T + Sync,
        Co: Fn(T, T) -> T + Sync,
    {
        Ok(source
            .iter()
            .fold(init, |accum, x| combine(accum, transform(x))))
    }

    fn for_each<T, F>(&self, data: &mut [T], func: F) -> Result<()>
    where
        T: Clone + Send + Sync,
        F: Fn(&T) -> T + Sync,
    {
        for x in data.iter_mut() {
            *x = func(x);
        }
        Ok(())
    }
}

/// Relaxed execution through an [`Executor`]
#[derive(Debug)]
pub struct ParallelPolicy<'e, 'c, 'd, A: Accelerator> {
    executor: &'e Executor<'c, 'd, A>,
}

// a derive would require `A: Clone`
impl<A: Accelerator> Clone for ParallelPolicy<'_, '_, '_, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: Accelerator> Copy for ParallelPolicy<'_, '_, '_, A> {}

impl<'e, 'c, 'd, A: Accelerator> ParallelPolicy<'e, 'c, 'd, A> {
    pub fn executor(&self) -> &'e Executor<'c, 'd, A> {
        self.executor
    }
}

impl<A: Accelerator> ExecutionPolicy for ParallelPolicy<'_, '_, '_, A> {
    fn is_parallel(&self) -> bool {
        true
    }

    fn transform_reduce<I, T, Tr, Co>(
        &self,
        source: &[I],
        init: T,
        combine: Co,
        transform: Tr,
    ) -> Result<T>
    where
        I: Clone + Sync,
        T: Clone + Send + Sync,
        Tr: Fn(&I) -> T + Sync,
        Co: Fn(T, T) -> T + Sync,
    {
        self.executor.reduce(source, init, combine, transform)
    }

    fn for_each<T, F>(&self, data: &mut [T], func: F) -> Result<()>
    where
        T: Clone + Send + Sync,
        F: Fn(&T) -> T + Sync,
    {
        self.executor.for_each(data, func)
    }
}

/// Selects relaxed execution through `executor`
pub fn make_parallel_policy<'e, 'c, 'd, A: Accelerator>(
    executor: &'e Executor<'c, 'd, A>,
) -> ParallelPolicy<'e, 'c, 'd, A> {
    ParallelPolicy { executor }
}

/// Selects the sequential fallback
pub fn make_sequential_policy() -> SequentialPolicy {
    SequentialPolicy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_fold_order() {
        let policy = make_sequential_policy();
        assert!(!policy.is_parallel());
        // string concatenation exposes the order of the fold
        let out = policy
            .transform_reduce(
                &[1, 2, 3],
                String::from(">"),
                |a, b| a + &b,
                |x: &i32| x.to_string(),
            )
            .unwrap();
        assert_eq!(out, ">123");
    }

    #[test]
    fn sequential_for_each() {
        let mut data = [1.0, 2.0, 4.0];
        SequentialPolicy.for_each(&mut data, |x| x * 0.5).unwrap();
        assert_eq!(data, [0.5, 1.0, 2.0]);
    }
}
