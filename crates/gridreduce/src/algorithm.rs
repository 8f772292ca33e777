//! The higher-level collective algorithms, restricted to local partitions.
//!
//! A distributed array hands us its local partitions as 1D array views. Each
//! partition is processed through an [`ExecutionPolicy`]; combining the
//! per-partition results (across nodes) is the caller's job, with
//! [`transform_reduce_partitions`] covering the case where every partition
//! lives on this node.

use crate::error::Result;
use crate::policy::ExecutionPolicy;
use ndarray::{ArrayView1, ArrayViewMut1};
use std::borrow::Cow;
use tracing::debug;

/// borrows the elements of a contiguous view, and copies a strided one
fn contiguous<'a, T: Clone>(partition: &ArrayView1<'a, T>) -> Cow<'a, [T]> {
    match partition.to_slice() {
        Some(slice) => Cow::Borrowed(slice),
        None => {
            debug!(len = partition.len(), "copying a non-contiguous partition");
            Cow::Owned(partition.to_vec())
        }
    }
}

/// Reduces a single local partition.
///
/// Every element `x` contributes `transform(x)` and the contributions are
/// folded into `init` with `combine` (which should be associative and
/// commutative). An empty partition produces `init`.
pub fn transform_reduce<P, I, T, Tr, Co>(
    policy: &P,
    partition: ArrayView1<'_, I>,
    init: T,
    combine: Co,
    transform: Tr,
) -> Result<T>
where
    P: ExecutionPolicy,
    I: Clone + Sync,
    T: Clone + Send + Sync,
    Tr: Fn(&I) -> T + Sync,
    Co: Fn(T, T) -> T + Sync,
{
    let source = contiguous(&partition);
    policy.transform_reduce(&*source, init, combine, transform)
}

/// Reduces several local partitions.
///
/// Each non-empty partition is reduced on its own (seeded by the transform
/// of its first element) and the per-partition results are then folded into
/// `init` on the host, in order.
pub fn transform_reduce_partitions<'a, P, I, T, Tr, Co, It>(
    policy: &P,
    partitions: It,
    init: T,
    combine: Co,
    transform: Tr,
) -> Result<T>
where
    P: ExecutionPolicy,
    I: Clone + Sync + 'a,
    T: Clone + Send + Sync,
    Tr: Fn(&I) -> T + Sync,
    Co: Fn(T, T) -> T + Sync,
    It: IntoIterator<Item = ArrayView1<'a, I>>,
{
    let mut accum = init;
    for partition in partitions {
        let source = contiguous(&partition);
        let Some((first, rest)) = source.split_first() else {
            continue;
        };
        let local = policy.transform_reduce(rest, transform(first), &combine, &transform)?;
        accum = combine(accum, local);
    }
    Ok(accum)
}

/// Replaces every element `x` of a local partition with `func(x)`.
///
/// A strided view is updated through a contiguous copy, which is written
/// back once the policy is done with it.
pub fn for_each<P, T, F>(policy: &P, mut partition: ArrayViewMut1<'_, T>, func: F) -> Result<()>
where
    P: ExecutionPolicy,
    T: Clone + Send + Sync,
    F: Fn(&T) -> T + Sync,
{
    if let Some(slice) = partition.as_slice_mut() {
        return policy.for_each(slice, func);
    }
    debug!(len = partition.len(), "copying a non-contiguous partition");
    let mut buf = partition.to_vec();
    policy.for_each(&mut buf, func)?;
    for (dst, src) in partition.iter_mut().zip(buf) {
        *dst = src;
    }
    Ok(())
}
