//! Our parallelism abstractions use the concepts of blocks & execution units
//!
//! When a kernel is launched, the work is distributed among a grid of
//! blocks:
//! - every block is composed of `block_size` logical threads (the members of
//!   the block). The members of a block work together in a tightly-coupled,
//!   synchronous manner and can share a fast block-local buffer.
//! - blocks never synchronize with each other and may run in any order (or
//!   all at once).
//!
//! This abstraction nicely maps to hardware:
//! - on GPUs, a block is a thread block and each member is a GPU thread
//! - on CPUs, a block is most naturally driven by a single OS thread that
//!   either simulates each member one after another, or hands the members
//!   out to a pool of worker threads.
//!
//! # Why collective operations instead of a barrier primitive?
//! On a GPU, a kernel body is written from the perspective of a single
//! thread, which calls a barrier whenever it needs to wait for the rest of
//! the block. That style can't be executed by a single CPU thread that
//! simulates every member (the simulation would need to suspend a member at
//! the barrier and resume it later).
//!
//! Instead, [`ExecutionUnit`] exposes *collective* operations. All members of
//! a block enter a collective operation together and there is a block-wide
//! barrier at the end of every collective operation. A kernel body is then a
//! sequence of collective operations, which lets us write a serial
//! implementation supporting arbitrary block sizes that returns bitwise
//! identical results to the parallel implementations.

/// The execution-unit handed to a kernel body for the duration of one block.
///
/// The methods that accept closures are collective: the closure is called
/// once for every participating member of the block and the call doesn't
/// return until every member is done (i.e. it ends with a barrier).
///
/// Shared slices passed to the collective operations play the role of the
/// block-shared buffer. Member `t` is only ever handed the `t`th entry, so
/// members never contend for the same memory.
pub trait ExecutionUnit {
    /// index of the block within the grid
    fn block_index(&self) -> usize;

    /// number of blocks in the grid
    fn grid_width(&self) -> usize;

    /// number of members (logical threads) in the block
    fn block_size(&self) -> usize;

    /// the grid-wide index of the member with the in-block index `thread`
    #[inline]
    fn linear_index(&self, thread: usize) -> usize {
        self.block_index() * self.block_size() + thread
    }

    /// total number of logical threads in the grid
    #[inline]
    fn n_threads(&self) -> usize {
        self.grid_width() * self.block_size()
    }

    /// Every member calls `f` with its in-block index.
    fn for_each_member<F>(&mut self, f: F)
    where
        F: Fn(usize) + Sync;

    /// Every member `t` calls `f` with exclusive access to `shared[t]`.
    ///
    /// Entries beyond `block_size()` are never handed to a member.
    fn for_each_thread<T, F>(&mut self, shared: &mut [T], f: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync;

    /// Member `t` calls `f` with `&mut lower[t]` and `&upper[t]`, for every
    /// `t` that indexes both slices.
    ///
    /// This is the shape of a single step of a tree-reduction over a shared
    /// buffer (the caller splits the active part of the buffer in two).
    fn for_each_pair<T, F>(&mut self, lower: &mut [T], upper: &[T], f: F)
    where
        T: Send + Sync,
        F: Fn(usize, &mut T, &T) + Sync;

    /// Has the root member of the block (in-block index 0) execute `f`.
    ///
    /// The other members do nothing during this call.
    fn exec_once<F>(&mut self, f: F)
    where
        F: FnOnce();
}

/// An [`ExecutionUnit`] where a single thread simulates every member of the
/// block, one after another.
///
/// Since the members are simulated in order of their in-block index, and
/// each collective call completes before the next starts, the barrier at the
/// end of every collective call comes for free.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SerialBlock {
    block_index: usize,
    grid_width: usize,
    block_size: usize,
}

impl SerialBlock {
    pub fn new(block_index: usize, grid_width: usize, block_size: usize) -> Self {
        SerialBlock {
            block_index,
            grid_width,
            block_size,
        }
    }
}

impl ExecutionUnit for SerialBlock {
    #[inline]
    fn block_index(&self) -> usize {
        self.block_index
    }

    #[inline]
    fn grid_width(&self) -> usize {
        self.grid_width
    }

    #[inline]
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn for_each_member<F>(&mut self, f: F)
    where
        F: Fn(usize) + Sync,
    {
        (0..self.block_size).for_each(f)
    }

    fn for_each_thread<T, F>(&mut self, shared: &mut [T], f: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync,
    {
        for (thread, slot) in shared.iter_mut().take(self.block_size).enumerate() {
            f(thread, slot);
        }
    }

    fn for_each_pair<T, F>(&mut self, lower: &mut [T], upper: &[T], f: F)
    where
        T: Send + Sync,
        F: Fn(usize, &mut T, &T) + Sync,
    {
        for (thread, (left, right)) in lower.iter_mut().zip(upper.iter()).enumerate() {
            f(thread, left, right);
        }
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

    #[test]
    fn serial_block_indexing() {
        let block = SerialBlock::new(2, 4, 8);
        assert_eq!(block.linear_index(0), 16);
        assert_eq!(block.linear_index(7), 23);
        assert_eq!(block.n_threads(), 32);
    }

    #[test]
    fn serial_block_members_own_their_slot() {
        let mut block = SerialBlock::new(0, 1, 4);
        // the extra slot is beyond the block size and stays untouched
        let mut shared = [0_usize; 5];
        block.for_each_thread(&mut shared, |thread, slot| *slot = 10 * (thread + 1));
        assert_eq!(shared, [10, 20, 30, 40, 0]);

        let (lower, upper) = shared[..4].split_at_mut(2);
        block.for_each_pair(lower, upper, |_, left, right| *left += *right);
        assert_eq!(shared[..2], [40, 60]);
    }
}
