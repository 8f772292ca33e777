//! Grid-stride traversal
//!
//! A launch has a fixed number of logical threads (`grid_size * block_size`)
//! but the problem size can be arbitrarily larger. Grid-stride iteration lets
//! every logical thread visit multiple positions, spaced by the total number
//! of logical threads, so that the launch still covers the whole problem.

use core::iter::FusedIterator;

/// Produces the positions `start, start + stride, start + 2*stride, ...`
/// that are smaller than `n`.
///
/// Each logical thread constructs its own instance. Instances never share
/// state, so a thread can always rebuild its sequence from scratch (or resume
/// it with [`GridStride::resume`]).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GridStride {
    next: usize,
    stride: usize,
    n: usize,
}

impl GridStride {
    pub fn new(start: usize, stride: usize, n: usize) -> Self {
        GridStride {
            next: start,
            stride,
            n,
        }
    }

    /// Rebuild the sequence of a thread that has already visited `offset`
    /// positions.
    pub fn resume(start: usize, stride: usize, n: usize, offset: usize) -> Self {
        let next = offset
            .checked_mul(stride)
            .and_then(|skipped| skipped.checked_add(start))
            .unwrap_or(usize::MAX);
        GridStride { next, stride, n }
    }

    /// The position that will be yielded next (it may already be `>= n`)
    pub fn current_offset(&self) -> usize {
        self.next
    }

    fn remaining(&self) -> usize {
        if self.next >= self.n {
            0
        } else if self.stride == 0 {
            // a zero stride visits its starting position exactly once
            1
        } else {
            (self.n - self.next).div_ceil(self.stride)
        }
    }
}

impl Iterator for GridStride {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        if self.next >= self.n {
            return None;
        }
        let current = self.next;
        self.next = if self.stride == 0 {
            self.n
        } else {
            // saturating keeps us from wrapping around when n is close to
            // usize::MAX
            current.saturating_add(self.stride)
        };
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining();
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for GridStride {}

impl FusedIterator for GridStride {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strided_positions() {
        let mut it = GridStride::new(3, 4, 14);
        assert_eq!(it.len(), 3);
        assert_eq!(it.next(), Some(3));
        assert_eq!(it.next(), Some(7));
        assert_eq!(it.next(), Some(11));
        assert_eq!(it.next(), None);
        assert_eq!(it.next(), None);
    }

    #[test]
    fn start_beyond_problem_size() {
        // threads in the tail of the last block have nothing to do
        let mut it = GridStride::new(25, 256, 25);
        assert_eq!(it.len(), 0);
        assert_eq!(it.next(), None);
    }

    #[test]
    fn zero_stride_visits_once() {
        let mut it = GridStride::new(2, 0, 10);
        assert_eq!(it.len(), 1);
        assert_eq!(it.next(), Some(2));
        assert_eq!(it.next(), None);
    }

    #[test]
    fn no_overflow_near_usize_max() {
        let n = usize::MAX;
        let mut it = GridStride::new(n - 2, 5, n);
        assert_eq!(it.next(), Some(n - 2));
        assert_eq!(it.next(), None);
    }

    #[test]
    fn resume_matches_fresh_sequence() {
        let mut fresh = GridStride::new(1, 3, 20);
        fresh.next();
        fresh.next();
        let resumed = GridStride::resume(1, 3, 20, 2);
        assert_eq!(resumed.current_offset(), 7);
        assert!(Iterator::eq(fresh, resumed));
    }

    #[test]
    fn threads_partition_the_problem() {
        // every position is visited by exactly one logical thread
        let (grid_size, block_size, n) = (3_usize, 4_usize, 53_usize);
        let stride = grid_size * block_size;
        let mut visits = [0_u8; 53];
        for linear_index in 0..stride {
            for i in GridStride::new(linear_index, stride, n) {
                visits[i] += 1;
            }
        }
        assert!(visits.iter().all(|&count| count == 1));
    }
}
