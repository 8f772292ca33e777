//! Launch geometry and the shared-memory collapse schedule

use core::fmt;

/// The number of logical threads per block used by the kernels unless they
/// are explicitly instantiated with another block size
pub const DEFAULT_BLOCK_SIZE: usize = 256;

/// Describes why a launch geometry couldn't be constructed.
///
/// These all indicate programming errors (the empty problem is **not** an
/// error, it simply doesn't produce a geometry)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeometryError {
    /// a kernel was instantiated with a block size of 0
    ZeroBlockSize,
    /// the grid was capped at 0 blocks
    ZeroGridSize,
    /// `grid_size * block_size` doesn't fit in a `usize`
    Overflow { n: usize, block_size: usize },
}

impl fmt::Display for GeometryError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GeometryError::ZeroBlockSize => write!(f, "the block size must be positive"),
            GeometryError::ZeroGridSize => write!(f, "the grid size can't be capped at 0 blocks"),
            GeometryError::Overflow { n, block_size } => write!(
                f,
                "a problem size of {n} with a block size of {block_size} overflows \
                 the number of logical threads"
            ),
        }
    }
}

/// The geometry of a single launch.
///
/// This is derived from the problem size right before a launch and isn't
/// meant to be stored long-term.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaunchGeometry {
    block_size: usize,
    grid_size: usize,
    shared_bytes: usize,
}

impl LaunchGeometry {
    /// Computes the geometry for a problem of size `n`.
    ///
    /// Returns `Ok(None)` when `n` is 0 (nothing should be launched). The
    /// grid holds `ceil(n / block_size)` blocks unless `max_grid_size` caps
    /// it, in which case the threads rely on grid-stride iteration to cover
    /// the rest of the problem.
    pub fn new(
        n: usize,
        block_size: usize,
        shared_bytes: usize,
        max_grid_size: Option<usize>,
    ) -> Result<Option<Self>, GeometryError> {
        if block_size == 0 {
            return Err(GeometryError::ZeroBlockSize);
        } else if max_grid_size == Some(0) {
            return Err(GeometryError::ZeroGridSize);
        } else if n == 0 {
            return Ok(None);
        }

        let full_grid_size = n.div_ceil(block_size);
        let grid_size = match max_grid_size {
            Some(max_grid_size) => full_grid_size.min(max_grid_size),
            None => full_grid_size,
        };
        if grid_size.checked_mul(block_size).is_none() {
            return Err(GeometryError::Overflow { n, block_size });
        }

        Ok(Some(LaunchGeometry {
            block_size,
            grid_size,
            shared_bytes,
        }))
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    /// number of bytes of block-shared memory that each block uses
    pub fn shared_bytes(&self) -> usize {
        self.shared_bytes
    }

    /// total number of logical threads in the launch (this is also the
    /// grid-stride)
    pub fn n_threads(&self) -> usize {
        // overflow was ruled out during construction
        self.grid_size * self.block_size
    }

    /// whether every position of a problem of size `n` is visited without
    /// any thread needing more than one stride
    pub fn covers(&self, n: usize) -> bool {
        self.n_threads() >= n
    }
}

/// A single step of the collapse phase.
///
/// While the active width is `width`, a thread with in-block index `t`
/// combines slot `t + width_up` into slot `t` when `t < width_up` and
/// `t + width_up < width`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollapseStep {
    pub width: usize,
    pub width_up: usize,
}

impl CollapseStep {
    /// the number of threads that actually combine a pair during this step
    pub fn n_pairs(&self) -> usize {
        self.width - self.width_up
    }
}

/// Iterates over the steps that collapse `width` shared slots into 1.
///
/// The width is halved with ceiling division, so a width that isn't a power
/// of 2 doesn't collapse as a pure binary tree (e.g. `5 -> 3 -> 2 -> 1`). The
/// exact schedule matters for reproducing results bit-for-bit.
#[derive(Clone, Debug)]
pub struct CollapseSteps {
    width: usize,
}

impl CollapseSteps {
    pub fn new(width: usize) -> Self {
        CollapseSteps { width }
    }
}

impl Iterator for CollapseSteps {
    type Item = CollapseStep;

    fn next(&mut self) -> Option<CollapseStep> {
        if self.width <= 1 {
            return None;
        }
        let step = CollapseStep {
            width: self.width,
            width_up: self.width.div_ceil(2),
        };
        self.width = step.width_up;
        Some(step)
    }
}

impl core::iter::FusedIterator for CollapseSteps {}

/// The sequence of active widths visited while collapsing `block_size` slots
/// (including the terminal width of 1)
pub fn collapse_widths(block_size: usize) -> impl Iterator<Item = usize> {
    CollapseSteps::new(block_size)
        .map(|step| step.width)
        .chain((block_size > 0).then_some(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_problem_launches_nothing() {
        assert_eq!(LaunchGeometry::new(0, 256, 0, None), Ok(None));
    }

    #[test]
    fn invalid_geometry() {
        assert_eq!(
            LaunchGeometry::new(10, 0, 0, None),
            Err(GeometryError::ZeroBlockSize)
        );
        assert_eq!(
            LaunchGeometry::new(10, 256, 0, Some(0)),
            Err(GeometryError::ZeroGridSize)
        );
        assert!(matches!(
            LaunchGeometry::new(usize::MAX, 256, 0, None),
            Err(GeometryError::Overflow { .. })
        ));
    }

    #[test]
    fn grid_size_law() {
        for (n, expected_grid) in [(1, 1), (25, 1), (256, 1), (257, 2), (1000, 4), (1024, 4)] {
            let geometry = LaunchGeometry::new(n, 256, 1024, None).unwrap().unwrap();
            assert_eq!(geometry.grid_size(), expected_grid, "n = {n}");
            assert_eq!(geometry.block_size(), 256);
            assert_eq!(geometry.shared_bytes(), 1024);
            assert!(geometry.covers(n));
        }
    }

    #[test]
    fn capped_grid() {
        let geometry = LaunchGeometry::new(10_000, 256, 0, Some(2)).unwrap().unwrap();
        assert_eq!(geometry.grid_size(), 2);
        assert_eq!(geometry.n_threads(), 512);
        assert!(!geometry.covers(10_000));

        // the cap has no effect when it exceeds the required grid size
        let geometry = LaunchGeometry::new(300, 256, 0, Some(8)).unwrap().unwrap();
        assert_eq!(geometry.grid_size(), 2);
    }

    #[test]
    fn power_of_two_collapse() {
        let mut widths = collapse_widths(256);
        for expected in [256, 128, 64, 32, 16, 8, 4, 2, 1] {
            assert_eq!(widths.next(), Some(expected));
        }
        assert_eq!(widths.next(), None);
    }

    #[test]
    fn non_power_of_two_collapse() {
        let mut widths = collapse_widths(5);
        for expected in [5, 3, 2, 1] {
            assert_eq!(widths.next(), Some(expected));
        }
        assert_eq!(widths.next(), None);

        let mut steps = CollapseSteps::new(5);
        assert_eq!(steps.next().map(|s| (s.width_up, s.n_pairs())), Some((3, 2)));
        assert_eq!(steps.next().map(|s| (s.width_up, s.n_pairs())), Some((2, 1)));
        assert_eq!(steps.next().map(|s| (s.width_up, s.n_pairs())), Some((1, 1)));
        assert_eq!(steps.next(), None);
    }

    #[test]
    fn trivial_collapse() {
        assert_eq!(CollapseSteps::new(1).count(), 0);
        assert_eq!(collapse_widths(1).count(), 1);
        assert_eq!(collapse_widths(0).count(), 0);
    }
}
