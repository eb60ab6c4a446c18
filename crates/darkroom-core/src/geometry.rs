//! Compute dispatch geometry.
//!
//! Converts output image dimensions into the workgroup grid for a 2D
//! compute pass. Grids are computed with ceiling division so partial tiles
//! along the right and bottom edges are still dispatched; shaders
//! bounds-check each invocation against the real dimensions.

/// Square workgroup edge used by the image shaders (16x16 threads).
pub const DEFAULT_WORKGROUP_SIZE: u32 = 16;

/// Workgroup counts for a compute dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchGrid {
    /// Workgroups along the image width.
    pub x: u32,
    /// Workgroups along the image height.
    pub y: u32,
    /// Depth, always 1 for image work.
    pub z: u32,
}

impl DispatchGrid {
    /// Grid covering `width x height` output pixels with the default
    /// [`DEFAULT_WORKGROUP_SIZE`] workgroup.
    pub const fn for_output(width: u32, height: u32) -> Self {
        Self::with_workgroup(width, height, DEFAULT_WORKGROUP_SIZE)
    }

    /// Grid covering `width x height` with a square workgroup of `size`
    /// threads per edge. `size` must be nonzero.
    ///
    /// A zero dimension produces zero workgroups on that axis.
    pub const fn with_workgroup(width: u32, height: u32, size: u32) -> Self {
        Self {
            x: width.div_ceil(size),
            y: height.div_ceil(size),
            z: 1,
        }
    }

    /// Total workgroups dispatched.
    pub const fn total(&self) -> u64 {
        self.x as u64 * self.y as u64 * self.z as u64
    }

    /// True when any axis dispatches zero workgroups.
    pub const fn is_empty(&self) -> bool {
        self.x == 0 || self.y == 0
    }
}
