//! # Positions and Regions
//!
//! Integer block positions, world locations and normalized cuboids.

use std::fmt;

/// Integer block position inside a world.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockPos {
    /// X coordinate.
    pub x: i32,
    /// Y coordinate (vertical).
    pub y: i32,
    /// Z coordinate.
    pub z: i32,
}

impl BlockPos {
    /// Creates a new block position.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A block position qualified by the world it lives in.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    /// World name.
    pub world: String,
    /// Position inside the world.
    pub pos: BlockPos,
}

impl Location {
    /// Creates a new location.
    #[must_use]
    pub fn new(world: impl Into<String>, x: i32, y: i32, z: i32) -> Self {
        Self {
            world: world.into(),
            pos: BlockPos::new(x, y, z),
        }
    }

    /// Creates a location from an existing position.
    #[must_use]
    pub fn at(world: impl Into<String>, pos: BlockPos) -> Self {
        Self {
            world: world.into(),
            pos,
        }
    }

    /// Returns the world name.
    #[inline]
    #[must_use]
    pub fn world(&self) -> &str {
        &self.world
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.world, self.pos)
    }
}

const fn min_i32(a: i32, b: i32) -> i32 {
    if a < b {
        a
    } else {
        b
    }
}

const fn max_i32(a: i32, b: i32) -> i32 {
    if a > b {
        a
    } else {
        b
    }
}

/// An axis-aligned box of blocks, inclusive on both corners.
///
/// The corners are normalized on construction so `min <= max` holds
/// component-wise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CuboidRegion {
    min: BlockPos,
    max: BlockPos,
}

impl CuboidRegion {
    /// Creates a region spanning two arbitrary corners.
    #[must_use]
    pub const fn new(a: BlockPos, b: BlockPos) -> Self {
        Self {
            min: BlockPos::new(min_i32(a.x, b.x), min_i32(a.y, b.y), min_i32(a.z, b.z)),
            max: BlockPos::new(max_i32(a.x, b.x), max_i32(a.y, b.y), max_i32(a.z, b.z)),
        }
    }

    /// Creates a zero-extent region containing exactly one block.
    #[must_use]
    pub const fn point(pos: BlockPos) -> Self {
        Self { min: pos, max: pos }
    }

    /// Smallest region containing every given position, or `None` if empty.
    #[must_use]
    pub fn enclosing(points: impl IntoIterator<Item = BlockPos>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let region = points.fold(Self::point(first), |acc, p| Self {
            min: BlockPos::new(acc.min.x.min(p.x), acc.min.y.min(p.y), acc.min.z.min(p.z)),
            max: BlockPos::new(acc.max.x.max(p.x), acc.max.y.max(p.y), acc.max.z.max(p.z)),
        });
        Some(region)
    }

    /// Least positive corner.
    #[inline]
    #[must_use]
    pub const fn min(&self) -> BlockPos {
        self.min
    }

    /// Most positive corner.
    #[inline]
    #[must_use]
    pub const fn max(&self) -> BlockPos {
        self.max
    }

    /// Extent along the X axis.
    #[must_use]
    pub const fn width(&self) -> u64 {
        (self.max.x as i64 - self.min.x as i64 + 1) as u64
    }

    /// Extent along the Y axis.
    #[must_use]
    pub const fn height(&self) -> u64 {
        (self.max.y as i64 - self.min.y as i64 + 1) as u64
    }

    /// Extent along the Z axis.
    #[must_use]
    pub const fn depth(&self) -> u64 {
        (self.max.z as i64 - self.min.z as i64 + 1) as u64
    }

    /// Number of blocks in the region (saturates on absurdly large regions).
    #[must_use]
    pub const fn volume(&self) -> u64 {
        self.width()
            .saturating_mul(self.height())
            .saturating_mul(self.depth())
    }

    /// Returns true if the position lies inside the region.
    #[must_use]
    pub const fn contains(&self, pos: BlockPos) -> bool {
        pos.x >= self.min.x
            && pos.x <= self.max.x
            && pos.y >= self.min.y
            && pos.y <= self.max.y
            && pos.z >= self.min.z
            && pos.z <= self.max.z
    }

    /// Returns true if the two regions share at least one block.
    #[must_use]
    pub const fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }
}
