//! # Local Chunks
//!
//! A chunk is a 16-wide, 16-deep column of the world, split vertically into
//! layers of 16×16×16 cells. Layers are allocated on first write.
//!
//! ## Coordinate Caches
//!
//! Both directions of the cell mapping are precomputed once per layout:
//!
//! ```text
//! forward:  (x, y, z)        ──> (layer = y >> 4, offset = (y & 15) << 8 | z << 4 | x)
//! inverse:  (layer, offset)  ──> (x, y, z)
//! ```
//!
//! Writes never do coordinate math beyond one table lookup, and backends
//! can walk a drained chunk in world coordinates.

use strata_core::{BlockPos, BlockWrapper};

use crate::error::{QueueError, QueueResult};

/// Chunk width and depth in cells.
pub const CHUNK_SIZE: i32 = 16;

/// Height of one layer in cells.
pub const LAYER_HEIGHT: i32 = 16;

/// Cells per layer.
pub const LAYER_VOLUME: usize = 4096;

/// Chunk coordinate (in chunks, not blocks).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChunkCoord {
    /// X coordinate.
    pub x: i32,
    /// Z coordinate.
    pub z: i32,
}

impl ChunkCoord {
    /// Creates a new chunk coordinate.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing the given block column.
    #[inline]
    #[must_use]
    pub const fn from_block_pos(block_x: i32, block_z: i32) -> Self {
        Self {
            x: block_x.div_euclid(CHUNK_SIZE),
            z: block_z.div_euclid(CHUNK_SIZE),
        }
    }

    /// World X of the chunk's origin corner.
    #[inline]
    #[must_use]
    pub const fn world_x(self) -> i32 {
        self.x * CHUNK_SIZE
    }

    /// World Z of the chunk's origin corner.
    #[inline]
    #[must_use]
    pub const fn world_z(self) -> i32 {
        self.z * CHUNK_SIZE
    }
}

/// Local cell position inside a chunk, as stored in the inverse cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocalCell {
    /// X within the chunk, `0..16`.
    pub x: u8,
    /// Y above the layout's minimum, `0..height`.
    pub y: u16,
    /// Z within the chunk, `0..16`.
    pub z: u8,
}

/// Vertical extent of a world plus the precomputed coordinate caches.
#[derive(Debug)]
pub struct ChunkLayout {
    min_y: i32,
    height: u32,
    /// Indexed by `(local_y << 8) | (z << 4) | x`.
    forward: Box<[(u16, u16)]>,
    /// Indexed by `layer * LAYER_VOLUME + offset`.
    inverse: Box<[LocalCell]>,
}

impl ChunkLayout {
    /// Builds a layout covering `min_y .. min_y + height`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidLayout`] unless `height` is a positive
    /// multiple of 16 that fits the world's integer range.
    pub fn new(min_y: i32, height: u32) -> QueueResult<Self> {
        if height == 0 || height % LAYER_HEIGHT as u32 != 0 || height > 4096 {
            return Err(QueueError::InvalidLayout(format!(
                "height {height} is not a positive multiple of 16 up to 4096"
            )));
        }
        if min_y.checked_add(height as i32).is_none() {
            return Err(QueueError::InvalidLayout(format!(
                "min_y {min_y} + height {height} overflows"
            )));
        }

        Ok(Self::build(min_y, height))
    }

    fn build(min_y: i32, height: u32) -> Self {
        let cells = height as usize * 256;
        let mut forward = Vec::with_capacity(cells);
        let mut inverse = vec![LocalCell { x: 0, y: 0, z: 0 }; cells];
        for y in 0..height as usize {
            for z in 0..16usize {
                for x in 0..16usize {
                    let layer = y >> 4;
                    let offset = ((y & 15) << 8) | (z << 4) | x;
                    forward.push((layer as u16, offset as u16));
                    inverse[layer * LAYER_VOLUME + offset] = LocalCell {
                        x: x as u8,
                        y: y as u16,
                        z: z as u8,
                    };
                }
            }
        }
        Self {
            min_y,
            height,
            forward: forward.into_boxed_slice(),
            inverse: inverse.into_boxed_slice(),
        }
    }

    /// Lowest valid Y.
    #[inline]
    #[must_use]
    pub const fn min_y(&self) -> i32 {
        self.min_y
    }

    /// Number of valid Y levels.
    #[inline]
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Number of layers per chunk.
    #[inline]
    #[must_use]
    pub const fn layers(&self) -> usize {
        (self.height / LAYER_HEIGHT as u32) as usize
    }

    /// Returns true if `y` is inside the vertical range.
    #[inline]
    #[must_use]
    pub const fn contains_y(&self, y: i32) -> bool {
        y >= self.min_y && ((y as i64 - self.min_y as i64) as u64) < self.height as u64
    }

    /// `(layer, offset)` of a world cell, or `None` if `y` is out of range.
    #[inline]
    #[must_use]
    pub fn index(&self, x: i32, y: i32, z: i32) -> Option<(usize, usize)> {
        if !self.contains_y(y) {
            return None;
        }
        let local_y = (y - self.min_y) as usize;
        let key = (local_y << 8) | (((z & 15) as usize) << 4) | ((x & 15) as usize);
        let (layer, offset) = self.forward[key];
        Some((layer as usize, offset as usize))
    }

    /// World position of a cell in the given chunk.
    #[inline]
    #[must_use]
    pub fn position(&self, coord: ChunkCoord, layer: usize, offset: usize) -> BlockPos {
        let cell = self.inverse[layer * LAYER_VOLUME + offset];
        BlockPos::new(
            coord.world_x() + i32::from(cell.x),
            self.min_y + i32::from(cell.y),
            coord.world_z() + i32::from(cell.z),
        )
    }
}

impl Default for ChunkLayout {
    fn default() -> Self {
        Self::build(0, 256)
    }
}

type Layer = Box<[Option<BlockWrapper>]>;

/// Pending writes for one chunk.
#[derive(Debug)]
pub struct LocalChunk {
    coord: ChunkCoord,
    layers: Vec<Option<Layer>>,
    writes: usize,
}

impl LocalChunk {
    /// Creates an empty chunk with room for `layers` layers.
    #[must_use]
    pub fn new(coord: ChunkCoord, layers: usize) -> Self {
        Self {
            coord,
            layers: (0..layers).map(|_| None).collect(),
            writes: 0,
        }
    }

    /// Chunk coordinate.
    #[inline]
    #[must_use]
    pub const fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Number of distinct cells written.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.writes
    }

    /// Returns true if nothing was written.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.writes == 0
    }

    /// Raw sparse layers. `None` layers received no writes.
    #[must_use]
    pub fn layers(&self) -> &[Option<Layer>] {
        &self.layers
    }

    /// Writes a cell at a precomputed `(layer, offset)`. Later writes win.
    pub fn set(&mut self, layer: usize, offset: usize, block: BlockWrapper) {
        let cells = self.layers[layer]
            .get_or_insert_with(|| (0..LAYER_VOLUME).map(|_| None).collect());
        if cells[offset].replace(block).is_none() {
            self.writes += 1;
        }
    }

    /// Every written cell in world coordinates, layer by layer.
    pub fn iter<'a>(
        &'a self,
        layout: &'a ChunkLayout,
    ) -> impl Iterator<Item = (BlockPos, &'a BlockWrapper)> + 'a {
        self.layers
            .iter()
            .enumerate()
            .filter_map(|(layer, cells)| cells.as_ref().map(|cells| (layer, cells)))
            .flat_map(move |(layer, cells)| {
                cells.iter().enumerate().filter_map(move |(offset, cell)| {
                    cell.as_ref()
                        .map(|block| (layout.position(self.coord, layer, offset), block))
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::BlockData;

    #[test]
    fn test_chunk_coord_from_negative_blocks() {
        assert_eq!(ChunkCoord::from_block_pos(-1, -16), ChunkCoord::new(-1, -1));
        assert_eq!(ChunkCoord::from_block_pos(-17, 15), ChunkCoord::new(-2, 0));
        assert_eq!(ChunkCoord::new(-2, 3).world_x(), -32);
    }

    #[test]
    fn test_forward_matches_bit_layout() {
        let layout = ChunkLayout::default();
        assert_eq!(layout.index(3, 37, 9), Some((2, (5 << 8) | (9 << 4) | 3)));
        assert_eq!(layout.index(-1, 0, -1), Some((0, (15 << 4) | 15)));
        assert_eq!(layout.index(0, 256, 0), None);
        assert_eq!(layout.index(0, -1, 0), None);
    }

    #[test]
    fn test_inverse_cache_round_trips() {
        let layout = ChunkLayout::new(-64, 384).unwrap();
        let coord = ChunkCoord::new(-3, 7);
        for &(x, y, z) in &[(0, -64, 0), (15, 319, 15), (7, 0, 3), (1, -1, 14)] {
            let world = BlockPos::new(coord.world_x() + x, y, coord.world_z() + z);
            let (layer, offset) = layout.index(world.x, world.y, world.z).unwrap();
            assert_eq!(layout.position(coord, layer, offset), world);
        }
        assert_eq!(layout.layers(), 24);
    }

    #[test]
    fn test_default_layout_equals_new() {
        let built = ChunkLayout::new(0, 256).unwrap();
        let default = ChunkLayout::default();
        assert_eq!(built.forward, default.forward);
        assert_eq!(built.inverse, default.inverse);
    }

    #[test]
    fn test_invalid_layouts() {
        assert!(ChunkLayout::new(0, 0).is_err());
        assert!(ChunkLayout::new(0, 100).is_err());
        assert!(ChunkLayout::new(i32::MAX - 8, 16).is_err());
    }

    #[test]
    fn test_chunk_writes_are_sparse() {
        let layout = ChunkLayout::default();
        let mut chunk = LocalChunk::new(ChunkCoord::new(1, 1), layout.layers());
        let stone = BlockWrapper::plain(BlockData::new("minecraft:stone"));

        let (layer, offset) = layout.index(17, 64, 18).unwrap();
        chunk.set(layer, offset, stone.clone());
        chunk.set(layer, offset, BlockWrapper::plain(BlockData::new("minecraft:dirt")));
        assert_eq!(chunk.len(), 1);
        assert_eq!(chunk.layers().iter().filter(|l| l.is_some()).count(), 1);

        let (layer, offset) = layout.index(16, 200, 31).unwrap();
        chunk.set(layer, offset, stone);

        let cells: Vec<_> = chunk.iter(&layout).collect();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].0, BlockPos::new(17, 64, 18));
        assert_eq!(cells[0].1.data.as_str(), "minecraft:dirt");
        assert_eq!(cells[1].0, BlockPos::new(16, 200, 31));
    }
}
