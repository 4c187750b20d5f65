//! # World Backend
//!
//! The capability that actually writes cells into the live world. The
//! scheduler hands it one drained chunk at a time; it is called at most
//! once per chunk.

use strata_core::{BlockWrapper, Location};

use crate::chunk::{ChunkLayout, LocalChunk};
use crate::error::ApplyError;

/// Writes drained chunks into the world.
pub trait WorldBackend: Send + Sync {
    /// Applies every pending write of one chunk.
    ///
    /// `layout` maps the chunk's sparse layers back to world coordinates.
    ///
    /// # Errors
    ///
    /// Returns an [`ApplyError`] if the chunk could not be written. The
    /// scheduler logs it and moves on.
    fn apply_chunk(
        &self,
        world: &str,
        layout: &ChunkLayout,
        chunk: &LocalChunk,
    ) -> Result<(), ApplyError>;

    /// Current value of a cell, if the backend can tell.
    fn current_block(&self, _location: &Location) -> Option<BlockWrapper> {
        None
    }
}
