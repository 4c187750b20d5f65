//! # Persistence Seams
//!
//! The logger only knows how to open a batch, push changes into it and close
//! it. Storage engines implement [`ChangeBackend`]; the batch they hand out
//! holds whatever lock guards their statement state, so a whole
//! `begin → persist* → finish` sequence never interleaves with anything else.

use strata_core::{Change, ChangeSource};

use crate::error::LogResult;

/// An open write batch.
///
/// Dropping a batch without calling [`ChangeBatch::finish`] discards it.
pub trait ChangeBatch {
    /// Adds one change to the batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the change could not be written. The batch stays
    /// usable.
    fn persist(&mut self, change: &Change) -> LogResult<()>;

    /// Makes every persisted change durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch could not be committed.
    fn finish(self) -> LogResult<usize>;
}

/// A store that accepts batched changes.
pub trait ChangeBackend: Send + Sync + 'static {
    /// Batch type handed out by [`ChangeBackend::begin_batch`].
    type Batch<'a>: ChangeBatch
    where
        Self: 'a;

    /// Opens a new batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot start a batch right now.
    fn begin_batch(&self) -> LogResult<Self::Batch<'_>>;
}

/// Maps a persisted source name back to a [`ChangeSource`].
pub trait SourceResolver: Send + Sync {
    /// Returns `None` if the name does not identify a known source.
    fn resolve(&self, name: &str) -> Option<ChangeSource>;
}

/// Accepts every non-empty name.
#[derive(Clone, Copy, Debug, Default)]
pub struct NameSourceResolver;

impl SourceResolver for NameSourceResolver {
    fn resolve(&self, name: &str) -> Option<ChangeSource> {
        (!name.trim().is_empty()).then(|| ChangeSource::new(name))
    }
}

impl<F> SourceResolver for F
where
    F: Fn(&str) -> Option<ChangeSource> + Send + Sync,
{
    fn resolve(&self, name: &str) -> Option<ChangeSource> {
        self(name)
    }
}
