//! # Change Sets
//!
//! [`Changes`] is the result of a lookup: a world, the region that was
//! searched and every matching change indexed by block position.
//!
//! ## Design
//!
//! ```text
//! order:  [p0, p1, p2, ...]           first-seen order of locations
//! index:  p0 -> [c7, c3]              insertion order kept per location
//!         p1 -> [c5]
//!         p2 -> [c4, c2, c1]
//! ```
//!
//! A set is *distinct* when every location holds exactly one change. Only
//! distinct sets can be turned into restoration changes; a location with
//! competing values has no single state to go back to.

use std::collections::HashMap;

use crate::change::{Change, ChangeReason, ChangeSource};
use crate::error::{CoreError, CoreResult};
use crate::query::ResolvedQuery;
use crate::region::{BlockPos, CuboidRegion, Location};
use crate::subject::{BlockWrapper, ChangeSubject};

/// Location-indexed multiset of changes in one world.
#[derive(Clone, Debug)]
pub struct Changes {
    world: String,
    region: CuboidRegion,
    index: HashMap<BlockPos, Vec<Change>>,
    order: Vec<BlockPos>,
    len: usize,
}

impl Changes {
    /// Indexes changes by location.
    #[must_use]
    pub fn new(
        world: impl Into<String>,
        region: CuboidRegion,
        changes: impl IntoIterator<Item = Change>,
    ) -> Self {
        let mut set = Self {
            world: world.into(),
            region,
            index: HashMap::new(),
            order: Vec::new(),
            len: 0,
        };
        for change in changes {
            let pos = change.location().pos;
            set.index
                .entry(pos)
                .or_insert_with(|| {
                    set.order.push(pos);
                    Vec::new()
                })
                .push(change);
            set.len += 1;
        }
        set
    }

    /// Wraps the rows returned for `query`.
    #[must_use]
    pub fn from_query(query: &ResolvedQuery, changes: impl IntoIterator<Item = Change>) -> Self {
        Self::new(query.world.clone(), query.region, changes)
    }

    /// World the changes took place in.
    #[inline]
    #[must_use]
    pub fn world(&self) -> &str {
        &self.world
    }

    /// Region the set covers.
    #[inline]
    #[must_use]
    pub fn region(&self) -> CuboidRegion {
        self.region
    }

    /// Total number of changes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the set holds no changes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Populated locations in first-seen order.
    pub fn locations(&self) -> impl Iterator<Item = BlockPos> + '_ {
        self.order.iter().copied()
    }

    /// Every change, grouped by location.
    pub fn changes(&self) -> impl Iterator<Item = &Change> + '_ {
        self.order
            .iter()
            .filter_map(|pos| self.index.get(pos))
            .flatten()
    }

    /// Changes recorded at one location, in insertion order.
    #[must_use]
    pub fn changes_at(&self, pos: BlockPos) -> &[Change] {
        self.index.get(&pos).map_or(&[], Vec::as_slice)
    }

    /// Returns true iff every location holds exactly one change.
    #[must_use]
    pub fn is_distinct(&self) -> bool {
        self.index.values().all(|changes| changes.len() == 1)
    }

    /// Same changes over the smallest region enclosing every populated
    /// location. An empty set keeps its region.
    #[must_use]
    pub fn optimize(&self) -> Self {
        let region = CuboidRegion::enclosing(self.locations()).unwrap_or(self.region);
        Self {
            region,
            ..self.clone()
        }
    }

    /// Inverse changes that restore every location, taking the recorded
    /// "to" value as the current one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotDistinct`] if any location holds more than one
    /// change.
    pub fn restoration_change_set(&self, source: &ChangeSource) -> CoreResult<Vec<Change>> {
        self.restoration_change_set_with(source, |_| None)
    }

    /// Inverse changes that restore every location.
    ///
    /// `current` reports the live value at a location; it becomes the
    /// inverse change's "from". When it returns `None` the recorded "to"
    /// value is used instead.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotDistinct`] if any location holds more than one
    /// change.
    pub fn restoration_change_set_with<F>(
        &self,
        source: &ChangeSource,
        current: F,
    ) -> CoreResult<Vec<Change>>
    where
        F: Fn(&Location) -> Option<BlockWrapper>,
    {
        if !self.is_distinct() {
            return Err(CoreError::NotDistinct);
        }
        self.changes()
            .map(|change| {
                let subject = match change.subject() {
                    block @ ChangeSubject::Block { .. } => {
                        let live = current(change.location()).or_else(|| block.to_wrapper());
                        match (live, block.from_wrapper()) {
                            (Some(live), Some(original)) => {
                                ChangeSubject::from_wrappers(live, original)
                            }
                            _ => block.clone(),
                        }
                    }
                    marker @ ChangeSubject::Restoration { .. } => marker.clone(),
                };
                Change::builder()
                    .source(source.clone())
                    .location(change.location().clone())
                    .subject(subject)
                    .reason(ChangeReason::Restoration)
                    .build()
            })
            .collect()
    }
}
