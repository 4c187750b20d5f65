//! # Change Queries
//!
//! [`ChangeQuery`] is a builder describing which logged changes to fetch.
//! [`ChangeQuery::build`] validates it into a [`ResolvedQuery`], the only
//! form the store accepts.
//!
//! ## Limits
//!
//! ```text
//! unset  ──▶ 32767
//! -1     ──▶ i32::MAX   (no limit)
//! n > 0  ──▶ n
//! n <= 0 ──▶ NonPositiveLimit
//! ```

use crate::change::{ChangeReason, ChangeSource};
use crate::error::{CoreError, CoreResult};
use crate::region::{CuboidRegion, Location};

/// Limit used when the caller does not set one.
pub const DEFAULT_LIMIT: i32 = 32767;

/// Limit sentinel meaning "no limit".
pub const NO_LIMIT: i32 = -1;

/// Builder for a change lookup.
#[derive(Clone, Debug, Default)]
pub struct ChangeQuery {
    world: Option<String>,
    region: Option<CuboidRegion>,
    reasons: Vec<ChangeReason>,
    source: Option<ChangeSource>,
    limit: Option<i32>,
    distinct: bool,
}

impl ChangeQuery {
    /// Creates an empty query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the query to a world.
    #[must_use]
    pub fn in_world(mut self, world: impl Into<String>) -> Self {
        self.world = Some(world.into());
        self
    }

    /// Restricts the query to a region.
    #[must_use]
    pub fn in_region(mut self, region: CuboidRegion) -> Self {
        self.region = Some(region);
        self
    }

    /// Restricts the query to exactly one location.
    #[must_use]
    pub fn at_location(mut self, location: &Location) -> Self {
        self.world = Some(location.world.clone());
        self.region = Some(CuboidRegion::point(location.pos));
        self
    }

    /// Adds an accepted reason. No reasons means every reason.
    #[must_use]
    pub fn with_reason(mut self, reason: ChangeReason) -> Self {
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }
        self
    }

    /// Adds several accepted reasons.
    #[must_use]
    pub fn with_reasons(self, reasons: impl IntoIterator<Item = ChangeReason>) -> Self {
        reasons.into_iter().fold(self, Self::with_reason)
    }

    /// Restricts the query to changes caused by one source.
    #[must_use]
    pub fn from_source(mut self, source: ChangeSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets the result limit. [`NO_LIMIT`] lifts it.
    #[must_use]
    pub fn with_limit(mut self, limit: i32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns only the earliest matching change per location.
    #[must_use]
    pub fn distinct_values(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Validates the query.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingField`] if the world or region is unset and
    /// [`CoreError::NonPositiveLimit`] if the limit does not resolve to a
    /// positive number.
    pub fn build(self) -> CoreResult<ResolvedQuery> {
        let world = self.world.ok_or(CoreError::MissingField("world"))?;
        let region = self.region.ok_or(CoreError::MissingField("region"))?;
        let limit = match self.limit.unwrap_or(DEFAULT_LIMIT) {
            NO_LIMIT => i32::MAX,
            n if n > 0 => n,
            n => return Err(CoreError::NonPositiveLimit(n)),
        };
        let mut reasons = self.reasons;
        reasons.sort_unstable();
        Ok(ResolvedQuery {
            world,
            region,
            reasons,
            source: self.source,
            limit: limit as u32,
            distinct: self.distinct,
        })
    }
}

/// A validated query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedQuery {
    /// World to search.
    pub world: String,
    /// Bounding box to search.
    pub region: CuboidRegion,
    /// Accepted reasons, sorted. Empty accepts every reason.
    pub reasons: Vec<ChangeReason>,
    /// Required source, if any.
    pub source: Option<ChangeSource>,
    /// Maximum number of rows returned, always positive.
    pub limit: u32,
    /// Earliest change per location only.
    pub distinct: bool,
}

impl ResolvedQuery {
    /// Reasons the query accepts, expanding "every reason".
    #[must_use]
    pub fn effective_reasons(&self) -> &[ChangeReason] {
        if self.reasons.is_empty() {
            &ChangeReason::ALL
        } else {
            &self.reasons
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::BlockPos;

    fn region() -> CuboidRegion {
        CuboidRegion::new(BlockPos::new(0, 0, 0), BlockPos::new(15, 255, 15))
    }

    #[test]
    fn test_world_and_region_are_required() {
        assert_eq!(
            ChangeQuery::new().in_region(region()).build().unwrap_err(),
            CoreError::MissingField("world")
        );
        assert_eq!(
            ChangeQuery::new().in_world("world").build().unwrap_err(),
            CoreError::MissingField("region")
        );
    }

    #[test]
    fn test_limit_resolution() {
        let base = || ChangeQuery::new().in_world("world").in_region(region());

        assert_eq!(base().build().unwrap().limit, 32767);
        assert_eq!(base().with_limit(-1).build().unwrap().limit, i32::MAX as u32);
        assert_eq!(base().with_limit(10).build().unwrap().limit, 10);
        assert_eq!(
            base().with_limit(0).build().unwrap_err(),
            CoreError::NonPositiveLimit(0)
        );
        assert_eq!(
            base().with_limit(-5).build().unwrap_err(),
            CoreError::NonPositiveLimit(-5)
        );
    }

    #[test]
    fn test_at_location_is_a_point_query() {
        let location = Location::new("nether", 4, 70, -9);
        let query = ChangeQuery::new().at_location(&location).build().unwrap();
        assert_eq!(query.world, "nether");
        assert_eq!(query.region.volume(), 1);
        assert!(query.region.contains(location.pos));
    }

    #[test]
    fn test_reasons_default_to_all() {
        let query = ChangeQuery::new()
            .in_world("world")
            .in_region(region())
            .build()
            .unwrap();
        assert!(query.reasons.is_empty());
        assert_eq!(query.effective_reasons(), &ChangeReason::ALL);

        let query = ChangeQuery::new()
            .in_world("world")
            .in_region(region())
            .with_reasons([ChangeReason::BlockPlace, ChangeReason::BlockBreak])
            .with_reason(ChangeReason::BlockPlace)
            .build()
            .unwrap();
        assert_eq!(
            query.effective_reasons(),
            &[ChangeReason::BlockBreak, ChangeReason::BlockPlace]
        );
    }
}
