//! # Changes
//!
//! A [`Change`] is one observed mutation of the world: who caused it, where,
//! what it changed, why and when. Changes are immutable once built and are
//! only ever constructed through [`ChangeBuilder`], which fails closed when a
//! required field is missing.
//!
//! ```text
//! ChangeBuilder ── build() ──▶ Change { source, location, subject, reason, timestamp }
//!      │                                   │
//!      └── MissingField(..) ◀── missing ───┘ (timestamp defaults to now)
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{CoreError, CoreResult};
use crate::region::Location;
use crate::subject::ChangeSubject;

/// Opaque identity of whoever caused a change.
///
/// Only the name is persisted, and equality is by name.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ChangeSource {
    name: Arc<str>,
}

impl ChangeSource {
    /// Creates a source with the given stable name.
    #[must_use]
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
        }
    }

    /// Stable name persisted alongside each change.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for ChangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeSource({})", self.name)
    }
}

impl fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Why a change happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeReason {
    /// A block was removed.
    BlockBreak,
    /// A block was added.
    BlockPlace,
    /// A block was reverted by a restoration.
    Restoration,
}

impl ChangeReason {
    /// Every reason, in persistence order.
    pub const ALL: [Self; 3] = [Self::BlockBreak, Self::BlockPlace, Self::Restoration];

    /// Name stored in the `reason` column.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BlockBreak => "BLOCK_BREAK",
            Self::BlockPlace => "BLOCK_PLACE",
            Self::Restoration => "RESTORATION",
        }
    }
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChangeReason {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|reason| reason.name() == s)
            .ok_or_else(|| CoreError::UnknownReason(s.to_owned()))
    }
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}

/// A single immutable mutation record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    source: ChangeSource,
    location: Location,
    subject: ChangeSubject,
    reason: ChangeReason,
    timestamp: i64,
}

impl Change {
    /// Starts building a change.
    #[must_use]
    pub fn builder() -> ChangeBuilder {
        ChangeBuilder::default()
    }

    /// Who caused the change.
    #[inline]
    #[must_use]
    pub fn source(&self) -> &ChangeSource {
        &self.source
    }

    /// Where the change happened.
    #[inline]
    #[must_use]
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// What was changed.
    #[inline]
    #[must_use]
    pub fn subject(&self) -> &ChangeSubject {
        &self.subject
    }

    /// Why the change happened.
    #[inline]
    #[must_use]
    pub fn reason(&self) -> ChangeReason {
        self.reason
    }

    /// Creation time in milliseconds since the Unix epoch.
    #[inline]
    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Builder for [`Change`].
#[derive(Clone, Debug, Default)]
pub struct ChangeBuilder {
    source: Option<ChangeSource>,
    location: Option<Location>,
    subject: Option<ChangeSubject>,
    reason: Option<ChangeReason>,
    timestamp: Option<i64>,
}

impl ChangeBuilder {
    /// Sets the source.
    #[must_use]
    pub fn source(mut self, source: ChangeSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets the location.
    #[must_use]
    pub fn location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: ChangeSubject) -> Self {
        self.subject = Some(subject);
        self
    }

    /// Sets the reason.
    #[must_use]
    pub fn reason(mut self, reason: ChangeReason) -> Self {
        self.reason = Some(reason);
        self
    }

    /// Overrides the timestamp (milliseconds since the Unix epoch).
    #[must_use]
    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Finishes the change.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MissingField`] naming the first absent field.
    pub fn build(self) -> CoreResult<Change> {
        Ok(Change {
            source: self.source.ok_or(CoreError::MissingField("source"))?,
            location: self.location.ok_or(CoreError::MissingField("location"))?,
            subject: self.subject.ok_or(CoreError::MissingField("subject"))?,
            reason: self.reason.ok_or(CoreError::MissingField("reason"))?,
            timestamp: self.timestamp.unwrap_or_else(now_millis),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::BlockData;

    fn subject() -> ChangeSubject {
        ChangeSubject::block(BlockData::new("minecraft:stone"), BlockData::air())
    }

    #[test]
    fn test_build_requires_every_field() {
        let err = Change::builder()
            .location(Location::new("world", 0, 64, 0))
            .subject(subject())
            .reason(ChangeReason::BlockBreak)
            .build()
            .unwrap_err();
        assert_eq!(err, CoreError::MissingField("source"));

        let err = Change::builder()
            .source(ChangeSource::new("alice"))
            .location(Location::new("world", 0, 64, 0))
            .subject(subject())
            .build()
            .unwrap_err();
        assert_eq!(err, CoreError::MissingField("reason"));
    }

    #[test]
    fn test_timestamp_defaults_to_now() {
        let before = now_millis();
        let change = Change::builder()
            .source(ChangeSource::new("alice"))
            .location(Location::new("world", 0, 64, 0))
            .subject(subject())
            .reason(ChangeReason::BlockBreak)
            .build()
            .unwrap();
        assert!(change.timestamp() >= before);
        assert!(change.timestamp() <= now_millis());
    }

    #[test]
    fn test_reason_names_round_trip() {
        for reason in ChangeReason::ALL {
            assert_eq!(reason.name().parse::<ChangeReason>().unwrap(), reason);
        }
        assert!(matches!(
            "EXPLOSION".parse::<ChangeReason>(),
            Err(CoreError::UnknownReason(_))
        ));
    }

    #[test]
    fn test_source_equality_is_by_name() {
        assert_eq!(ChangeSource::new("bob"), ChangeSource::new(String::from("bob")));
        assert_ne!(ChangeSource::new("bob"), ChangeSource::new("Bob"));
    }
}
